// Copyright 2025 Irreducible Inc.

use itertools::izip;

use super::{check_state_matrix, run, run_vec, Direction, RecurrentCell};
use crate::{
	activation::{logistic, relu},
	batch::MatrixBatch,
	error::Error,
	matrix::{accumulate_transposed, check_shape, Matrix},
};

/// Gated recurrent unit.
///
/// The pre-projected input has `3 * size` rows laid out as `[update | reset | candidate]`.
/// `sw` (`size x 2 * size`) feeds the state into the update and reset gates and `sw2`
/// (`size x size`) feeds the reset state into the candidate:
///
/// ```text
/// [z | r] = σ(x_zr + swᵀ h)
/// ĥ       = tanh(x_h + sw2ᵀ (r ⊙ h))
/// h'      = z ⊙ h + (1 - z) ⊙ ĥ
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Gru<'a> {
	sw: &'a Matrix,
	sw2: &'a Matrix,
}

impl<'a> Gru<'a> {
	pub fn new(sw: &'a Matrix, sw2: &'a Matrix) -> Result<Self, Error> {
		let size = check_state_matrix("sw", sw, 2)?;
		check_shape("sw2", sw2, (size, size))?;
		Ok(Self { sw, sw2 })
	}
}

impl RecurrentCell for Gru<'_> {
	fn input_size(&self) -> usize {
		3 * self.sw.nr()
	}

	fn state_size(&self) -> usize {
		self.sw.nr()
	}

	fn scratch_size(&self) -> usize {
		3 * self.sw.nr()
	}

	fn step(&self, x: &[f32], prev: &[f32], _memory: &mut [f32], scratch: &mut [f32], next: &mut [f32]) {
		gated_step(x, prev, self.sw, self.sw2, f32::tanh, scratch, next);
	}
}

/// GRU whose candidate activation is a rectifier instead of `tanh`.
#[derive(Debug, Clone, Copy)]
pub struct GruRelu<'a>(Gru<'a>);

impl<'a> GruRelu<'a> {
	pub fn new(sw: &'a Matrix, sw2: &'a Matrix) -> Result<Self, Error> {
		Gru::new(sw, sw2).map(Self)
	}
}

impl RecurrentCell for GruRelu<'_> {
	fn input_size(&self) -> usize {
		self.0.input_size()
	}

	fn state_size(&self) -> usize {
		self.0.state_size()
	}

	fn scratch_size(&self) -> usize {
		self.0.scratch_size()
	}

	fn step(&self, x: &[f32], prev: &[f32], _memory: &mut [f32], scratch: &mut [f32], next: &mut [f32]) {
		gated_step(x, prev, self.0.sw, self.0.sw2, relu, scratch, next);
	}
}

#[inline]
fn gated_step(
	x: &[f32],
	prev: &[f32],
	sw: &Matrix,
	sw2: &Matrix,
	candidate: impl Fn(f32) -> f32,
	xf: &mut [f32],
	next: &mut [f32],
) {
	let size = prev.len();
	debug_assert_eq!(x.len(), 3 * size);
	debug_assert_eq!(xf.len(), 3 * size);
	debug_assert_eq!(next.len(), size);

	xf.copy_from_slice(x);
	let (zr, hbar) = xf.split_at_mut(2 * size);
	accumulate_transposed(sw, prev, zr);
	for value in zr.iter_mut() {
		*value = logistic(*value);
	}
	let (z, r) = zr.split_at(size);

	// `next` holds r ⊙ h until the final update.
	for (reset, &gate, &h) in izip!(next.iter_mut(), r, prev) {
		*reset = gate * h;
	}
	accumulate_transposed(sw2, next, hbar);
	for (h_next, &gate, &h, &cand) in izip!(next.iter_mut(), z, prev, hbar.iter()) {
		*h_next = gate * h + (1.0 - gate) * candidate(cand);
	}
}

/// A single GRU step. `xf` is scratch space of `3 * size` values.
pub fn gru_step(
	x: &[f32],
	istate: &[f32],
	sw: &Matrix,
	sw2: &Matrix,
	xf: &mut [f32],
	ostate: &mut [f32],
) {
	gated_step(x, istate, sw, sw2, f32::tanh, xf, ostate);
}

/// A single GRU-ReLU step. `xf` is scratch space of `3 * size` values.
pub fn gru_relu_step(
	x: &[f32],
	istate: &[f32],
	sw: &Matrix,
	sw2: &Matrix,
	xf: &mut [f32],
	ostate: &mut [f32],
) {
	gated_step(x, istate, sw, sw2, relu, xf, ostate);
}

pub fn gru(
	x: &Matrix,
	sw: &Matrix,
	sw2: &Matrix,
	direction: Direction,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	run(&Gru::new(sw, sw2)?, x, direction, out)
}

pub fn gru_forward(x: &Matrix, sw: &Matrix, sw2: &Matrix, out: Option<Matrix>) -> Result<Matrix, Error> {
	gru(x, sw, sw2, Direction::Forward, out)
}

pub fn gru_backward(x: &Matrix, sw: &Matrix, sw2: &Matrix, out: Option<Matrix>) -> Result<Matrix, Error> {
	gru(x, sw, sw2, Direction::Backward, out)
}

pub fn gru_vec(
	xs: &MatrixBatch,
	sw: &Matrix,
	sw2: &Matrix,
	direction: Direction,
) -> Result<MatrixBatch, Error> {
	run_vec(&Gru::new(sw, sw2)?, xs, direction)
}

pub fn gru_relu(
	x: &Matrix,
	sw: &Matrix,
	sw2: &Matrix,
	direction: Direction,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	run(&GruRelu::new(sw, sw2)?, x, direction, out)
}

pub fn gru_relu_forward(
	x: &Matrix,
	sw: &Matrix,
	sw2: &Matrix,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	gru_relu(x, sw, sw2, Direction::Forward, out)
}

pub fn gru_relu_backward(
	x: &Matrix,
	sw: &Matrix,
	sw2: &Matrix,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	gru_relu(x, sw, sw2, Direction::Backward, out)
}

pub fn gru_relu_vec(
	xs: &MatrixBatch,
	sw: &Matrix,
	sw2: &Matrix,
	direction: Direction,
) -> Result<MatrixBatch, Error> {
	run_vec(&GruRelu::new(sw, sw2)?, xs, direction)
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;
	use crate::recurrent::test_utils::*;

	/// Straightforward transcription of the GRU equations.
	fn reference_step(x: &[f32], h: &[f32], sw: &Matrix, sw2: &Matrix, relu_candidate: bool) -> Vec<f32> {
		let size = h.len();
		let z = (0..size)
			.map(|o| logistic(x[o] + (0..size).map(|k| sw[(k, o)] * h[k]).sum::<f32>()))
			.collect::<Vec<_>>();
		let r = (0..size)
			.map(|o| logistic(x[size + o] + (0..size).map(|k| sw[(k, size + o)] * h[k]).sum::<f32>()))
			.collect::<Vec<_>>();
		(0..size)
			.map(|o| {
				let pre = x[2 * size + o] + (0..size).map(|k| sw2[(k, o)] * r[k] * h[k]).sum::<f32>();
				let cand = if relu_candidate { pre.max(0.0) } else { pre.tanh() };
				z[o] * h[o] + (1.0 - z[o]) * cand
			})
			.collect()
	}

	#[test]
	fn test_gru_matches_reference() {
		let mut rng = seeded(10);
		let size = 6;
		let sw = random_matrix(&mut rng, size, 2 * size, 0.4);
		let sw2 = random_matrix(&mut rng, size, size, 0.4);
		let x = random_matrix(&mut rng, 3 * size, 8, 1.0);

		for relu_candidate in [false, true] {
			let out = if relu_candidate {
				gru_relu_forward(&x, &sw, &sw2, None).unwrap()
			} else {
				gru_forward(&x, &sw, &sw2, None).unwrap()
			};
			let mut h = vec![0.0; size];
			for t in 0..x.nc() {
				h = reference_step(x.col(t), &h, &sw, &sw2, relu_candidate);
				for (a, b) in out.col(t).iter().zip(&h) {
					assert!((a - b).abs() < 1e-5);
				}
			}
		}
	}

	#[test]
	fn test_gru_step_from_zero_state() {
		let size = 2;
		let sw = Matrix::zeros(size, 2 * size);
		let sw2 = Matrix::zeros(size, size);
		let x = [0.0, 0.0, 0.0, 0.0, 1.0, -1.0];
		let mut xf = [0.0; 6];
		let mut h = [0.0; 2];
		gru_step(&x, &[0.0; 2], &sw, &sw2, &mut xf, &mut h);
		assert!((h[0] - 0.5 * 1f32.tanh()).abs() < 1e-7);
		assert!((h[1] + 0.5 * 1f32.tanh()).abs() < 1e-7);

		gru_relu_step(&x, &[0.0; 2], &sw, &sw2, &mut xf, &mut h);
		assert_eq!(h, [0.5, 0.0]);
	}

	#[test]
	fn test_gru_contract() {
		let mut rng = seeded(11);
		let sw = random_matrix(&mut rng, 5, 10, 0.4);
		let sw2 = random_matrix(&mut rng, 5, 5, 0.4);
		check_cell_contract(&Gru::new(&sw, &sw2).unwrap(), &mut rng);
		check_cell_contract(&GruRelu::new(&sw, &sw2).unwrap(), &mut rng);
	}

	#[test]
	fn test_gru_rejects_bad_state_matrices() {
		let sw = Matrix::zeros(4, 12);
		let sw2 = Matrix::zeros(4, 4);
		assert_matches!(Gru::new(&sw, &sw2), Err(Error::ShapeMismatch { arg: "sw", .. }));
		let sw = Matrix::zeros(4, 8);
		assert_matches!(
			Gru::new(&sw, &Matrix::zeros(4, 3)),
			Err(Error::ShapeMismatch { arg: "sw2", .. })
		);
	}
}
