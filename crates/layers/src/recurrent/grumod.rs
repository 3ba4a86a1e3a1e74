// Copyright 2025 Irreducible Inc.

use itertools::izip;

use super::{check_state_matrix, run, run_fused, run_fused_vec, run_vec, Direction, RecurrentCell};
use crate::{
	activation::logistic,
	batch::MatrixBatch,
	error::Error,
	matrix::{accumulate_transposed, Matrix},
};

/// Modified GRU, where the reset gate scales the recurrent contribution to the candidate
/// rather than the state itself. A single `size x 3 * size` matrix `sw` holds all three
/// recurrent blocks:
///
/// ```text
/// [z | r] = σ(x_zr + (swᵀ h)_zr)
/// ĥ       = tanh(x_h + r ⊙ (swᵀ h)_h)
/// h'      = z ⊙ h + (1 - z) ⊙ ĥ
/// ```
#[derive(Debug, Clone, Copy)]
pub struct GruMod<'a> {
	sw: &'a Matrix,
}

impl<'a> GruMod<'a> {
	pub fn new(sw: &'a Matrix) -> Result<Self, Error> {
		check_state_matrix("sw", sw, 3)?;
		Ok(Self { sw })
	}
}

impl RecurrentCell for GruMod<'_> {
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
		grumod_step(x, prev, self.sw, scratch, next);
	}
}

/// A single modified-GRU step. `xf` is scratch space of `3 * size` values.
pub fn grumod_step(x: &[f32], istate: &[f32], sw: &Matrix, xf: &mut [f32], ostate: &mut [f32]) {
	let size = istate.len();
	debug_assert_eq!(x.len(), 3 * size);
	debug_assert_eq!(xf.len(), 3 * size);

	// The candidate block starts from zero: only the recurrent part is gated by r.
	let (zr, hbar) = xf.split_at_mut(2 * size);
	zr.copy_from_slice(&x[..2 * size]);
	hbar.fill(0.0);
	accumulate_transposed(sw, istate, xf);

	let (zr, hbar) = xf.split_at_mut(2 * size);
	for value in zr.iter_mut() {
		*value = logistic(*value);
	}
	let (z, r) = zr.split_at(size);
	for (h_next, &update, &reset, &h, &rec, &input) in
		izip!(ostate.iter_mut(), z, r, istate, hbar.iter(), &x[2 * size..])
	{
		let cand = (reset * rec + input).tanh();
		*h_next = update * h + (1.0 - update) * cand;
	}
}

pub fn grumod(x: &Matrix, sw: &Matrix, direction: Direction, out: Option<Matrix>) -> Result<Matrix, Error> {
	run(&GruMod::new(sw)?, x, direction, out)
}

pub fn grumod_forward(x: &Matrix, sw: &Matrix, out: Option<Matrix>) -> Result<Matrix, Error> {
	grumod(x, sw, Direction::Forward, out)
}

pub fn grumod_backward(x: &Matrix, sw: &Matrix, out: Option<Matrix>) -> Result<Matrix, Error> {
	grumod(x, sw, Direction::Backward, out)
}

pub fn grumod_vec(xs: &MatrixBatch, sw: &Matrix, direction: Direction) -> Result<MatrixBatch, Error> {
	run_vec(&GruMod::new(sw)?, xs, direction)
}

/// Input projection `Wᵀ x + b` fused with a modified-GRU sweep.
pub fn grumod_linear(
	x: &Matrix,
	sw: &Matrix,
	w: &Matrix,
	b: &Matrix,
	direction: Direction,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	run_fused(&GruMod::new(sw)?, x, w, b, direction, out)
}

pub fn grumod_linear_vec(
	xs: &MatrixBatch,
	sw: &Matrix,
	w: &Matrix,
	b: &Matrix,
	direction: Direction,
) -> Result<MatrixBatch, Error> {
	run_fused_vec(&GruMod::new(sw)?, xs, w, b, direction)
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use proptest::prelude::*;

	use super::*;
	use crate::{linear::feedforward_linear, recurrent::test_utils::*};

	fn reference_step(x: &[f32], h: &[f32], sw: &Matrix) -> Vec<f32> {
		let size = h.len();
		let rec = |o: usize| (0..size).map(|k| sw[(k, o)] * h[k]).sum::<f32>();
		(0..size)
			.map(|o| {
				let z = logistic(x[o] + rec(o));
				let r = logistic(x[size + o] + rec(size + o));
				let cand = (x[2 * size + o] + r * rec(2 * size + o)).tanh();
				z * h[o] + (1.0 - z) * cand
			})
			.collect()
	}

	#[test]
	fn test_grumod_matches_reference() {
		let mut rng = seeded(20);
		let size = 7;
		let sw = random_matrix(&mut rng, size, 3 * size, 0.4);
		let x = random_matrix(&mut rng, 3 * size, 10, 1.0);
		let out = grumod_backward(&x, &sw, None).unwrap();

		let mut h = vec![0.0; size];
		for t in (0..x.nc()).rev() {
			h = reference_step(x.col(t), &h, &sw);
			for (a, b) in out.col(t).iter().zip(&h) {
				assert!((a - b).abs() < 1e-5);
			}
		}
	}

	#[test]
	fn test_grumod_scratch_contents_are_irrelevant() {
		let mut rng = seeded(21);
		let sw = random_matrix(&mut rng, 3, 9, 0.5);
		let x = random_matrix(&mut rng, 9, 1, 1.0);
		let h = [0.1, -0.2, 0.3];
		let mut clean = [0.0; 3];
		let mut dirty = [0.0; 3];
		grumod_step(x.col(0), &h, &sw, &mut [0.0; 9], &mut clean);
		grumod_step(x.col(0), &h, &sw, &mut [7.0; 9], &mut dirty);
		assert_eq!(clean, dirty);
	}

	#[test]
	fn test_grumod_contract() {
		let mut rng = seeded(22);
		let sw = random_matrix(&mut rng, 6, 18, 0.4);
		check_cell_contract(&GruMod::new(&sw).unwrap(), &mut rng);
	}

	#[test]
	fn test_grumod_rejects_bad_state_matrix() {
		assert_matches!(GruMod::new(&Matrix::zeros(4, 8)), Err(Error::ShapeMismatch { .. }));
		assert_matches!(GruMod::new(&Matrix::zeros(0, 0)), Err(Error::ZeroArgument { .. }));
	}

	proptest! {
		#[test]
		fn test_grumod_linear_vec_matches_staged(seed in any::<u64>(), n in 1usize..4, nc in 0usize..20) {
			let mut rng = seeded(seed);
			let size = 4;
			let sw = random_matrix(&mut rng, size, 3 * size, 0.5);
			let w = random_matrix(&mut rng, 6, 3 * size, 0.5);
			let b = random_matrix(&mut rng, 3 * size, 1, 0.5);
			let members = (0..n).map(|_| random_matrix(&mut rng, 6, nc, 1.0)).collect::<Vec<_>>();
			let batch = MatrixBatch::new(members.clone()).unwrap();

			for direction in [Direction::Forward, Direction::Backward] {
				let fused = grumod_linear_vec(&batch, &sw, &w, &b, direction).unwrap();
				let projected = crate::linear::feedforward_linear_vec(&batch, &w, &b).unwrap();
				let staged = grumod_vec(&projected, &sw, direction).unwrap();
				prop_assert_eq!(&fused, &staged);
				for (member, result) in members.iter().zip(fused.iter()) {
					let single = grumod_linear(member, &sw, &w, &b, direction, None).unwrap();
					prop_assert_eq!(&single, result);
					let unfused = grumod(&feedforward_linear(member, &w, &b, None).unwrap(), &sw, direction, None).unwrap();
					prop_assert_eq!(&unfused, result);
				}
			}
		}
	}
}
