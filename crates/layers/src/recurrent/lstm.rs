// Copyright 2025 Irreducible Inc.

use super::{check_state_matrix, run, run_fused, run_vec, Direction, RecurrentCell};
use crate::{
	activation::logistic,
	batch::MatrixBatch,
	error::Error,
	matrix::{accumulate_transposed, Matrix},
};

/// Long short-term memory cell without peepholes.
///
/// The pre-projected input and `sw` (`size x 4 * size`) are laid out as
/// `[candidate | input | forget | output]`:
///
/// ```text
/// c' = σ(f) ⊙ c + σ(i) ⊙ tanh(a)
/// h' = σ(o) ⊙ tanh(c')
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Lstm<'a> {
	sw: &'a Matrix,
}

impl<'a> Lstm<'a> {
	pub fn new(sw: &'a Matrix) -> Result<Self, Error> {
		check_state_matrix("sw", sw, 4)?;
		Ok(Self { sw })
	}
}

impl RecurrentCell for Lstm<'_> {
	fn input_size(&self) -> usize {
		4 * self.sw.nr()
	}

	fn state_size(&self) -> usize {
		self.sw.nr()
	}

	fn scratch_size(&self) -> usize {
		4 * self.sw.nr()
	}

	fn memory_size(&self) -> usize {
		self.sw.nr()
	}

	fn step(&self, x: &[f32], prev: &[f32], memory: &mut [f32], scratch: &mut [f32], next: &mut [f32]) {
		lstm_step(x, prev, self.sw, scratch, memory, next);
	}
}

/// A single LSTM step. `xf` is scratch space of `4 * size` values; `state` is the memory cell,
/// updated in place.
pub fn lstm_step(
	x: &[f32],
	out_prev: &[f32],
	sw: &Matrix,
	xf: &mut [f32],
	state: &mut [f32],
	output: &mut [f32],
) {
	let size = out_prev.len();
	debug_assert_eq!(x.len(), 4 * size);
	debug_assert_eq!(state.len(), size);

	xf.copy_from_slice(x);
	accumulate_transposed(sw, out_prev, xf);
	let (candidate, gates) = xf.split_at(size);
	let (input, gates) = gates.split_at(size);
	let (forget, out_gate) = gates.split_at(size);
	for i in 0..size {
		state[i] = logistic(forget[i]) * state[i] + logistic(input[i]) * candidate[i].tanh();
		output[i] = logistic(out_gate[i]) * state[i].tanh();
	}
}

pub fn lstm(x: &Matrix, sw: &Matrix, direction: Direction, out: Option<Matrix>) -> Result<Matrix, Error> {
	run(&Lstm::new(sw)?, x, direction, out)
}

pub fn lstm_forward(x: &Matrix, sw: &Matrix, out: Option<Matrix>) -> Result<Matrix, Error> {
	lstm(x, sw, Direction::Forward, out)
}

pub fn lstm_backward(x: &Matrix, sw: &Matrix, out: Option<Matrix>) -> Result<Matrix, Error> {
	lstm(x, sw, Direction::Backward, out)
}

pub fn lstm_vec(xs: &MatrixBatch, sw: &Matrix, direction: Direction) -> Result<MatrixBatch, Error> {
	run_vec(&Lstm::new(sw)?, xs, direction)
}

/// Input projection `Wᵀ x + b` fused with an LSTM sweep.
pub fn lstm_linear(
	x: &Matrix,
	sw: &Matrix,
	w: &Matrix,
	b: &Matrix,
	direction: Direction,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	run_fused(&Lstm::new(sw)?, x, w, b, direction, out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::recurrent::test_utils::*;

	#[test]
	fn test_lstm_matches_reference() {
		let mut rng = seeded(30);
		let size = 5;
		let sw = random_matrix(&mut rng, size, 4 * size, 0.4);
		let x = random_matrix(&mut rng, 4 * size, 12, 1.0);
		let out = lstm_forward(&x, &sw, None).unwrap();

		let mut h = vec![0.0f32; size];
		let mut c = vec![0.0f32; size];
		for t in 0..x.nc() {
			let pre = |block: usize, o: usize| {
				x[(block * size + o, t)]
					+ (0..size)
						.map(|k| sw[(k, block * size + o)] * h[k])
						.sum::<f32>()
			};
			let (mut h_next, mut c_next) = (vec![0.0; size], vec![0.0; size]);
			for o in 0..size {
				c_next[o] = logistic(pre(2, o)) * c[o] + logistic(pre(1, o)) * pre(0, o).tanh();
				h_next[o] = logistic(pre(3, o)) * c_next[o].tanh();
			}
			h = h_next;
			c = c_next;
			for (a, b) in out.col(t).iter().zip(&h) {
				assert!((a - b).abs() < 1e-5);
			}
		}
	}

	#[test]
	fn test_lstm_output_is_bounded() {
		let mut rng = seeded(31);
		let sw = random_matrix(&mut rng, 4, 16, 3.0);
		let x = random_matrix(&mut rng, 16, 40, 10.0);
		let out = lstm_backward(&x, &sw, None).unwrap();
		assert!(out.values().all(|v| v.abs() <= 1.0));
	}

	#[test]
	fn test_lstm_contract() {
		let mut rng = seeded(32);
		let sw = random_matrix(&mut rng, 4, 16, 0.4);
		check_cell_contract(&Lstm::new(&sw).unwrap(), &mut rng);
	}

	#[test]
	fn test_lstm_batch_matches_single() {
		let mut rng = seeded(33);
		let sw = random_matrix(&mut rng, 3, 12, 0.4);
		let members = (0..4)
			.map(|_| random_matrix(&mut rng, 12, 6, 1.0))
			.collect::<Vec<_>>();
		let batch = MatrixBatch::new(members.clone()).unwrap();
		let batched = lstm_vec(&batch, &sw, Direction::Forward).unwrap();
		for (member, result) in members.iter().zip(&batched) {
			assert_eq!(&lstm_forward(member, &sw, None).unwrap(), result);
		}
	}
}
