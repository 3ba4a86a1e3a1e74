// Copyright 2025 Irreducible Inc.

//! Recurrent layers.
//!
//! A layer is a [`RecurrentCell`] swept along the columns of its pre-projected input, either
//! forwards or backwards, starting from a zero state. Output column `t` is always the state
//! produced after consuming input column `t`, so a backward sweep writes its results in the
//! original column order.

mod gru;
mod grumod;
mod lstm;

pub use gru::*;
pub use grumod::*;
pub use lstm::*;

use squiggle_utils::ensure;
use tracing::instrument;

use super::{
	batch::MatrixBatch,
	error::Error,
	matrix::{affine_column, Matrix},
};

/// Sweep direction of a recurrent layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
	Forward,
	Backward,
}

impl Direction {
	pub const fn reverse(self) -> Self {
		match self {
			Self::Forward => Self::Backward,
			Self::Backward => Self::Forward,
		}
	}

	/// Column visited at step `i` of a sweep over `n` columns.
	#[inline(always)]
	const fn column(self, i: usize, n: usize) -> usize {
		match self {
			Self::Forward => i,
			Self::Backward => n - 1 - i,
		}
	}
}

/// A single recurrent step.
///
/// Implementations read the pre-projected input column `x` and the previous state `prev`, and
/// write the next state into `next`. Cells that carry state beyond their output (the LSTM memory
/// cell) update `memory` in place. `scratch` is working space of [`Self::scratch_size`] values
/// whose content on entry is unspecified.
pub trait RecurrentCell: Sync {
	/// Rows of the pre-projected input.
	fn input_size(&self) -> usize;

	/// Rows of the state, and of the layer output.
	fn state_size(&self) -> usize;

	fn scratch_size(&self) -> usize;

	fn memory_size(&self) -> usize {
		0
	}

	fn step(&self, x: &[f32], prev: &[f32], memory: &mut [f32], scratch: &mut [f32], next: &mut [f32]);
}

/// State carried between the steps of one sweep.
struct Sweep {
	state: Vec<f32>,
	next: Vec<f32>,
	memory: Vec<f32>,
	scratch: Vec<f32>,
}

impl Sweep {
	fn new(cell: &impl RecurrentCell) -> Self {
		Self {
			state: vec![0.0; cell.state_size()],
			next: vec![0.0; cell.state_size()],
			memory: vec![0.0; cell.memory_size()],
			scratch: vec![0.0; cell.scratch_size()],
		}
	}

	#[inline]
	fn advance(&mut self, cell: &impl RecurrentCell, x: &[f32]) -> &[f32] {
		cell.step(x, &self.state, &mut self.memory, &mut self.scratch, &mut self.next);
		std::mem::swap(&mut self.state, &mut self.next);
		&self.state
	}
}

/// Runs `cell` over the columns of the pre-projected input `x`.
#[instrument(skip_all, level = "debug")]
pub fn run(
	cell: &impl RecurrentCell,
	x: &Matrix,
	direction: Direction,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	ensure!(
		x.nr() == cell.input_size(),
		Error::ShapeMismatch {
			arg: "x",
			expected: (cell.input_size(), x.nc()),
			actual: x.shape(),
		}
	);

	let n = x.nc();
	let mut out = Matrix::remake(out, cell.state_size(), n)?;
	let mut sweep = Sweep::new(cell);
	for i in 0..n {
		let t = direction.column(i, n);
		out.col_mut(t).copy_from_slice(sweep.advance(cell, x.col(t)));
	}
	Ok(out)
}

/// Projects every column of `x` with `Wᵀ x + b` and runs `cell` over the projections, without
/// materialising the projected matrix.
///
/// The result is identical to [`crate::linear::feedforward_linear`] followed by [`run`].
#[instrument(skip_all, level = "debug")]
pub fn run_fused(
	cell: &impl RecurrentCell,
	x: &Matrix,
	w: &Matrix,
	b: &Matrix,
	direction: Direction,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	ensure!(
		w.shape() == (x.nr(), cell.input_size()),
		Error::ShapeMismatch {
			arg: "w",
			expected: (x.nr(), cell.input_size()),
			actual: w.shape(),
		}
	);
	ensure!(
		b.shape() == (cell.input_size(), 1),
		Error::ShapeMismatch {
			arg: "b",
			expected: (cell.input_size(), 1),
			actual: b.shape(),
		}
	);

	let n = x.nc();
	let mut out = Matrix::remake(out, cell.state_size(), n)?;
	let mut sweep = Sweep::new(cell);
	let mut projected = vec![0.0; cell.input_size()];
	for i in 0..n {
		let t = direction.column(i, n);
		affine_column(w, b, x.col(t), &mut projected);
		out.col_mut(t).copy_from_slice(sweep.advance(cell, &projected));
	}
	Ok(out)
}

/// Batched [`run`].
pub fn run_vec(
	cell: &impl RecurrentCell,
	xs: &MatrixBatch,
	direction: Direction,
) -> Result<MatrixBatch, Error> {
	xs.par_map(|x| run(cell, x, direction, None))
}

/// Batched [`run_fused`].
pub fn run_fused_vec(
	cell: &impl RecurrentCell,
	xs: &MatrixBatch,
	w: &Matrix,
	b: &Matrix,
	direction: Direction,
) -> Result<MatrixBatch, Error> {
	xs.par_map(|x| run_fused(cell, x, w, b, direction, None))
}

/// Checks a state-transition matrix is `state_size x (gates * state_size)`.
fn check_state_matrix(
	arg: &'static str,
	sw: &Matrix,
	gates: usize,
) -> Result<usize, Error> {
	let size = sw.nr();
	ensure!(size > 0, Error::ZeroArgument { arg });
	ensure!(
		sw.nc() == gates * size,
		Error::ShapeMismatch {
			arg,
			expected: (size, gates * size),
			actual: sw.shape(),
		}
	);
	Ok(size)
}

#[cfg(test)]
pub(crate) mod test_utils {
	use rand::{rngs::StdRng, Rng, SeedableRng};

	use super::*;

	pub fn random_matrix(rng: &mut StdRng, nr: usize, nc: usize, scale: f32) -> Matrix {
		Matrix::from_fn(nr, nc, |_, _| rng.gen_range(-scale..scale))
	}

	pub fn seeded(seed: u64) -> StdRng {
		StdRng::seed_from_u64(seed)
	}

	/// Checks the properties every cell shares: a backward sweep equals a forward sweep over the
	/// reversed input, reversed back; the fused path equals projection followed by the sweep;
	/// batched sweeps equal single sweeps.
	pub fn check_cell_contract(cell: &impl RecurrentCell, rng: &mut StdRng) {
		let x = random_matrix(rng, cell.input_size(), 17, 1.0);

		let backward = run(cell, &x, Direction::Backward, None).unwrap();
		let forward_on_reversed = run(cell, &x.reverse_columns(), Direction::Forward, None).unwrap();
		assert_eq!(backward, forward_on_reversed.reverse_columns());

		let nin = 5;
		let w = random_matrix(rng, nin, cell.input_size(), 0.5);
		let b = random_matrix(rng, cell.input_size(), 1, 0.5);
		let raw = random_matrix(rng, nin, 11, 1.0);
		let projected = crate::linear::feedforward_linear(&raw, &w, &b, None).unwrap();
		for direction in [Direction::Forward, Direction::Backward] {
			let staged = run(cell, &projected, direction, None).unwrap();
			let fused = run_fused(cell, &raw, &w, &b, direction, None).unwrap();
			assert_eq!(staged, fused);
		}

		let members = (0..3)
			.map(|_| random_matrix(rng, cell.input_size(), 9, 1.0))
			.collect::<Vec<_>>();
		let batch = MatrixBatch::new(members.clone()).unwrap();
		let batched = run_vec(cell, &batch, Direction::Backward).unwrap();
		for (member, result) in members.iter().zip(batched.iter()) {
			assert_eq!(&run(cell, member, Direction::Backward, None).unwrap(), result);
		}

		let empty = Matrix::zeros(cell.input_size(), 0);
		assert_eq!(run(cell, &empty, Direction::Forward, None).unwrap().shape(), (cell.state_size(), 0));
	}
}
