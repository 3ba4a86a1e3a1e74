// Copyright 2025 Irreducible Inc.

use getset::{CopyGetters, Getters};

use crate::matrix::Matrix;

/// A transition between two states, scored by one parameter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
	pub from: usize,
	pub to: usize,
	pub row: usize,
}

impl Transition {
	pub const fn new(from: usize, to: usize, row: usize) -> Self {
		Self { from, to, row }
	}
}

/// States and scored transitions of a linear-chain CRF.
///
/// A path visits one state per position boundary, so a matrix of `T` score columns describes
/// paths of `T` transitions over `T + 1` states. Every state may start a path.
#[derive(Debug, Clone, PartialEq, Eq, CopyGetters, Getters)]
pub struct Topology {
	#[getset(get_copy = "pub")]
	nstate: usize,
	/// Number of parameter rows the transitions refer to.
	#[getset(get_copy = "pub")]
	nrow: usize,
	#[getset(get = "pub")]
	transitions: Vec<Transition>,
	/// Number of transitions scored by each row.
	#[getset(get = "pub")]
	row_multiplicity: Vec<usize>,
}

/// Forward and backward log-sums of a score matrix.
pub(super) struct Lattice {
	nstate: usize,
	alpha: Vec<f64>,
	beta: Vec<f64>,
	log_partition: f64,
}

impl Lattice {
	#[inline]
	fn alpha(&self, t: usize) -> &[f64] {
		&self.alpha[t * self.nstate..(t + 1) * self.nstate]
	}

	#[inline]
	fn beta(&self, t: usize) -> &[f64] {
		&self.beta[t * self.nstate..(t + 1) * self.nstate]
	}

	pub(super) fn log_partition(&self) -> f64 {
		self.log_partition
	}
}

impl Topology {
	pub fn new(nstate: usize, nrow: usize, transitions: Vec<Transition>) -> Self {
		debug_assert!(transitions
			.iter()
			.all(|t| t.from < nstate && t.to < nstate && t.row < nrow));
		let mut row_multiplicity = vec![0; nrow];
		for t in &transitions {
			row_multiplicity[t.row] += 1;
		}
		Self {
			nstate,
			nrow,
			transitions,
			row_multiplicity,
		}
	}

	/// Whether some row scores more than one transition.
	pub fn shares_rows(&self) -> bool {
		self.row_multiplicity.iter().any(|&m| m > 1)
	}

	/// Log of the sum, over all paths, of the exponentiated path scores.
	///
	/// Rows of `scores` at or beyond [`Self::nrow`] are ignored.
	pub fn log_partition(&self, scores: &Matrix) -> f64 {
		let nc = scores.nc();
		let mut alpha = vec![0.0; self.nstate];
		let mut next = vec![0.0; self.nstate];
		for t in 0..nc {
			self.forward_step(scores.col(t), &alpha, &mut next);
			std::mem::swap(&mut alpha, &mut next);
		}
		log_sum_exp(&alpha)
	}

	fn forward_step(&self, scores: &[f32], alpha: &[f64], next: &mut [f64]) {
		next.fill(f64::NEG_INFINITY);
		for tr in &self.transitions {
			next[tr.to] = log_add(next[tr.to], alpha[tr.from] + f64::from(scores[tr.row]));
		}
	}

	fn backward_step(&self, scores: &[f32], beta: &[f64], prev: &mut [f64]) {
		prev.fill(f64::NEG_INFINITY);
		for tr in &self.transitions {
			prev[tr.from] = log_add(prev[tr.from], f64::from(scores[tr.row]) + beta[tr.to]);
		}
	}

	pub(super) fn lattice(&self, scores: &Matrix) -> Lattice {
		let (ns, nc) = (self.nstate, scores.nc());
		let mut alpha = vec![0.0; (nc + 1) * ns];
		let mut beta = vec![0.0; (nc + 1) * ns];
		for t in 0..nc {
			let (done, rest) = alpha.split_at_mut((t + 1) * ns);
			self.forward_step(scores.col(t), &done[t * ns..], &mut rest[..ns]);
		}
		for t in (0..nc).rev() {
			let (head, tail) = beta.split_at_mut((t + 1) * ns);
			self.backward_step(scores.col(t), &tail[..ns], &mut head[t * ns..]);
		}
		let log_partition = log_sum_exp(&alpha[nc * ns..]);
		Lattice {
			nstate: ns,
			alpha,
			beta,
			log_partition,
		}
	}

	/// Posterior mass of each parameter row at position `t`, accumulated into `mass`.
	pub(super) fn row_posteriors(&self, lattice: &Lattice, scores: &[f32], t: usize, mass: &mut [f64]) {
		mass.fill(0.0);
		let (alpha, beta) = (lattice.alpha(t), lattice.beta(t + 1));
		for tr in &self.transitions {
			let log_weight = alpha[tr.from] + f64::from(scores[tr.row]) + beta[tr.to];
			mass[tr.row] += (log_weight - lattice.log_partition).exp();
		}
	}

	/// Per-row output probabilities at position `t`.
	///
	/// Equal to [`Self::row_posteriors`] when every row scores a single transition. Otherwise the
	/// mass of each row is averaged over the transitions it scores and the column renormalised,
	/// so a shared row is weighted like any other row.
	pub(super) fn row_marginals(&self, lattice: &Lattice, scores: &[f32], t: usize, mass: &mut [f64]) {
		self.row_posteriors(lattice, scores, t, mass);
		if !self.shares_rows() {
			return;
		}
		for (m, &count) in mass.iter_mut().zip(&self.row_multiplicity) {
			if count > 0 {
				*m /= count as f64;
			}
		}
		let total = mass.iter().sum::<f64>();
		if total > 0.0 {
			for m in mass.iter_mut() {
				*m /= total;
			}
		}
	}
}

#[inline]
fn log_add(a: f64, b: f64) -> f64 {
	if a == f64::NEG_INFINITY {
		return b;
	}
	if b == f64::NEG_INFINITY {
		return a;
	}
	let (hi, lo) = if a > b { (a, b) } else { (b, a) };
	hi + (lo - hi).exp().ln_1p()
}

fn log_sum_exp(values: &[f64]) -> f64 {
	values.iter().copied().fold(f64::NEG_INFINITY, log_add)
}
