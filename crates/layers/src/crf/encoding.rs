// Copyright 2025 Irreducible Inc.

use std::fmt;

use squiggle_utils::checked_arithmetics::{exact_div, exact_isqrt};

use super::topology::{Topology, Transition};
use crate::error::Error;

/// How the output layer parameters of a network describe transitions between bases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
	/// Every base has a flip and a flop state; `2N(N+1)` parameters.
	FlipFlop,
	/// One state per base with separate move and stay scores; `N(N+1)` parameters.
	ManyStay,
	/// Base moves plus a shared stay score and per-base run-length distribution
	/// parameters; `3N+1` parameters.
	RunLength,
	/// Full base-to-base transition scores plus per-base run-length distribution parameters;
	/// `N(N+2)` parameters.
	CrfRunLength,
}

impl Encoding {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::FlipFlop => "flip-flop",
			Self::ManyStay => "many-stay",
			Self::RunLength => "run-length",
			Self::CrfRunLength => "crf-run-length",
		}
	}

	/// Number of output parameters per position for an alphabet of `nbase` bases.
	pub const fn nparam(self, nbase: usize) -> usize {
		match self {
			Self::FlipFlop => 2 * nbase * (nbase + 1),
			Self::ManyStay => nbase * (nbase + 1),
			Self::RunLength => 3 * nbase + 1,
			Self::CrfRunLength => nbase * (nbase + 2),
		}
	}

	/// Smallest alphabet the encoding can describe. Run-length v1 needs a second base for its
	/// move rows to be reachable.
	pub const fn min_nbase(self) -> usize {
		match self {
			Self::RunLength => 2,
			Self::FlipFlop | Self::ManyStay | Self::CrfRunLength => 1,
		}
	}

	/// Alphabet size described by `nparam` output parameters.
	pub fn nbase(self, nparam: usize) -> Result<usize, Error> {
		match self {
			Self::FlipFlop => nbase_from_flipflop_nparam(nparam),
			Self::ManyStay => nbase_from_manystay_nparam(nparam),
			Self::RunLength => nbase_from_runlength_nparam(nparam),
			Self::CrfRunLength => nbase_from_crf_runlength_nparam(nparam),
		}
	}

	/// Number of leading parameter rows that score transitions. The remaining rows carry
	/// run-length distribution parameters.
	pub const fn transition_rows(self, nbase: usize) -> usize {
		match self {
			Self::FlipFlop | Self::ManyStay => self.nparam(nbase),
			Self::RunLength => nbase + 1,
			Self::CrfRunLength => nbase * nbase,
		}
	}

	/// Transition structure of the encoding for `nbase` bases.
	pub fn topology(self, nbase: usize) -> Topology {
		let n = nbase;
		let mut transitions = Vec::new();
		let nstate = match self {
			Self::FlipFlop => {
				for b in 0..n {
					for from in 0..2 * n {
						transitions.push(Transition::new(from, b, b * 2 * n + from));
					}
				}
				for b in 0..n {
					transitions.push(Transition::new(b, n + b, 2 * n * n + b));
					transitions.push(Transition::new(n + b, n + b, 2 * n * n + n + b));
				}
				2 * n
			}
			Self::ManyStay => {
				for to in 0..n {
					for from in 0..n {
						transitions.push(Transition::new(from, to, to * n + from));
					}
				}
				for b in 0..n {
					transitions.push(Transition::new(b, b, n * n + b));
				}
				n
			}
			Self::RunLength => {
				for to in 0..n {
					for from in 0..n {
						let row = if from == to { 0 } else { 1 + to };
						transitions.push(Transition::new(from, to, row));
					}
				}
				n
			}
			Self::CrfRunLength => {
				for to in 0..n {
					for from in 0..n {
						transitions.push(Transition::new(from, to, to * n + from));
					}
				}
				n
			}
		};
		Topology::new(nstate, self.transition_rows(nbase), transitions)
	}
}

impl fmt::Display for Encoding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

fn invalid(encoding: Encoding, nparam: usize) -> Error {
	Error::InvalidParameterCount { encoding, nparam }
}

/// Inverse of `2N(N+1)`: `2·nparam + 1 = (2N+1)²`.
pub fn nbase_from_flipflop_nparam(nparam: usize) -> Result<usize, Error> {
	nparam
		.checked_mul(2)
		.and_then(|v| v.checked_add(1))
		.and_then(exact_isqrt)
		.map(|root| (root - 1) / 2)
		.filter(|&nbase| nbase > 0)
		.ok_or_else(|| invalid(Encoding::FlipFlop, nparam))
}

/// Inverse of `N(N+1)`: `4·nparam + 1 = (2N+1)²`.
pub fn nbase_from_manystay_nparam(nparam: usize) -> Result<usize, Error> {
	nparam
		.checked_mul(4)
		.and_then(|v| v.checked_add(1))
		.and_then(exact_isqrt)
		.map(|root| (root - 1) / 2)
		.filter(|&nbase| nbase > 0)
		.ok_or_else(|| invalid(Encoding::ManyStay, nparam))
}

/// Inverse of `3N+1`, for `N >= 2`.
pub fn nbase_from_runlength_nparam(nparam: usize) -> Result<usize, Error> {
	nparam
		.checked_sub(1)
		.and_then(|v| exact_div(v, 3))
		.filter(|&nbase| nbase >= Encoding::RunLength.min_nbase())
		.ok_or_else(|| invalid(Encoding::RunLength, nparam))
}

/// Inverse of `N(N+2)`: `nparam + 1 = (N+1)²`.
pub fn nbase_from_crf_runlength_nparam(nparam: usize) -> Result<usize, Error> {
	nparam
		.checked_add(1)
		.and_then(exact_isqrt)
		.map(|root| root - 1)
		.filter(|&nbase| nbase > 0)
		.ok_or_else(|| invalid(Encoding::CrfRunLength, nparam))
}
