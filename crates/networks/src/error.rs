// Copyright 2025 Irreducible Inc.

use crate::params::CellKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("layer error: {0}")]
	Layer(#[from] squiggle_layers::Error),
	#[error("unknown model {0:?}")]
	UnknownModel(String),
	#[error("signal window [{start}, {end}) does not fit in {len} samples")]
	InvalidWindow { start: usize, end: usize, len: usize },
	#[error("{cell:?} layers need {expected} state matrices each, the parameter set has {actual}")]
	CellParameterMismatch {
		cell: CellKind,
		expected: usize,
		actual: usize,
	},
	#[error("parameter {name} has shape {actual:?}, expected {expected:?}")]
	ParameterShape {
		name: String,
		expected: (usize, usize),
		actual: (usize, usize),
	},
	#[error("{signals} signals were given {slots} output slots")]
	SlotCountMismatch { signals: usize, slots: usize },
	#[error("environment variable {var} has invalid value {value:?}")]
	InvalidEnvVar { var: &'static str, value: String },
}
