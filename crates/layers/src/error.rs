// Copyright 2025 Irreducible Inc.

use crate::crf::Encoding;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("failed to allocate storage for a {nr}x{nc} matrix")]
	Allocation { nr: usize, nc: usize },
	#[error("argument {arg} has shape {actual:?}, expected {expected:?}")]
	ShapeMismatch {
		arg: &'static str,
		expected: (usize, usize),
		actual: (usize, usize),
	},
	#[error("argument {arg} does not have expected length {expected}")]
	IncorrectArgumentLength { arg: &'static str, expected: usize },
	#[error("argument {arg} must be non-zero")]
	ZeroArgument { arg: &'static str },
	#[error("weight matrix with {weight_rows} rows does not cover whole windows of {input_rows}-row columns")]
	IncompatibleWindow {
		weight_rows: usize,
		input_rows: usize,
	},
	#[error("index {index} is out of range for a table with {len} entries")]
	IndexOutOfRange { index: usize, len: usize },
	#[error("batch member {index} has shape {actual:?}, expected {expected:?}")]
	BatchShapeMismatch {
		index: usize,
		expected: (usize, usize),
		actual: (usize, usize),
	},
	#[error("batches have {actual} and {expected} members")]
	BatchLengthMismatch { expected: usize, actual: usize },
	#[error("temperature must be positive and finite, got {0}")]
	InvalidTemperature(f32),
	#[error("{nparam} parameters do not describe a {encoding} output layer")]
	InvalidParameterCount { encoding: Encoding, nparam: usize },
}
