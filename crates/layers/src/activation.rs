// Copyright 2025 Irreducible Inc.

//! Elementwise activation functions.
//!
//! Every function touches the logical elements of a matrix only and leaves the padding at zero.

use super::{batch::MatrixBatch, matrix::Matrix};

#[inline]
pub fn logistic(x: f32) -> f32 {
	1.0 / (1.0 + (-x).exp())
}

#[inline]
pub fn elu(x: f32) -> f32 {
	if x >= 0.0 {
		x
	} else {
		x.exp_m1()
	}
}

#[inline]
pub fn relu(x: f32) -> f32 {
	x.max(0.0)
}

/// `ln(1 + e^x)` without overflow for large `x`.
#[inline]
pub fn softplus(x: f32) -> f32 {
	x.max(0.0) + (-x.abs()).exp().ln_1p()
}

/// `ln(min_prob + (1 - min_prob) x)`, a logarithm bounded below by `ln(min_prob)` on `[0, 1]`.
#[inline]
pub fn robustlog(x: f32, min_prob: f32) -> f32 {
	(min_prob + (1.0 - min_prob) * x).ln()
}

/// An elementwise activation, as selected by a network architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activation {
	Identity,
	Tanh,
	Exp,
	Log,
	Elu,
	Relu,
	Logistic,
}

impl Activation {
	#[inline]
	pub fn apply(self, x: f32) -> f32 {
		match self {
			Self::Identity => x,
			Self::Tanh => x.tanh(),
			Self::Exp => x.exp(),
			Self::Log => x.ln(),
			Self::Elu => elu(x),
			Self::Relu => relu(x),
			Self::Logistic => logistic(x),
		}
	}

	pub fn apply_inplace(self, matrix: &mut Matrix) {
		if self != Self::Identity {
			matrix.map_inplace(|x| self.apply(x));
		}
	}

	pub fn apply_inplace_vec(self, batch: &mut MatrixBatch) {
		if self != Self::Identity {
			batch.map_values_inplace(|x| self.apply(x));
		}
	}
}

pub fn tanh_activation_inplace(matrix: &mut Matrix) {
	Activation::Tanh.apply_inplace(matrix);
}

pub fn tanh_activation_inplace_vec(batch: &mut MatrixBatch) {
	Activation::Tanh.apply_inplace_vec(batch);
}

pub fn exp_activation_inplace(matrix: &mut Matrix) {
	Activation::Exp.apply_inplace(matrix);
}

pub fn log_activation_inplace(matrix: &mut Matrix) {
	Activation::Log.apply_inplace(matrix);
}

pub fn elu_activation_inplace(matrix: &mut Matrix) {
	Activation::Elu.apply_inplace(matrix);
}

pub fn elu_activation_inplace_vec(batch: &mut MatrixBatch) {
	Activation::Elu.apply_inplace_vec(batch);
}

pub fn relu_activation_inplace(matrix: &mut Matrix) {
	Activation::Relu.apply_inplace(matrix);
}

pub fn logistic_activation_inplace(matrix: &mut Matrix) {
	Activation::Logistic.apply_inplace(matrix);
}

pub fn robustlog_activation_inplace(matrix: &mut Matrix, min_prob: f32) {
	matrix.map_inplace(|x| robustlog(x, min_prob));
}
