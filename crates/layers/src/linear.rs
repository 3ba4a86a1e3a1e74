// Copyright 2025 Irreducible Inc.

//! Structural and affine kernels: embedding, windowing, convolution, feed-forward projections,
//! residual connections and softmax.
//!
//! Weight matrices are stored input-major: a layer mapping `nin` features to `nout` features
//! has an `nin x nout` weight matrix `W` and an `nout x 1` bias `b`, and computes
//! `Y = Wᵀ X + b` column by column.
//!
//! Kernels that produce a matrix accept an optional `out` matrix whose storage is reused; pass
//! `None` to have the kernel allocate.

use itertools::izip;
use squiggle_utils::{bail, ensure};
use tracing::instrument;

use super::{
	activation::{self, logistic},
	batch::MatrixBatch,
	error::Error,
	matrix::{affine_column, check_shape, Matrix},
};

/// Number of windows of width `width` taken every `stride` columns from `nc` columns.
pub const fn window_count(nc: usize, width: usize, stride: usize) -> usize {
	if nc < width {
		0
	} else {
		(nc - width) / stride + 1
	}
}

/// Looks up one column per index: column `j` of the result is row `index[j]` of `table`.
///
/// `table` is `vocabulary x dim`, the result is `dim x index.len()`.
pub fn embedding(index: &[usize], table: &Matrix, out: Option<Matrix>) -> Result<Matrix, Error> {
	let vocabulary = table.nr();
	if let Some(&bad) = index.iter().find(|&&i| i >= vocabulary) {
		bail!(Error::IndexOutOfRange {
			index: bad,
			len: vocabulary,
		});
	}

	let mut out = Matrix::remake(out, table.nc(), index.len())?;
	for (j, &row) in index.iter().enumerate() {
		for (k, value) in out.col_mut(j).iter_mut().enumerate() {
			*value = table[(row, k)];
		}
	}
	Ok(out)
}

/// Concatenates `width` consecutive columns, every `stride` columns.
///
/// The result has `width * input.nr()` rows and
/// [`window_count`]`(input.nc(), width, stride)` columns.
pub fn window(input: &Matrix, width: usize, stride: usize) -> Result<Matrix, Error> {
	ensure!(width > 0, Error::ZeroArgument { arg: "width" });
	ensure!(stride > 0, Error::ZeroArgument { arg: "stride" });

	let ncol = window_count(input.nc(), width, stride);
	let mut out = Matrix::try_zeros(width * input.nr(), ncol)?;
	for j in 0..ncol {
		gather_window(input, j * stride, width, out.col_mut(j));
	}
	Ok(out)
}

#[inline]
fn gather_window(input: &Matrix, first: usize, width: usize, dst: &mut [f32]) {
	let nr = input.nr();
	for (k, chunk) in dst.chunks_exact_mut(nr.max(1)).take(width).enumerate() {
		chunk.copy_from_slice(input.col(first + k));
	}
}

/// Filter width implied by a convolution weight matrix of `input.nr() * width` rows.
fn conv_width(input: &Matrix, w: &Matrix) -> Result<usize, Error> {
	let width = squiggle_utils::checked_arithmetics::exact_div(w.nr(), input.nr())
		.filter(|&width| width > 0)
		.ok_or(Error::IncompatibleWindow {
			weight_rows: w.nr(),
			input_rows: input.nr(),
		})?;
	Ok(width)
}

fn check_bias(arg: &'static str, b: &Matrix, nout: usize) -> Result<(), Error> {
	check_shape(arg, b, (nout, 1))
}

/// Strided one-dimensional convolution.
///
/// `w` is `(width * x.nr()) x nfilter` and every output column is `Wᵀ win + b` where `win` is
/// the concatenation of `width` consecutive input columns. The filter width is `w.nr() / x.nr()`,
/// which must divide exactly. An input shorter than the filter gives zero output columns.
#[instrument(skip_all, level = "debug")]
pub fn convolution(
	x: &Matrix,
	w: &Matrix,
	b: &Matrix,
	stride: usize,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	ensure!(stride > 0, Error::ZeroArgument { arg: "stride" });
	let width = conv_width(x, w)?;
	check_bias("b", b, w.nc())?;

	let ncol = window_count(x.nc(), width, stride);
	let mut out = Matrix::remake(out, w.nc(), ncol)?;
	let mut win = vec![0.0; w.nr()];
	for j in 0..ncol {
		gather_window(x, j * stride, width, &mut win);
		affine_column(w, b, &win, out.col_mut(j));
	}
	Ok(out)
}

/// Convolution with a gated linear unit: `(Wᵀ win + b) ⊙ σ(Iᵀ win + b_g)`.
#[allow(clippy::too_many_arguments)]
#[instrument(skip_all, level = "debug")]
pub fn convolution_gated(
	x: &Matrix,
	w: &Matrix,
	b: &Matrix,
	stride: usize,
	iw: &Matrix,
	bg: &Matrix,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	ensure!(stride > 0, Error::ZeroArgument { arg: "stride" });
	let width = conv_width(x, w)?;
	check_bias("b", b, w.nc())?;
	check_shape("iw", iw, w.shape())?;
	check_bias("bg", bg, w.nc())?;

	let ncol = window_count(x.nc(), width, stride);
	let mut out = Matrix::remake(out, w.nc(), ncol)?;
	let mut win = vec![0.0; w.nr()];
	let mut gate = vec![0.0; w.nc()];
	for j in 0..ncol {
		gather_window(x, j * stride, width, &mut win);
		affine_column(iw, bg, &win, &mut gate);
		let col = out.col_mut(j);
		affine_column(w, b, &win, col);
		for (value, &g) in col.iter_mut().zip(&gate) {
			*value *= logistic(g);
		}
	}
	Ok(out)
}

/// Batched [`convolution`].
pub fn convolution_vec(
	xs: &MatrixBatch,
	w: &Matrix,
	b: &Matrix,
	stride: usize,
) -> Result<MatrixBatch, Error> {
	xs.par_map(|x| convolution(x, w, b, stride, None))
}

/// `Y = Wᵀ X + b`.
#[instrument(skip_all, level = "trace")]
pub fn feedforward_linear(
	x: &Matrix,
	w: &Matrix,
	b: &Matrix,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	ensure!(
		w.nr() == x.nr(),
		Error::ShapeMismatch {
			arg: "w",
			expected: (x.nr(), w.nc()),
			actual: w.shape(),
		}
	);
	check_bias("b", b, w.nc())?;

	let mut out = Matrix::remake(out, w.nc(), x.nc())?;
	for j in 0..x.nc() {
		affine_column(w, b, x.col(j), out.col_mut(j));
	}
	Ok(out)
}

/// Batched [`feedforward_linear`].
pub fn feedforward_linear_vec(
	xs: &MatrixBatch,
	w: &Matrix,
	b: &Matrix,
) -> Result<MatrixBatch, Error> {
	xs.par_map(|x| feedforward_linear(x, w, b, None))
}

/// `Y = tanh(Wᵀ X + b)`.
pub fn feedforward_tanh(
	x: &Matrix,
	w: &Matrix,
	b: &Matrix,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	let mut out = feedforward_linear(x, w, b, out)?;
	activation::tanh_activation_inplace(&mut out);
	Ok(out)
}

/// `Y = exp(Wᵀ X + b)`.
pub fn feedforward_exp(
	x: &Matrix,
	w: &Matrix,
	b: &Matrix,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	let mut out = feedforward_linear(x, w, b, out)?;
	activation::exp_activation_inplace(&mut out);
	Ok(out)
}

/// `Y = tanh(W_fᵀ X_f + W_bᵀ X_b + b)`, joining the outputs of a forward and a backward layer.
pub fn feedforward2_tanh(
	xf: &Matrix,
	xb: &Matrix,
	wf: &Matrix,
	wb: &Matrix,
	b: &Matrix,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	ensure!(
		xf.nc() == xb.nc(),
		Error::ShapeMismatch {
			arg: "xb",
			expected: (wb.nr(), xf.nc()),
			actual: xb.shape(),
		}
	);
	ensure!(
		wb.shape() == (xb.nr(), wf.nc()),
		Error::ShapeMismatch {
			arg: "wb",
			expected: (xb.nr(), wf.nc()),
			actual: wb.shape(),
		}
	);
	let mut out = feedforward_linear(xf, wf, b, out)?;
	for j in 0..xb.nc() {
		crate::matrix::accumulate_transposed(wb, xb.col(j), out.col_mut(j));
	}
	activation::tanh_activation_inplace(&mut out);
	Ok(out)
}

/// `X + F(X)` into a new matrix.
pub fn residual(x: &Matrix, fx: &Matrix, out: Option<Matrix>) -> Result<Matrix, Error> {
	check_shape("fx", fx, x.shape())?;
	let mut out = Matrix::remake(out, x.nr(), x.nc())?;
	for (dst, a, b) in izip!(out.columns_mut(), x.columns(), fx.columns()) {
		for (d, &u, &v) in izip!(dst.iter_mut(), a, b) {
			*d = u + v;
		}
	}
	Ok(out)
}

/// `F(X) += X`.
pub fn residual_inplace(x: &Matrix, fx: &mut Matrix) -> Result<(), Error> {
	check_shape("fx", fx, x.shape())?;
	for (dst, src) in fx.columns_mut().zip(x.columns()) {
		for (d, &s) in dst.iter_mut().zip(src) {
			*d += s;
		}
	}
	Ok(())
}

/// Batched [`residual_inplace`].
pub fn residual_inplace_vec(xs: &MatrixBatch, fxs: &mut MatrixBatch) -> Result<(), Error> {
	fxs.par_zip_update(xs, residual_inplace)
}

/// Column-wise softmax of `Wᵀ X + b`.
pub fn softmax(x: &Matrix, w: &Matrix, b: &Matrix, out: Option<Matrix>) -> Result<Matrix, Error> {
	let mut out = feedforward_linear(x, w, b, out)?;
	for col in out.columns_mut() {
		softmax_inplace(col);
	}
	Ok(out)
}

/// Column-wise softmax of `temp_w · Wᵀ X + temp_b · b`.
pub fn softmax_with_temperature(
	x: &Matrix,
	w: &Matrix,
	b: &Matrix,
	temp_w: f32,
	temp_b: f32,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	ensure!(
		w.nr() == x.nr(),
		Error::ShapeMismatch {
			arg: "w",
			expected: (x.nr(), w.nc()),
			actual: w.shape(),
		}
	);
	check_bias("b", b, w.nc())?;

	let mut out = Matrix::remake(out, w.nc(), x.nc())?;
	for j in 0..x.nc() {
		let col = out.col_mut(j);
		crate::matrix::accumulate_transposed(w, x.col(j), col);
		for (value, &bias) in col.iter_mut().zip(b.col(0)) {
			*value = temp_w * *value + temp_b * bias;
		}
		softmax_inplace(col);
	}
	Ok(out)
}

fn softmax_inplace(col: &mut [f32]) {
	let max = col.iter().copied().fold(f32::NEG_INFINITY, f32::max);
	let mut total = 0.0;
	for value in col.iter_mut() {
		*value = (*value - max).exp();
		total += *value;
	}
	for value in col.iter_mut() {
		*value /= total;
	}
}
