// Copyright 2025 Irreducible Inc.

use std::ops::{Index, IndexMut};

use getset::CopyGetters;
use squiggle_utils::{bail, ensure};

use super::error::Error;

/// Number of `f32` lanes each column is padded to.
pub const LANES: usize = 4;

/// Storage length of a column with `nr` logical rows.
pub const fn padded_rows(nr: usize) -> usize {
	nr.div_ceil(LANES) * LANES
}

/// A column-major matrix of `f32`.
///
/// Rows are features and columns are positions along the signal. Every column is padded up to
/// a multiple of [`LANES`] values; padding is kept at zero and never contributes to a result.
/// The logical content of column `j` is `col(j)`, which has exactly `nr` elements.
#[derive(Debug, Clone, PartialEq, CopyGetters)]
pub struct Matrix {
	/// Logical number of rows.
	#[getset(get_copy = "pub")]
	nr: usize,
	/// Number of columns.
	#[getset(get_copy = "pub")]
	nc: usize,
	/// Padded number of rows, the distance between consecutive columns in storage.
	#[getset(get_copy = "pub")]
	stride: usize,
	data: Vec<f32>,
}

impl Matrix {
	/// Creates a zero matrix, reporting allocation failure as an error.
	pub fn try_zeros(nr: usize, nc: usize) -> Result<Self, Error> {
		let stride = padded_rows(nr);
		let len = storage_len(stride, nr, nc)?;
		let mut data = Vec::new();
		data.try_reserve_exact(len)
			.map_err(|_| Error::Allocation { nr, nc })?;
		data.resize(len, 0.0);
		Ok(Self {
			nr,
			nc,
			stride,
			data,
		})
	}

	/// Creates a zero matrix.
	///
	/// ## Panics
	///
	/// If the storage cannot be allocated.
	pub fn zeros(nr: usize, nc: usize) -> Self {
		let stride = padded_rows(nr);
		Self {
			nr,
			nc,
			stride,
			data: vec![0.0; stride * nc],
		}
	}

	/// Builds a matrix from its logical elements listed column by column.
	pub fn from_columns(nr: usize, nc: usize, values: &[f32]) -> Result<Self, Error> {
		if values.len() != nr * nc {
			bail!(Error::IncorrectArgumentLength {
				arg: "values",
				expected: nr * nc,
			});
		}
		let mut out = Self::try_zeros(nr, nc)?;
		if nr > 0 {
			for (col, chunk) in out.columns_mut().zip(values.chunks_exact(nr)) {
				col.copy_from_slice(chunk);
			}
		}
		Ok(out)
	}

	/// Builds a matrix whose element `(row, col)` is `f(row, col)`.
	pub fn from_fn(nr: usize, nc: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
		let mut out = Self::zeros(nr, nc);
		for j in 0..nc {
			for (i, value) in out.col_mut(j).iter_mut().enumerate() {
				*value = f(i, j);
			}
		}
		out
	}

	/// A single-column matrix, the shape biases are stored in.
	pub fn column_vector(values: &[f32]) -> Self {
		let mut out = Self::zeros(values.len(), 1);
		out.col_mut(0).copy_from_slice(values);
		out
	}

	/// Returns `out` reshaped to `nr x nc` and zeroed, or a fresh matrix if `out` is `None`.
	///
	/// Existing storage is reused whenever its capacity suffices.
	pub fn remake(out: Option<Self>, nr: usize, nc: usize) -> Result<Self, Error> {
		match out {
			Some(mut matrix) => {
				matrix.reshape_zeroed(nr, nc)?;
				Ok(matrix)
			}
			None => Self::try_zeros(nr, nc),
		}
	}

	fn reshape_zeroed(&mut self, nr: usize, nc: usize) -> Result<(), Error> {
		let stride = padded_rows(nr);
		let len = storage_len(stride, nr, nc)?;
		self.data.clear();
		self.data
			.try_reserve_exact(len)
			.map_err(|_| Error::Allocation { nr, nc })?;
		self.data.resize(len, 0.0);
		self.nr = nr;
		self.nc = nc;
		self.stride = stride;
		Ok(())
	}

	pub fn shape(&self) -> (usize, usize) {
		(self.nr, self.nc)
	}

	pub fn is_empty(&self) -> bool {
		self.nr == 0 || self.nc == 0
	}

	/// Number of `f32` values the storage can hold without reallocating.
	pub fn capacity(&self) -> usize {
		self.data.capacity()
	}

	/// Logical elements of column `j`.
	pub fn col(&self, j: usize) -> &[f32] {
		assert!(j < self.nc, "column {j} out of range for {} columns", self.nc);
		let offset = j * self.stride;
		&self.data[offset..offset + self.nr]
	}

	/// Mutable logical elements of column `j`.
	pub fn col_mut(&mut self, j: usize) -> &mut [f32] {
		assert!(j < self.nc, "column {j} out of range for {} columns", self.nc);
		let offset = j * self.stride;
		&mut self.data[offset..offset + self.nr]
	}

	pub fn columns(&self) -> impl DoubleEndedIterator<Item = &[f32]> + ExactSizeIterator + '_ {
		(0..self.nc).map(move |j| self.col(j))
	}

	/// Mutable logical columns. Yields nothing for a matrix with zero rows.
	pub fn columns_mut(&mut self) -> impl Iterator<Item = &mut [f32]> + '_ {
		let nr = self.nr;
		self.data
			.chunks_exact_mut(self.stride.max(1))
			.map(move |chunk| &mut chunk[..nr])
	}

	/// Logical elements in column-major order.
	pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
		self.columns().flat_map(|col| col.iter().copied())
	}

	/// Applies `f` to every logical element. Padding is left untouched.
	pub fn map_inplace(&mut self, f: impl Fn(f32) -> f32) {
		for col in self.columns_mut() {
			for value in col {
				*value = f(*value);
			}
		}
	}

	/// Copy with the column order reversed.
	pub fn reverse_columns(&self) -> Self {
		let mut out = Self::zeros(self.nr, self.nc);
		for (j, col) in self.columns().rev().enumerate() {
			out.col_mut(j).copy_from_slice(col);
		}
		out
	}

	/// Largest absolute elementwise difference between two matrices of the same shape.
	pub fn max_abs_diff(&self, other: &Self) -> Result<f32, Error> {
		check_shape("other", other, self.shape())?;
		Ok(self
			.values()
			.zip(other.values())
			.map(|(a, b)| (a - b).abs())
			.fold(0.0, f32::max))
	}

	/// Sum of the logical elements of column `j`.
	pub fn column_sum(&self, j: usize) -> f32 {
		self.col(j).iter().sum()
	}

	/// Storage including padding, for tests asserting padding stays zero.
	#[cfg(test)]
	pub(crate) fn raw(&self) -> &[f32] {
		&self.data
	}
}

impl Index<(usize, usize)> for Matrix {
	type Output = f32;

	fn index(&self, (i, j): (usize, usize)) -> &f32 {
		&self.col(j)[i]
	}
}

impl IndexMut<(usize, usize)> for Matrix {
	fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f32 {
		&mut self.col_mut(j)[i]
	}
}

fn storage_len(stride: usize, nr: usize, nc: usize) -> Result<usize, Error> {
	stride
		.checked_mul(nc)
		.ok_or(Error::Allocation { nr, nc })
}

pub(crate) fn check_shape(
	arg: &'static str,
	matrix: &Matrix,
	expected: (usize, usize),
) -> Result<(), Error> {
	ensure!(
		matrix.shape() == expected,
		Error::ShapeMismatch {
			arg,
			expected,
			actual: matrix.shape(),
		}
	);
	Ok(())
}

/// Dot product of two equally long slices.
///
/// Accumulates in [`LANES`] independent partial sums over whole chunks before adding the
/// remainder, so every kernel that goes through this function rounds identically.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
	debug_assert_eq!(a.len(), b.len());
	let a_chunks = a.chunks_exact(LANES);
	let b_chunks = b.chunks_exact(LANES);
	let tail = a_chunks
		.remainder()
		.iter()
		.zip(b_chunks.remainder())
		.map(|(x, y)| x * y)
		.sum::<f32>();

	let mut acc = [0.0f32; LANES];
	for (x, y) in a_chunks.zip(b_chunks) {
		for lane in 0..LANES {
			acc[lane] += x[lane] * y[lane];
		}
	}
	(acc[0] + acc[1]) + (acc[2] + acc[3]) + tail
}

/// `y[o] += W.col(o) · x` for every output `o`.
#[inline]
pub fn accumulate_transposed(w: &Matrix, x: &[f32], y: &mut [f32]) {
	debug_assert_eq!(w.nr(), x.len());
	debug_assert_eq!(w.nc(), y.len());
	for (o, out) in y.iter_mut().enumerate() {
		*out += dot(w.col(o), x);
	}
}

/// `y = Wᵀ x + b` for a single column.
///
/// `W` is `x.len() x y.len()` and `b` is a `y.len() x 1` column vector.
#[inline]
pub fn affine_column(w: &Matrix, b: &Matrix, x: &[f32], y: &mut [f32]) {
	debug_assert_eq!(w.nr(), x.len());
	debug_assert_eq!(w.nc(), y.len());
	y.copy_from_slice(b.col(0));
	accumulate_transposed(w, x, y);
}
