// Copyright 2025 Irreducible Inc.

use std::ops::Index;

use rayon::prelude::*;
use squiggle_utils::ensure;

use super::{error::Error, matrix::Matrix};

/// A batch of matrices that all have the same shape.
///
/// Batched kernels process the members in parallel and produce, for every member, exactly the
/// matrix the corresponding single-matrix kernel would produce.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixBatch {
	matrices: Vec<Matrix>,
	shape: (usize, usize),
}

impl MatrixBatch {
	/// Create a batch, checking that every member has the shape of the first one.
	pub fn new(matrices: Vec<Matrix>) -> Result<Self, Error> {
		let shape = matrices.first().map_or((0, 0), Matrix::shape);
		for (index, matrix) in matrices.iter().enumerate() {
			ensure!(
				matrix.shape() == shape,
				Error::BatchShapeMismatch {
					index,
					expected: shape,
					actual: matrix.shape(),
				}
			);
		}
		Ok(Self { matrices, shape })
	}

	/// Shape shared by every member, `(0, 0)` for an empty batch.
	#[inline(always)]
	pub const fn shape(&self) -> (usize, usize) {
		self.shape
	}

	#[inline(always)]
	pub fn len(&self) -> usize {
		self.matrices.len()
	}

	#[inline(always)]
	pub fn is_empty(&self) -> bool {
		self.matrices.is_empty()
	}

	#[inline]
	pub fn iter(&self) -> std::slice::Iter<'_, Matrix> {
		self.matrices.iter()
	}

	#[inline(always)]
	pub fn as_slice(&self) -> &[Matrix] {
		&self.matrices
	}

	pub fn into_inner(self) -> Vec<Matrix> {
		self.matrices
	}

	/// Maps every member through `f` in parallel, collecting the results into a new batch.
	pub fn par_map<F>(&self, f: F) -> Result<Self, Error>
	where
		F: Fn(&Matrix) -> Result<Matrix, Error> + Sync + Send,
	{
		let matrices = self
			.matrices
			.par_iter()
			.map(f)
			.collect::<Result<Vec<_>, _>>()?;
		Self::new(matrices)
	}

	/// Maps corresponding members of two equally long batches through `f` in parallel.
	pub fn par_zip_map<F>(&self, other: &Self, f: F) -> Result<Self, Error>
	where
		F: Fn(&Matrix, &Matrix) -> Result<Matrix, Error> + Sync + Send,
	{
		self.check_same_len(other)?;
		let matrices = self
			.matrices
			.par_iter()
			.zip(other.matrices.par_iter())
			.map(|(a, b)| f(a, b))
			.collect::<Result<Vec<_>, _>>()?;
		Self::new(matrices)
	}

	/// Applies `f` to every logical element of every member.
	pub fn map_values_inplace<F>(&mut self, f: F)
	where
		F: Fn(f32) -> f32 + Sync + Send,
	{
		self.matrices
			.par_iter_mut()
			.for_each(|matrix| matrix.map_inplace(&f));
	}

	/// Updates every member in place together with the corresponding member of `other`.
	///
	/// `f` receives a mutable reference to a single member; it must not change its shape.
	pub(crate) fn par_zip_update<F>(&mut self, other: &Self, f: F) -> Result<(), Error>
	where
		F: Fn(&Matrix, &mut Matrix) -> Result<(), Error> + Sync + Send,
	{
		self.check_same_len(other)?;
		self.matrices
			.par_iter_mut()
			.zip(other.matrices.par_iter())
			.try_for_each(|(target, source)| f(source, target))?;
		debug_assert!(self.matrices.iter().all(|m| m.shape() == self.shape));
		Ok(())
	}

	fn check_same_len(&self, other: &Self) -> Result<(), Error> {
		ensure!(
			self.len() == other.len(),
			Error::BatchLengthMismatch {
				expected: self.len(),
				actual: other.len(),
			}
		);
		Ok(())
	}
}

impl Index<usize> for MatrixBatch {
	type Output = Matrix;

	fn index(&self, index: usize) -> &Matrix {
		&self.matrices[index]
	}
}

impl IntoIterator for MatrixBatch {
	type Item = Matrix;
	type IntoIter = std::vec::IntoIter<Matrix>;

	fn into_iter(self) -> Self::IntoIter {
		self.matrices.into_iter()
	}
}

impl<'a> IntoIterator for &'a MatrixBatch {
	type Item = &'a Matrix;
	type IntoIter = std::slice::Iter<'a, Matrix>;

	fn into_iter(self) -> Self::IntoIter {
		self.matrices.iter()
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[test]
	fn test_new_checks_shapes() {
		let batch = MatrixBatch::new(vec![Matrix::zeros(3, 4), Matrix::zeros(3, 4)]).unwrap();
		assert_eq!(batch.shape(), (3, 4));
		assert_eq!(batch.len(), 2);

		assert_matches!(
			MatrixBatch::new(vec![Matrix::zeros(3, 4), Matrix::zeros(3, 5)]),
			Err(Error::BatchShapeMismatch {
				index: 1,
				expected: (3, 4),
				actual: (3, 5)
			})
		);

		let empty = MatrixBatch::new(vec![]).unwrap();
		assert!(empty.is_empty());
		assert_eq!(empty.shape(), (0, 0));
	}

	#[test]
	fn test_par_map_preserves_order() {
		let batch = MatrixBatch::new(
			(0..8)
				.map(|k| Matrix::from_fn(2, 3, |i, j| (k * 100 + i * 10 + j) as f32))
				.collect(),
		)
		.unwrap();
		let doubled = batch
			.par_map(|m| {
				let mut out = m.clone();
				out.map_inplace(|x| 2.0 * x);
				Ok(out)
			})
			.unwrap();
		for (k, m) in doubled.iter().enumerate() {
			assert_eq!(m[(1, 2)], 2.0 * (k * 100 + 12) as f32);
		}
	}

	#[test]
	fn test_zip_length_mismatch() {
		let a = MatrixBatch::new(vec![Matrix::zeros(1, 1); 2]).unwrap();
		let b = MatrixBatch::new(vec![Matrix::zeros(1, 1); 3]).unwrap();
		assert_matches!(
			a.par_zip_map(&b, |x, _| Ok(x.clone())),
			Err(Error::BatchLengthMismatch { .. })
		);
	}
}
