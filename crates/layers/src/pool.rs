// Copyright 2025 Irreducible Inc.

use std::{
	ops::{Deref, DerefMut},
	sync::{
		atomic::{AtomicUsize, Ordering},
		Mutex, PoisonError,
	},
};

use super::matrix::Matrix;

/// Scratch pool for the intermediate matrices of one inference invocation.
///
/// Matrices handed to [`MatrixPool::keep`] are tracked as live until their guard is dropped,
/// at which point their storage goes back to the pool and can be handed out again by
/// [`MatrixPool::spare`] as the `out` argument of the next kernel. Every tracked matrix is
/// returned on every exit path, early returns and errors included, because the guards release
/// on drop.
///
/// The pool hands out storage through `&self`, so several guards can be alive at once.
#[derive(Debug, Default)]
pub struct MatrixPool {
	spare: Mutex<Vec<Matrix>>,
	live: AtomicUsize,
}

impl MatrixPool {
	pub fn new() -> Self {
		Self::default()
	}

	/// Takes a previously released matrix to reuse as kernel output, if there is one.
	pub fn spare(&self) -> Option<Matrix> {
		self.spare.lock().unwrap_or_else(PoisonError::into_inner).pop()
	}

	/// Tracks `matrix` until the returned guard is dropped.
	pub fn keep(&self, matrix: Matrix) -> Pooled<'_> {
		self.live.fetch_add(1, Ordering::Relaxed);
		Pooled {
			pool: self,
			matrix: Some(matrix),
		}
	}

	/// Returns an untracked matrix to the pool. `None` is accepted and ignored.
	pub fn release(&self, matrix: Option<Matrix>) {
		if let Some(matrix) = matrix {
			self.spare
				.lock()
				.unwrap_or_else(PoisonError::into_inner)
				.push(matrix);
		}
	}

	/// Number of tracked matrices whose guards are still alive.
	pub fn live(&self) -> usize {
		self.live.load(Ordering::Relaxed)
	}

	/// Number of released matrices waiting to be reused.
	pub fn idle(&self) -> usize {
		self.spare.lock().unwrap_or_else(PoisonError::into_inner).len()
	}
}

/// A matrix tracked by a [`MatrixPool`].
#[derive(Debug)]
pub struct Pooled<'a> {
	pool: &'a MatrixPool,
	matrix: Option<Matrix>,
}

impl Pooled<'_> {
	/// Stops tracking the matrix and hands it to the caller.
	pub fn into_inner(mut self) -> Matrix {
		self.pool.live.fetch_sub(1, Ordering::Relaxed);
		self.matrix
			.take()
			.expect("matrix is present until the guard is consumed")
	}
}

impl Deref for Pooled<'_> {
	type Target = Matrix;

	fn deref(&self) -> &Matrix {
		self.matrix
			.as_ref()
			.expect("matrix is present until the guard is consumed")
	}
}

impl DerefMut for Pooled<'_> {
	fn deref_mut(&mut self) -> &mut Matrix {
		self.matrix
			.as_mut()
			.expect("matrix is present until the guard is consumed")
	}
}

impl Drop for Pooled<'_> {
	fn drop(&mut self) {
		if let Some(matrix) = self.matrix.take() {
			self.pool.live.fetch_sub(1, Ordering::Relaxed);
			self.pool.release(Some(matrix));
		}
	}
}
