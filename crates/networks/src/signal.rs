// Copyright 2025 Irreducible Inc.

use squiggle_layers::{Matrix, MatrixBatch};
use squiggle_utils::ensure;

use crate::error::Error;

/// A window `[start, end)` over raw instrument samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSignal<'a> {
	samples: &'a [f32],
	start: usize,
	end: usize,
}

impl<'a> RawSignal<'a> {
	pub fn new(samples: &'a [f32], start: usize, end: usize) -> Result<Self, Error> {
		ensure!(
			start <= end && end <= samples.len(),
			Error::InvalidWindow {
				start,
				end,
				len: samples.len(),
			}
		);
		Ok(Self {
			samples,
			start,
			end,
		})
	}

	/// Window covering every sample.
	pub fn whole(samples: &'a [f32]) -> Self {
		Self {
			samples,
			start: 0,
			end: samples.len(),
		}
	}

	pub fn start(&self) -> usize {
		self.start
	}

	pub fn end(&self) -> usize {
		self.end
	}

	pub fn len(&self) -> usize {
		self.end - self.start
	}

	pub fn is_empty(&self) -> bool {
		self.start == self.end
	}

	/// Samples inside the window.
	pub fn window(&self) -> &'a [f32] {
		&self.samples[self.start..self.end]
	}
}

/// One-row feature matrix holding the samples of the window, or `None` for an empty window.
pub fn features_from_raw(signal: &RawSignal<'_>) -> Result<Option<Matrix>, Error> {
	if signal.is_empty() {
		return Ok(None);
	}
	Ok(Some(Matrix::from_columns(1, signal.len(), signal.window())?))
}

/// Feature matrices for equally long windows, or `None` if there are no samples at all.
pub fn features_from_raw_vec(signals: &[RawSignal<'_>]) -> Result<Option<MatrixBatch>, Error> {
	if signals.iter().all(RawSignal::is_empty) {
		return Ok(None);
	}
	let matrices = signals
		.iter()
		.map(|signal| Matrix::from_columns(1, signal.len(), signal.window()))
		.collect::<Result<Vec<_>, _>>()?;
	Ok(Some(MatrixBatch::new(matrices)?))
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[test]
	fn test_window_validation() {
		let samples = [1.0, 2.0, 3.0, 4.0];
		assert_eq!(RawSignal::new(&samples, 1, 3).unwrap().window(), &[2.0, 3.0]);
		assert!(RawSignal::new(&samples, 2, 2).unwrap().is_empty());
		assert_matches!(RawSignal::new(&samples, 3, 2), Err(Error::InvalidWindow { .. }));
		assert_matches!(
			RawSignal::new(&samples, 0, 5),
			Err(Error::InvalidWindow {
				start: 0,
				end: 5,
				len: 4
			})
		);
	}

	#[test]
	fn test_features_from_raw() {
		let samples = [0.5, -1.0, 2.0, 7.0, 9.0];
		let signal = RawSignal::new(&samples, 1, 4).unwrap();
		let features = features_from_raw(&signal).unwrap().unwrap();
		assert_eq!(features.shape(), (1, 3));
		assert_eq!(features.values().collect::<Vec<_>>(), vec![-1.0, 2.0, 7.0]);
		assert_eq!(features.stride(), 4);

		let empty = RawSignal::new(&samples, 2, 2).unwrap();
		assert!(features_from_raw(&empty).unwrap().is_none());
	}

	#[test]
	fn test_features_from_raw_vec() {
		let samples = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
		let signals = [
			RawSignal::new(&samples, 0, 3).unwrap(),
			RawSignal::new(&samples, 3, 6).unwrap(),
		];
		let batch = features_from_raw_vec(&signals).unwrap().unwrap();
		assert_eq!(batch.shape(), (1, 3));
		assert_eq!(batch[1][(0, 0)], 4.0);

		let ragged = [
			RawSignal::new(&samples, 0, 3).unwrap(),
			RawSignal::new(&samples, 0, 4).unwrap(),
		];
		assert_matches!(
			features_from_raw_vec(&ragged),
			Err(Error::Layer(squiggle_layers::Error::BatchShapeMismatch { index: 1, .. }))
		);
		assert!(features_from_raw_vec(&[]).unwrap().is_none());
	}
}
