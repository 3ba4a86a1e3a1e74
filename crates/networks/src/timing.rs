// Copyright 2025 Irreducible Inc.

use std::time::{Duration, Instant};

/// A stage of the inference pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
	Features,
	Convolution,
	Recurrent { layer: usize },
	GlobalNorm,
}

/// Receives the wall-clock duration of every completed pipeline stage.
pub trait StageObserver {
	fn stage_completed(&mut self, stage: Stage, elapsed: Duration);
}

impl StageObserver for () {
	fn stage_completed(&mut self, _stage: Stage, _elapsed: Duration) {}
}

/// Collects stage durations in completion order.
#[derive(Debug, Clone, Default)]
pub struct StageTimings {
	stages: Vec<(Stage, Duration)>,
}

impl StageTimings {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn stages(&self) -> &[(Stage, Duration)] {
		&self.stages
	}

	/// Sum of the durations recorded for `stage`.
	pub fn total(&self, stage: Stage) -> Duration {
		self.stages
			.iter()
			.filter(|(s, _)| *s == stage)
			.map(|(_, elapsed)| *elapsed)
			.sum()
	}
}

impl StageObserver for StageTimings {
	fn stage_completed(&mut self, stage: Stage, elapsed: Duration) {
		self.stages.push((stage, elapsed));
	}
}

/// Runs `f` as `stage`, reporting its duration to `observer` if it succeeds.
pub(crate) fn timed<T, E>(
	observer: &mut dyn StageObserver,
	stage: Stage,
	f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
	let started = Instant::now();
	let result = f()?;
	observer.stage_completed(stage, started.elapsed());
	Ok(result)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_timings_accumulate() {
		let mut timings = StageTimings::new();
		timings.stage_completed(Stage::Recurrent { layer: 0 }, Duration::from_millis(2));
		timings.stage_completed(Stage::GlobalNorm, Duration::from_millis(1));
		timings.stage_completed(Stage::Recurrent { layer: 0 }, Duration::from_millis(3));
		assert_eq!(timings.stages().len(), 3);
		assert_eq!(timings.total(Stage::Recurrent { layer: 0 }), Duration::from_millis(5));
		assert_eq!(timings.total(Stage::Convolution), Duration::ZERO);
	}

	#[test]
	fn test_timed_skips_failures() {
		let mut timings = StageTimings::new();
		let ok: Result<u32, ()> = timed(&mut timings, Stage::Features, || Ok(3));
		assert_eq!(ok, Ok(3));
		let err: Result<u32, ()> = timed(&mut timings, Stage::Convolution, || Err(()));
		assert!(err.is_err());
		assert_eq!(timings.stages().len(), 1);
		assert_eq!(timings.stages()[0].0, Stage::Features);
	}
}
