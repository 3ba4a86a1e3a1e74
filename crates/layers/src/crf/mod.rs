// Copyright 2025 Irreducible Inc.

//! Global normalisation of transition scores with a linear-chain CRF.
//!
//! The output layer maps every position to a column of parameters. The leading
//! [`Encoding::transition_rows`] rows score transitions, `5·tanh(Wᵀx + b) / temperature`; any
//! remaining rows are run-length distribution parameters passed through a softplus. The
//! transition rows are then replaced by the posterior probability, under the CRF defined by
//! the encoding's [`Topology`], of taking a transition scored by that row at that position.
//! A row that scores several transitions, like the shared stay row of run-length v1, reports
//! the average over those transitions, renormalised. The transition rows of every output
//! column therefore sum to one.

mod encoding;
mod topology;

pub use encoding::*;
pub use topology::*;

use rayon::prelude::*;
use squiggle_utils::ensure;
use tracing::instrument;

use crate::{
	activation::softplus,
	batch::MatrixBatch,
	error::Error,
	linear::feedforward_linear,
	matrix::Matrix,
};

/// Bound on the magnitude of transition scores before temperature scaling.
pub const SCORE_SCALE: f32 = 5.0;

/// Whether normalised transitions are reported as probabilities or their logarithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputSpace {
	#[default]
	Probability,
	Log,
}

fn check_temperature(temperature: f32) -> Result<(), Error> {
	ensure!(
		temperature.is_finite() && temperature > 0.0,
		Error::InvalidTemperature(temperature)
	);
	Ok(())
}

/// Globally normalised transitions for `encoding`.
///
/// `x` is the output of the last hidden layer, `w` and `b` the output layer whose width fixes
/// the alphabet size through [`Encoding::nbase`].
#[instrument(skip_all, level = "debug", fields(encoding = %encoding))]
pub fn globalnorm(
	x: &Matrix,
	w: &Matrix,
	b: &Matrix,
	temperature: f32,
	encoding: Encoding,
	space: OutputSpace,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	check_temperature(temperature)?;
	let nbase = encoding.nbase(w.nc())?;
	let ntrans = encoding.transition_rows(nbase);

	let mut scores = feedforward_linear(x, w, b, out)?;
	let scale = SCORE_SCALE / temperature;
	for col in scores.columns_mut() {
		let (transitions, extra) = col.split_at_mut(ntrans);
		for value in transitions {
			*value = scale * value.tanh();
		}
		for value in extra {
			*value = softplus(*value);
		}
	}

	let topology = encoding.topology(nbase);
	let lattice = topology.lattice(&scores);
	let mut mass = vec![0.0; ntrans];
	for t in 0..scores.nc() {
		let col = scores.col_mut(t);
		topology.row_marginals(&lattice, col, t, &mut mass);
		for (value, &m) in col.iter_mut().zip(&mass) {
			*value = match space {
				OutputSpace::Probability => m as f32,
				OutputSpace::Log => m.ln() as f32,
			};
		}
	}
	Ok(scores)
}

/// Batched [`globalnorm`].
pub fn globalnorm_vec(
	xs: &MatrixBatch,
	w: &Matrix,
	b: &Matrix,
	temperature: f32,
	encoding: Encoding,
	space: OutputSpace,
) -> Result<MatrixBatch, Error> {
	xs.par_map(|x| globalnorm(x, w, b, temperature, encoding, space, None))
}

pub fn globalnorm_flipflop(
	x: &Matrix,
	w: &Matrix,
	b: &Matrix,
	temperature: f32,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	globalnorm(x, w, b, temperature, Encoding::FlipFlop, OutputSpace::Probability, out)
}

pub fn globalnorm_manystay(
	x: &Matrix,
	w: &Matrix,
	b: &Matrix,
	temperature: f32,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	globalnorm(x, w, b, temperature, Encoding::ManyStay, OutputSpace::Probability, out)
}

pub fn globalnorm_runlength(
	x: &Matrix,
	w: &Matrix,
	b: &Matrix,
	temperature: f32,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	globalnorm(x, w, b, temperature, Encoding::RunLength, OutputSpace::Probability, out)
}

pub fn globalnorm_runlength_v2(
	x: &Matrix,
	w: &Matrix,
	b: &Matrix,
	temperature: f32,
	out: Option<Matrix>,
) -> Result<Matrix, Error> {
	globalnorm(x, w, b, temperature, Encoding::CrfRunLength, OutputSpace::Probability, out)
}

/// Log-partition function of raw transition scores under `encoding`.
///
/// `scores` holds one column of `encoding.nparam(N)` scores per position; only the transition
/// rows take part.
pub fn log_partition(encoding: Encoding, scores: &Matrix) -> Result<f64, Error> {
	let nbase = encoding.nbase(scores.nr())?;
	Ok(encoding.topology(nbase).log_partition(scores))
}

/// Log-partition function of many-stay transition scores.
pub fn crf_manystay_partition_function(scores: &Matrix) -> Result<f64, Error> {
	log_partition(Encoding::ManyStay, scores)
}

/// Log-partition functions of a batch of score matrices.
pub fn log_partition_vec(encoding: Encoding, scores: &MatrixBatch) -> Result<Vec<f64>, Error> {
	scores
		.as_slice()
		.par_iter()
		.map(|s| log_partition(encoding, s))
		.collect()
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use proptest::prelude::*;
	use rand::{rngs::StdRng, Rng, SeedableRng};

	use super::*;

	const ALL: [Encoding; 4] = [
		Encoding::FlipFlop,
		Encoding::ManyStay,
		Encoding::RunLength,
		Encoding::CrfRunLength,
	];

	struct OutputLayer {
		x: Matrix,
		w: Matrix,
		b: Matrix,
	}

	fn output_layer(rng: &mut StdRng, encoding: Encoding, nbase: usize, nc: usize) -> OutputLayer {
		let nin = 6;
		let nparam = encoding.nparam(nbase);
		OutputLayer {
			x: Matrix::from_fn(nin, nc, |_, _| rng.gen_range(-1.0..1.0)),
			w: Matrix::from_fn(nin, nparam, |_, _| rng.gen_range(-1.0..1.0)),
			b: Matrix::from_fn(nparam, 1, |_, _| rng.gen_range(-0.5..0.5)),
		}
	}

	#[test]
	fn test_invalid_temperature() {
		let mut rng = StdRng::seed_from_u64(50);
		let layer = output_layer(&mut rng, Encoding::FlipFlop, 4, 3);
		for temperature in [0.0, -1.0, f32::NAN, f32::INFINITY] {
			assert_matches!(
				globalnorm_flipflop(&layer.x, &layer.w, &layer.b, temperature, None),
				Err(Error::InvalidTemperature(_))
			);
		}
	}

	#[test]
	fn test_invalid_output_width() {
		let mut rng = StdRng::seed_from_u64(51);
		let layer = output_layer(&mut rng, Encoding::ManyStay, 4, 3);
		assert_matches!(
			globalnorm_flipflop(&layer.x, &layer.w, &layer.b, 1.0, None),
			Err(Error::InvalidParameterCount {
				encoding: Encoding::FlipFlop,
				nparam: 20
			})
		);
	}

	#[test]
	fn test_runlength_extra_rows_are_softplus() {
		let mut rng = StdRng::seed_from_u64(52);
		let layer = output_layer(&mut rng, Encoding::RunLength, 4, 5);
		let out = globalnorm_runlength(&layer.x, &layer.w, &layer.b, 1.0, None).unwrap();
		let raw = feedforward_linear(&layer.x, &layer.w, &layer.b, None).unwrap();
		for t in 0..5 {
			for row in 5..13 {
				assert!((out[(row, t)] - softplus(raw[(row, t)])).abs() < 1e-6);
				assert!(out[(row, t)] > 0.0);
			}
		}
	}

	#[test]
	fn test_log_space_matches_probability_space() {
		let mut rng = StdRng::seed_from_u64(53);
		let layer = output_layer(&mut rng, Encoding::FlipFlop, 4, 7);
		let prob = globalnorm(&layer.x, &layer.w, &layer.b, 1.0, Encoding::FlipFlop, OutputSpace::Probability, None)
			.unwrap();
		let log = globalnorm(&layer.x, &layer.w, &layer.b, 1.0, Encoding::FlipFlop, OutputSpace::Log, None).unwrap();
		for (p, l) in prob.values().zip(log.values()) {
			assert!((p.ln() - l).abs() < 1e-4);
		}
	}

	#[test]
	fn test_single_position_is_a_softmax_over_transitions() {
		// With one column every path is a single transition from an unconstrained start.
		let mut rng = StdRng::seed_from_u64(54);
		let layer = output_layer(&mut rng, Encoding::ManyStay, 2, 1);
		let out = globalnorm_manystay(&layer.x, &layer.w, &layer.b, 1.0, None).unwrap();
		let raw = feedforward_linear(&layer.x, &layer.w, &layer.b, None).unwrap();
		let weights = raw.col(0).iter().map(|v| (SCORE_SCALE * v.tanh()).exp()).collect::<Vec<_>>();
		let total = weights.iter().sum::<f32>();
		for (p, w) in out.col(0).iter().zip(&weights) {
			assert!((p - w / total).abs() < 1e-5);
		}
	}

	#[test]
	fn test_partition_functions() {
		let mut rng = StdRng::seed_from_u64(55);
		let scores = Matrix::from_fn(20, 6, |_, _| rng.gen_range(-3.0..3.0));
		let direct = crf_manystay_partition_function(&scores).unwrap();
		assert_eq!(direct, Encoding::ManyStay.topology(4).log_partition(&scores));
		assert_matches!(
			crf_manystay_partition_function(&Matrix::zeros(21, 2)),
			Err(Error::InvalidParameterCount { .. })
		);

		let batch = MatrixBatch::new(vec![scores.clone(), scores.reverse_columns()]).unwrap();
		let batched = log_partition_vec(Encoding::ManyStay, &batch).unwrap();
		assert_eq!(batched[0], direct);
	}

	#[test]
	fn test_temperature_flattens_distribution() {
		let mut rng = StdRng::seed_from_u64(56);
		for encoding in ALL {
			let layer = output_layer(&mut rng, encoding, 4, 1);
			let ntrans = encoding.transition_rows(4);
			let peak = |temperature: f32| {
				let out = globalnorm(&layer.x, &layer.w, &layer.b, temperature, encoding, OutputSpace::Probability, None)
					.unwrap();
				out.col(0)[..ntrans].iter().copied().fold(0.0, f32::max)
			};
			let mut previous = f32::INFINITY;
			for temperature in [0.25, 0.5, 1.0, 2.0, 4.0, 8.0] {
				let current = peak(temperature);
				assert!(current <= previous + 1e-6, "{encoding} at {temperature}");
				previous = current;
			}
		}
	}

	#[test]
	fn test_runlength_stay_row_is_not_inflated() {
		// Stay scored slightly below every move: the stay row must not become more likely as
		// the distribution flattens.
		let x = Matrix::column_vector(&[1.0]);
		let w = Matrix::from_columns(1, 13, &[0.0, 0.05, 0.05, 0.05, 0.05, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])
			.unwrap();
		let b = Matrix::zeros(13, 1);
		let mut previous = f32::INFINITY;
		for temperature in [1.0, 2.0, 4.0, 8.0, 16.0] {
			let out = globalnorm_runlength(&x, &w, &b, temperature, None).unwrap();
			let col = &out.col(0)[..5];
			let peak = col.iter().copied().fold(0.0, f32::max);
			assert!(peak <= previous + 1e-6, "peak {peak} at {temperature}");
			assert!(col[0] < col[1]);
			previous = peak;
		}
	}

	#[test]
	fn test_batch_matches_single() {
		let mut rng = StdRng::seed_from_u64(57);
		let layer = output_layer(&mut rng, Encoding::CrfRunLength, 4, 9);
		let members = (0..3)
			.map(|_| Matrix::from_fn(6, 9, |_, _| rng.gen_range(-1.0..1.0)))
			.collect::<Vec<_>>();
		let batch = MatrixBatch::new(members.clone()).unwrap();
		let batched =
			globalnorm_vec(&batch, &layer.w, &layer.b, 1.5, Encoding::CrfRunLength, OutputSpace::Probability).unwrap();
		for (x, result) in members.iter().zip(&batched) {
			assert_eq!(&globalnorm_runlength_v2(x, &layer.w, &layer.b, 1.5, None).unwrap(), result);
		}
	}

	proptest! {
		#[test]
		fn test_columns_are_distributions(
			seed in any::<u64>(),
			nbase in 1usize..6,
			nc in 0usize..24,
			temperature in 0.05f32..10.0,
		) {
			let mut rng = StdRng::seed_from_u64(seed);
			for encoding in ALL {
				if nbase < encoding.min_nbase() {
					continue;
				}
				let layer = output_layer(&mut rng, encoding, nbase, nc);
				let out = globalnorm(&layer.x, &layer.w, &layer.b, temperature, encoding, OutputSpace::Probability, None)
					.unwrap();
				prop_assert_eq!(out.shape(), (encoding.nparam(nbase), nc));
				let ntrans = encoding.transition_rows(nbase);
				for t in 0..nc {
					let col = &out.col(t)[..ntrans];
					prop_assert!(col.iter().all(|&p| (0.0..=1.0 + 1e-6).contains(&p)));
					prop_assert!((col.iter().sum::<f32>() - 1.0).abs() < 1e-5);
				}
			}
		}
	}
}
