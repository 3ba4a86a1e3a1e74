// Copyright 2025 Irreducible Inc.

use squiggle_layers::Matrix;
use squiggle_utils::rayon::adjust_thread_pool;
use tracing::{instrument, warn};

use crate::{
	error::Error,
	model::Model,
	network::TransitionOptions,
	signal::RawSignal,
};

/// Transition probabilities of `model` for one signal window.
///
/// Returns `None` if the window is empty or shorter than the model's convolution window.
pub fn compute_transitions(
	signal: &RawSignal<'_>,
	temperature: f32,
	model: Model,
) -> Result<Option<Matrix>, Error> {
	(model.transition_fn())(signal, temperature)
}

/// Transition probabilities of `model` for many signal windows.
///
/// `slots[i]` receives the result for `signals[i]`.
#[instrument(skip_all, level = "debug", fields(model = %model))]
pub fn compute_transitions_batch(
	signals: &[RawSignal<'_>],
	temperature: f32,
	model: Model,
	slots: &mut [Option<Matrix>],
) -> Result<(), Error> {
	if let Err(err) = adjust_thread_pool() {
		warn!("failed to configure the thread pool: {err}");
	}
	let options = TransitionOptions {
		temperature,
		..Default::default()
	};
	model
		.network()?
		.transitions_batch(signals, options, slots, &mut ())
}
