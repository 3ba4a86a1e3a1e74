// Copyright 2025 Irreducible Inc.

use squiggle_layers::{Matrix, OutputSpace};
use squiggle_utils::{
	ensure,
	env::{boolean_env_flag_set, parsed_env_var},
};
use tracing::debug;

use crate::{
	error::Error,
	model::Model,
	network::TransitionOptions,
	signal::RawSignal,
	timing::StageObserver,
};

pub const MODEL_ENV: &str = "SQUIGGLE_MODEL";
pub const TEMPERATURE_ENV: &str = "SQUIGGLE_TEMPERATURE";
pub const LOG_SPACE_ENV: &str = "SQUIGGLE_LOG_SPACE";

/// Inference settings of a caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceConfig {
	pub model: Model,
	pub temperature: f32,
	pub output_space: OutputSpace,
}

impl Default for InferenceConfig {
	fn default() -> Self {
		Self {
			model: Model::R941Native,
			temperature: 1.0,
			output_space: OutputSpace::Probability,
		}
	}
}

impl InferenceConfig {
	/// Defaults overridden by `SQUIGGLE_MODEL`, `SQUIGGLE_TEMPERATURE` and the
	/// `SQUIGGLE_LOG_SPACE` flag.
	pub fn from_env() -> Result<Self, Error> {
		let mut config = Self::default();
		if let Some(model) = parsed_env_var::<String>(MODEL_ENV) {
			let name = model.map_err(|value| Error::InvalidEnvVar {
				var: MODEL_ENV,
				value,
			})?;
			config.model = name.parse()?;
		}
		if let Some(temperature) = parsed_env_var::<f32>(TEMPERATURE_ENV) {
			config.temperature = temperature.map_err(|value| Error::InvalidEnvVar {
				var: TEMPERATURE_ENV,
				value,
			})?;
		}
		if boolean_env_flag_set(LOG_SPACE_ENV) {
			config.output_space = OutputSpace::Log;
		}
		config.validate()?;
		debug!(?config, "inference configuration");
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), Error> {
		ensure!(
			self.temperature.is_finite() && self.temperature > 0.0,
			Error::Layer(squiggle_layers::Error::InvalidTemperature(self.temperature))
		);
		Ok(())
	}

	pub fn transition_options(&self) -> TransitionOptions {
		TransitionOptions {
			temperature: self.temperature,
			space: self.output_space,
		}
	}

	/// Transitions for one window with these settings.
	pub fn compute(
		&self,
		signal: &RawSignal<'_>,
		observer: &mut dyn StageObserver,
	) -> Result<Option<Matrix>, Error> {
		self.model
			.network()?
			.transitions(signal, self.transition_options(), observer)
	}

	/// Transitions for many windows with these settings, written to `slots` in input order.
	pub fn compute_batch(
		&self,
		signals: &[RawSignal<'_>],
		slots: &mut [Option<Matrix>],
		observer: &mut dyn StageObserver,
	) -> Result<(), Error> {
		self.model
			.network()?
			.transitions_batch(signals, self.transition_options(), slots, observer)
	}
}
