// Copyright 2025 Irreducible Inc.

use std::{fmt, str::FromStr};

use squiggle_layers::{Activation, Encoding, Matrix};

use crate::{
	error::Error,
	network::{Network, TransitionOptions},
	params::{Architecture, CellKind, ParameterSet, TableShape},
	signal::RawSignal,
	tables::compiled_parameters,
};

/// Computes transition probabilities for a signal window at a temperature.
pub type TransitionFn = fn(&RawSignal<'_>, f32) -> Result<Option<Matrix>, Error>;

/// A compiled-in model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
	R941Native,
	R941Native5mC,
	R10cPcr,
	RleR941Native,
	NewRleR941Native,
}

impl Model {
	pub const ALL: [Model; 5] = [
		Self::R941Native,
		Self::R941Native5mC,
		Self::R10cPcr,
		Self::RleR941Native,
		Self::NewRleR941Native,
	];

	pub const fn name(self) -> &'static str {
		match self {
			Self::R941Native => "r941_native",
			Self::R941Native5mC => "r941_5mC",
			Self::R10cPcr => "r10c_pcr",
			Self::RleR941Native => "rle_r941_native",
			Self::NewRleR941Native => "newrle_r941_native",
		}
	}

	pub const fn description(self) -> &'static str {
		match self {
			Self::R941Native => "R9.4.1 model for MinION.  Trained from native DNA library",
			Self::R941Native5mC => {
				"R9.4.1 model for PromethION; 5mC aware.  Trained from native NA12878 library"
			}
			Self::R10cPcr => "R10C model for MinION.  Trained from PCR'd DNA library",
			Self::RleR941Native => {
				"R9.4.1 run-length encoded model for MinION.  Trained from native DNA library"
			}
			Self::NewRleR941Native => {
				"R9.4.1 new run-length encoded model for MinION.  Trained from native DNA library"
			}
		}
	}

	/// Looks a model up by its name.
	pub fn from_name(name: &str) -> Option<Self> {
		Self::ALL.into_iter().find(|model| model.name() == name)
	}

	pub const fn architecture(self) -> Architecture {
		let (cell, encoding) = match self {
			Self::R941Native | Self::R941Native5mC | Self::R10cPcr => {
				(CellKind::GruMod, Encoding::FlipFlop)
			}
			Self::RleR941Native => (CellKind::GruMod, Encoding::RunLength),
			Self::NewRleR941Native => (CellKind::Lstm, Encoding::CrfRunLength),
		};
		Architecture {
			cell,
			conv_activation: Activation::Tanh,
			residual: false,
			encoding,
		}
	}

	/// Dimensions of the compiled-in parameter table.
	pub const fn table_shape(self) -> TableShape {
		let encoding = self.architecture().encoding;
		let (window, nbase) = match self {
			Self::R941Native | Self::R10cPcr => (19, 4),
			Self::R941Native5mC => (19, 5),
			Self::RleR941Native | Self::NewRleR941Native => (11, 4),
		};
		TableShape {
			window,
			stride: 2,
			filters: 96,
			size: 96,
			encoding,
			nbase,
		}
	}

	/// Seed the compiled-in parameter table is generated from.
	pub(crate) const fn seed(self) -> u64 {
		match self {
			Self::R941Native => 0x0941,
			Self::R941Native5mC => 0x5c41,
			Self::R10cPcr => 0x010c,
			Self::RleR941Native => 0x1e41,
			Self::NewRleR941Native => 0x2e41,
		}
	}

	pub fn parameters(self) -> &'static ParameterSet {
		compiled_parameters(self)
	}

	pub fn network(self) -> Result<Network<'static>, Error> {
		Network::new(self.architecture(), self.parameters())
	}

	pub const fn transition_fn(self) -> TransitionFn {
		match self {
			Self::R941Native => r941_native_transitions,
			Self::R941Native5mC => r941_5mc_transitions,
			Self::R10cPcr => r10c_pcr_transitions,
			Self::RleR941Native => rle_r941_native_transitions,
			Self::NewRleR941Native => newrle_r941_native_transitions,
		}
	}
}

impl fmt::Display for Model {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for Model {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self, Error> {
		Self::from_name(s).ok_or_else(|| Error::UnknownModel(s.to_string()))
	}
}

fn transitions_of(model: Model, signal: &RawSignal<'_>, temperature: f32) -> Result<Option<Matrix>, Error> {
	let options = TransitionOptions {
		temperature,
		..Default::default()
	};
	model.network()?.transitions(signal, options, &mut ())
}

fn r941_native_transitions(signal: &RawSignal<'_>, temperature: f32) -> Result<Option<Matrix>, Error> {
	transitions_of(Model::R941Native, signal, temperature)
}

fn r941_5mc_transitions(signal: &RawSignal<'_>, temperature: f32) -> Result<Option<Matrix>, Error> {
	transitions_of(Model::R941Native5mC, signal, temperature)
}

fn r10c_pcr_transitions(signal: &RawSignal<'_>, temperature: f32) -> Result<Option<Matrix>, Error> {
	transitions_of(Model::R10cPcr, signal, temperature)
}

fn rle_r941_native_transitions(signal: &RawSignal<'_>, temperature: f32) -> Result<Option<Matrix>, Error> {
	transitions_of(Model::RleR941Native, signal, temperature)
}

fn newrle_r941_native_transitions(
	signal: &RawSignal<'_>,
	temperature: f32,
) -> Result<Option<Matrix>, Error> {
	transitions_of(Model::NewRleR941Native, signal, temperature)
}
