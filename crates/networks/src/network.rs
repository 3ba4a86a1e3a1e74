// Copyright 2025 Irreducible Inc.

use std::collections::BTreeMap;

use getset::CopyGetters;
use squiggle_layers::{
	crf::{globalnorm, globalnorm_vec},
	linear::{convolution, convolution_vec, feedforward_linear, residual_inplace, residual_inplace_vec, window_count},
	recurrent::{self, Gru, GruMod, GruRelu, Lstm, RecurrentCell},
	Direction, Matrix, MatrixPool, OutputSpace, Pooled,
};
use squiggle_utils::{bail, ensure};
use tracing::{debug, instrument};

use crate::{
	error::Error,
	params::{Architecture, CellKind, LayerParams, ParameterSet, RECURRENT_LAYERS},
	signal::{features_from_raw, features_from_raw_vec, RawSignal},
	timing::{timed, Stage, StageObserver},
};

/// Sweep direction of each recurrent layer, input side first.
pub const LAYER_DIRECTIONS: [Direction; RECURRENT_LAYERS] = [
	Direction::Backward,
	Direction::Forward,
	Direction::Backward,
	Direction::Forward,
	Direction::Backward,
];

/// Per-call settings of the global normalisation stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionOptions {
	pub temperature: f32,
	pub space: OutputSpace,
}

impl Default for TransitionOptions {
	fn default() -> Self {
		Self {
			temperature: 1.0,
			space: OutputSpace::Probability,
		}
	}
}

/// A parameter set checked against an architecture, ready to compute transitions.
#[derive(Debug, Clone, Copy, CopyGetters)]
pub struct Network<'p> {
	#[getset(get_copy = "pub")]
	architecture: Architecture,
	#[getset(get_copy = "pub")]
	params: &'p ParameterSet,
	/// Alphabet size implied by the output layer.
	#[getset(get_copy = "pub")]
	nbase: usize,
}

fn check_param(name: impl FnOnce() -> String, matrix: &Matrix, expected: (usize, usize)) -> Result<(), Error> {
	ensure!(
		matrix.shape() == expected,
		Error::ParameterShape {
			name: name(),
			expected,
			actual: matrix.shape(),
		}
	);
	Ok(())
}

impl<'p> Network<'p> {
	/// Checks that `params` has the shape `architecture` needs.
	///
	/// ## Throws
	///
	/// * [`Error::CellParameterMismatch`] if the layers carry the wrong number of state matrices
	/// * [`Error::ParameterShape`] if consecutive stages do not fit together
	/// * [`Error::Layer`] if the output width is not valid for the encoding
	pub fn new(architecture: Architecture, params: &'p ParameterSet) -> Result<Self, Error> {
		let cell = architecture.cell;
		ensure!(
			params.state_matrices() == cell.state_matrices(),
			Error::CellParameterMismatch {
				cell,
				expected: cell.state_matrices(),
				actual: params.state_matrices(),
			}
		);

		let conv = params.conv();
		ensure!(
			conv.window() > 0 && conv.filters() > 0,
			Error::ParameterShape {
				name: "conv.w".into(),
				expected: (conv.window().max(1), conv.filters().max(1)),
				actual: conv.w.shape(),
			}
		);
		check_param(|| "conv.b".into(), &conv.b, (conv.filters(), 1))?;

		let mut nin = conv.filters();
		for (index, layer) in params.layers().enumerate() {
			let size = layer.sw().nr();
			let projection = layer.input();
			let gates = cell.input_gates() * size;
			check_param(|| format!("layers[{index}].input.w"), &projection.w, (nin, gates))?;
			check_param(|| format!("layers[{index}].input.b"), &projection.b, (gates, 1))?;
			check_param(|| format!("layers[{index}].sw"), layer.sw(), (size, cell.state_gates() * size))?;
			if let LayerParams::Paired(paired) = layer {
				check_param(|| format!("layers[{index}].sw2"), &paired.sw2, (size, size))?;
			}
			// A residual layer adds its input to its output.
			ensure!(
				!architecture.residual || size == nin,
				Error::ParameterShape {
					name: format!("layers[{index}].sw"),
					expected: (nin, cell.state_gates() * nin),
					actual: layer.sw().shape(),
				}
			);
			nin = size;
		}

		let output = params.output();
		check_param(|| "output.w".into(), &output.w, (nin, output.w.nc()))?;
		check_param(|| "output.b".into(), &output.b, (output.w.nc(), 1))?;
		let nbase = architecture.encoding.nbase(output.w.nc())?;

		Ok(Self {
			architecture,
			params,
			nbase,
		})
	}

	/// Number of output columns for a window of `samples` samples.
	pub fn output_columns(&self, samples: usize) -> usize {
		let conv = self.params.conv();
		window_count(samples, conv.window(), conv.stride)
	}

	/// Transitions for one signal window, with a scratch pool local to the call.
	///
	/// Returns `None` for an empty window or one shorter than the convolution window.
	pub fn transitions(
		&self,
		signal: &RawSignal<'_>,
		options: TransitionOptions,
		observer: &mut dyn StageObserver,
	) -> Result<Option<Matrix>, Error> {
		let pool = MatrixPool::new();
		self.transitions_with_pool(signal, options, &pool, observer)
	}

	/// As [`Self::transitions`], drawing intermediate matrices from `pool`.
	///
	/// Every intermediate matrix is back in the pool when this returns, on success and on error.
	#[instrument(skip_all, level = "debug", fields(samples = signal.len()))]
	pub fn transitions_with_pool(
		&self,
		signal: &RawSignal<'_>,
		options: TransitionOptions,
		pool: &MatrixPool,
		observer: &mut dyn StageObserver,
	) -> Result<Option<Matrix>, Error> {
		let Some(features) = timed(observer, Stage::Features, || features_from_raw(signal))? else {
			debug!("empty signal window");
			return Ok(None);
		};
		let conv = self.params.conv();
		if features.nc() < conv.window() {
			debug!(samples = features.nc(), window = conv.window(), "signal shorter than the convolution window");
			pool.release(Some(features));
			return Ok(None);
		}
		let features = pool.keep(features);

		let mut current = timed(observer, Stage::Convolution, || -> Result<_, Error> {
			let mut out = pool.keep(convolution(&features, &conv.w, &conv.b, conv.stride, pool.spare())?);
			self.architecture.conv_activation.apply_inplace(&mut out);
			Ok(out)
		})?;
		drop(features);

		for (index, direction) in LAYER_DIRECTIONS.into_iter().enumerate() {
			current = timed(observer, Stage::Recurrent { layer: index }, || {
				self.recurrent_layer(pool, index, direction, &current)
			})?;
		}

		let output = self.params.output();
		let transitions = timed(observer, Stage::GlobalNorm, || {
			globalnorm(
				&current,
				&output.w,
				&output.b,
				options.temperature,
				self.architecture.encoding,
				options.space,
				None,
			)
		})?;
		debug!(columns = transitions.nc(), "computed transitions");
		Ok(Some(transitions))
	}

	fn recurrent_layer<'a>(
		&self,
		pool: &'a MatrixPool,
		index: usize,
		direction: Direction,
		input: &Matrix,
	) -> Result<Pooled<'a>, Error> {
		let layer = self.params.layer(index);
		let cell = LayerCell::new(self.architecture.cell, layer)?;
		let projection = layer.input();
		let projected = pool.keep(feedforward_linear(input, &projection.w, &projection.b, pool.spare())?);
		let mut hidden = pool.keep(recurrent::run(&cell, &projected, direction, pool.spare())?);
		if self.architecture.residual {
			residual_inplace(input, &mut hidden)?;
		}
		Ok(hidden)
	}

	/// Transitions for many signal windows, written to `slots` in input order.
	///
	/// Windows are grouped by length and every group runs through the pipeline one stage at a
	/// time for all of its members. Slots of windows too short to produce output are set to
	/// `None`. The result for each window is identical to [`Self::transitions`]. On error every
	/// slot is `None`.
	#[instrument(skip_all, level = "debug", fields(signals = signals.len()))]
	pub fn transitions_batch(
		&self,
		signals: &[RawSignal<'_>],
		options: TransitionOptions,
		slots: &mut [Option<Matrix>],
		observer: &mut dyn StageObserver,
	) -> Result<(), Error> {
		ensure!(
			signals.len() == slots.len(),
			Error::SlotCountMismatch {
				signals: signals.len(),
				slots: slots.len(),
			}
		);

		let window = self.params.conv().window();
		let mut groups = BTreeMap::<usize, Vec<usize>>::new();
		for (index, signal) in signals.iter().enumerate() {
			slots[index] = None;
			if !signal.is_empty() && signal.len() >= window {
				groups.entry(signal.len()).or_default().push(index);
			}
		}

		let result = self.fill_groups(signals, groups, options, slots, observer);
		if result.is_err() {
			slots.fill(None);
		}
		result
	}

	fn fill_groups(
		&self,
		signals: &[RawSignal<'_>],
		groups: BTreeMap<usize, Vec<usize>>,
		options: TransitionOptions,
		slots: &mut [Option<Matrix>],
		observer: &mut dyn StageObserver,
	) -> Result<(), Error> {
		for (len, indices) in groups {
			let group = indices.iter().map(|&index| signals[index]).collect::<Vec<_>>();
			debug!(samples = len, members = group.len(), "running batch group");
			let results = self.transitions_group(&group, options, observer)?;
			for (index, transitions) in indices.into_iter().zip(results) {
				slots[index] = Some(transitions);
			}
		}
		Ok(())
	}

	fn transitions_group(
		&self,
		group: &[RawSignal<'_>],
		options: TransitionOptions,
		observer: &mut dyn StageObserver,
	) -> Result<Vec<Matrix>, Error> {
		let Some(features) = timed(observer, Stage::Features, || features_from_raw_vec(group))? else {
			return Ok(Vec::new());
		};

		let conv = self.params.conv();
		let mut current = timed(observer, Stage::Convolution, || -> Result<_, Error> {
			let mut out = convolution_vec(&features, &conv.w, &conv.b, conv.stride)?;
			self.architecture.conv_activation.apply_inplace_vec(&mut out);
			Ok(out)
		})?;
		drop(features);

		for (index, direction) in LAYER_DIRECTIONS.into_iter().enumerate() {
			current = timed(observer, Stage::Recurrent { layer: index }, || -> Result<_, Error> {
				let layer = self.params.layer(index);
				let cell = LayerCell::new(self.architecture.cell, layer)?;
				let projection = layer.input();
				let mut hidden =
					recurrent::run_fused_vec(&cell, &current, &projection.w, &projection.b, direction)?;
				if self.architecture.residual {
					residual_inplace_vec(&current, &mut hidden)?;
				}
				Ok(hidden)
			})?;
		}

		let output = self.params.output();
		let transitions = timed(observer, Stage::GlobalNorm, || {
			globalnorm_vec(
				&current,
				&output.w,
				&output.b,
				options.temperature,
				self.architecture.encoding,
				options.space,
			)
		})?;
		Ok(transitions.into_inner())
	}
}

/// The recurrent cell of one layer, borrowed from its parameters.
#[derive(Debug, Clone, Copy)]
enum LayerCell<'a> {
	Gru(Gru<'a>),
	GruRelu(GruRelu<'a>),
	GruMod(GruMod<'a>),
	Lstm(Lstm<'a>),
}

impl<'a> LayerCell<'a> {
	fn new(kind: CellKind, layer: LayerParams<'a>) -> Result<Self, Error> {
		let cell = match (kind, layer) {
			(CellKind::Gru, LayerParams::Paired(layer)) => Self::Gru(Gru::new(&layer.sw, &layer.sw2)?),
			(CellKind::GruRelu, LayerParams::Paired(layer)) => {
				Self::GruRelu(GruRelu::new(&layer.sw, &layer.sw2)?)
			}
			(CellKind::GruMod, LayerParams::Single(layer)) => Self::GruMod(GruMod::new(&layer.sw)?),
			(CellKind::Lstm, LayerParams::Single(layer)) => Self::Lstm(Lstm::new(&layer.sw)?),
			(cell, layer) => {
				bail!(Error::CellParameterMismatch {
					cell,
					expected: cell.state_matrices(),
					actual: layer.state_matrices(),
				})
			}
		};
		Ok(cell)
	}
}

macro_rules! with_cell {
	($cell:expr, $inner:ident => $body:expr) => {
		match $cell {
			LayerCell::Gru($inner) => $body,
			LayerCell::GruRelu($inner) => $body,
			LayerCell::GruMod($inner) => $body,
			LayerCell::Lstm($inner) => $body,
		}
	};
}

impl RecurrentCell for LayerCell<'_> {
	fn input_size(&self) -> usize {
		with_cell!(self, cell => cell.input_size())
	}

	fn state_size(&self) -> usize {
		with_cell!(self, cell => cell.state_size())
	}

	fn scratch_size(&self) -> usize {
		with_cell!(self, cell => cell.scratch_size())
	}

	fn memory_size(&self) -> usize {
		with_cell!(self, cell => cell.memory_size())
	}

	fn step(&self, x: &[f32], prev: &[f32], memory: &mut [f32], scratch: &mut [f32], next: &mut [f32]) {
		with_cell!(self, cell => cell.step(x, prev, memory, scratch, next))
	}
}
