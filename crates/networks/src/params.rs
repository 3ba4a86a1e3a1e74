// Copyright 2025 Irreducible Inc.

use rand::{rngs::StdRng, Rng, SeedableRng};
use squiggle_layers::{Activation, Encoding, Matrix};

/// Number of recurrent layers in every network.
pub const RECURRENT_LAYERS: usize = 5;

/// Recurrent cell used by all layers of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
	Gru,
	GruRelu,
	GruMod,
	Lstm,
}

impl CellKind {
	/// Rows of the pre-projected input per state element.
	pub const fn input_gates(self) -> usize {
		match self {
			Self::Gru | Self::GruRelu | Self::GruMod => 3,
			Self::Lstm => 4,
		}
	}

	/// Columns of the first state matrix per state element.
	pub const fn state_gates(self) -> usize {
		match self {
			Self::Gru | Self::GruRelu => 2,
			Self::GruMod => 3,
			Self::Lstm => 4,
		}
	}

	/// Number of state matrices each layer carries.
	pub const fn state_matrices(self) -> usize {
		match self {
			Self::Gru | Self::GruRelu => 2,
			Self::GruMod | Self::Lstm => 1,
		}
	}
}

/// Structural description of a network, independent of its trained values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Architecture {
	pub cell: CellKind,
	pub conv_activation: Activation,
	/// Whether every recurrent layer adds its input to its output.
	pub residual: bool,
	pub encoding: Encoding,
}

/// Convolution over the raw feature row.
#[derive(Debug, Clone)]
pub struct ConvParams {
	/// `window x filters`.
	pub w: Matrix,
	pub b: Matrix,
	pub stride: usize,
}

impl ConvParams {
	/// Width of the filter in samples.
	pub fn window(&self) -> usize {
		self.w.nr()
	}

	pub fn filters(&self) -> usize {
		self.w.nc()
	}
}

/// `Wᵀ x + b`.
#[derive(Debug, Clone)]
pub struct Affine {
	pub w: Matrix,
	pub b: Matrix,
}

/// Recurrent layer with two state matrices, as used by GRU and GRU-ReLU cells.
#[derive(Debug, Clone)]
pub struct PairedLayer {
	pub input: Affine,
	pub sw: Matrix,
	pub sw2: Matrix,
}

/// Recurrent layer with one state matrix, as used by modified-GRU and LSTM cells.
#[derive(Debug, Clone)]
pub struct SingleLayer {
	pub input: Affine,
	pub sw: Matrix,
}

/// Trained values of a network.
#[derive(Debug, Clone)]
pub enum ParameterSet {
	Paired {
		conv: ConvParams,
		layers: [PairedLayer; RECURRENT_LAYERS],
		output: Affine,
	},
	Single {
		conv: ConvParams,
		layers: [SingleLayer; RECURRENT_LAYERS],
		output: Affine,
	},
}

/// Borrowed view of one recurrent layer of a [`ParameterSet`].
#[derive(Debug, Clone, Copy)]
pub enum LayerParams<'a> {
	Paired(&'a PairedLayer),
	Single(&'a SingleLayer),
}

impl<'a> LayerParams<'a> {
	pub fn input(self) -> &'a Affine {
		match self {
			Self::Paired(layer) => &layer.input,
			Self::Single(layer) => &layer.input,
		}
	}

	pub fn sw(self) -> &'a Matrix {
		match self {
			Self::Paired(layer) => &layer.sw,
			Self::Single(layer) => &layer.sw,
		}
	}

	pub fn state_matrices(self) -> usize {
		match self {
			Self::Paired(_) => 2,
			Self::Single(_) => 1,
		}
	}
}

impl ParameterSet {
	pub fn conv(&self) -> &ConvParams {
		match self {
			Self::Paired { conv, .. } | Self::Single { conv, .. } => conv,
		}
	}

	pub fn output(&self) -> &Affine {
		match self {
			Self::Paired { output, .. } | Self::Single { output, .. } => output,
		}
	}

	pub fn layer(&self, index: usize) -> LayerParams<'_> {
		match self {
			Self::Paired { layers, .. } => LayerParams::Paired(&layers[index]),
			Self::Single { layers, .. } => LayerParams::Single(&layers[index]),
		}
	}

	pub fn layers(&self) -> impl Iterator<Item = LayerParams<'_>> + '_ {
		(0..RECURRENT_LAYERS).map(|index| self.layer(index))
	}

	pub fn state_matrices(&self) -> usize {
		match self {
			Self::Paired { .. } => 2,
			Self::Single { .. } => 1,
		}
	}

	/// Deterministic pseudo-random parameters of the given shape.
	///
	/// Weights are uniform on `±1/sqrt(fan_in)` and biases uniform on `±0.1`.
	pub fn seeded(cell: CellKind, shape: &TableShape, seed: u64) -> Self {
		let mut rng = StdRng::seed_from_u64(seed);
		let size = shape.size;
		let conv = ConvParams {
			w: uniform(&mut rng, shape.window, shape.filters),
			b: bias(&mut rng, shape.filters),
			stride: shape.stride,
		};

		let input = |rng: &mut StdRng, index: usize| {
			let nin = if index == 0 { shape.filters } else { size };
			Affine {
				w: uniform(rng, nin, cell.input_gates() * size),
				b: bias(rng, cell.input_gates() * size),
			}
		};
		let output = |rng: &mut StdRng| {
			let nparam = shape.encoding.nparam(shape.nbase);
			Affine {
				w: uniform(rng, size, nparam),
				b: bias(rng, nparam),
			}
		};

		match cell {
			CellKind::Gru | CellKind::GruRelu => Self::Paired {
				conv,
				layers: std::array::from_fn(|index| PairedLayer {
					input: input(&mut rng, index),
					sw: uniform(&mut rng, size, cell.state_gates() * size),
					sw2: uniform(&mut rng, size, size),
				}),
				output: output(&mut rng),
			},
			CellKind::GruMod | CellKind::Lstm => Self::Single {
				conv,
				layers: std::array::from_fn(|index| SingleLayer {
					input: input(&mut rng, index),
					sw: uniform(&mut rng, size, cell.state_gates() * size),
				}),
				output: output(&mut rng),
			},
		}
	}
}

/// Dimensions of a parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableShape {
	/// Convolution window, in samples.
	pub window: usize,
	pub stride: usize,
	pub filters: usize,
	/// Recurrent state size.
	pub size: usize,
	pub encoding: Encoding,
	pub nbase: usize,
}

fn uniform(rng: &mut StdRng, nr: usize, nc: usize) -> Matrix {
	let bound = 1.0 / (nr as f32).sqrt();
	Matrix::from_fn(nr, nc, |_, _| rng.gen_range(-bound..bound))
}

fn bias(rng: &mut StdRng, n: usize) -> Matrix {
	Matrix::from_fn(n, 1, |_, _| rng.gen_range(-0.1..0.1))
}
