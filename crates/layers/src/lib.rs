// Copyright 2025 Irreducible Inc.

//! Numeric layer library for signal-to-transition inference.
//!
//! This crate provides the building blocks the network pipelines are composed from:
//!
//! * [`Matrix`], a column-major `f32` container with SIMD-friendly column padding, together
//!   with [`MatrixBatch`] and the per-invocation [`MatrixPool`]
//! * elementwise activations
//! * convolution, windowing, embedding, feed-forward and residual kernels
//! * gated recurrent cells (GRU, modified GRU, GRU-ReLU) and an LSTM cell
//! * CRF global normalisation for the flip-flop, many-stay and run-length encodings
//!
//! All kernels perform forward inference only.

pub mod activation;
mod batch;
pub mod crf;
mod error;
pub mod fixed;
pub mod linear;
mod matrix;
mod pool;
pub mod recurrent;

pub use activation::Activation;
pub use batch::*;
pub use crf::{Encoding, OutputSpace};
pub use error::*;
pub use matrix::*;
pub use pool::*;
pub use recurrent::Direction;
