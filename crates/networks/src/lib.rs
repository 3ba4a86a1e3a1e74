// Copyright 2025 Irreducible Inc.

//! Signal-to-transition networks built from [`squiggle_layers`] kernels.
//!
//! A [`Network`] composes feature extraction, a strided convolution, five recurrent layers
//! and CRF global normalisation. The compiled-in [`Model`]s are served through
//! [`compute_transitions`] and [`compute_transitions_batch`].

mod compute;
mod config;
mod error;
mod model;
mod network;
mod params;
mod signal;
mod tables;
mod timing;

pub use compute::*;
pub use config::*;
pub use error::*;
pub use model::*;
pub use network::*;
pub use params::*;
pub use signal::*;
pub use timing::{Stage, StageObserver, StageTimings};
