// Copyright 2025 Irreducible Inc.

//! Small shared helpers for the squiggle crates: error macros, environment parsing,
//! thread-pool setup and tracing initialisation.

pub mod checked_arithmetics;
pub mod env;
pub mod error_utils;
pub mod rayon;
pub mod tracing;
