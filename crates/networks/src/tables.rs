// Copyright 2025 Irreducible Inc.

//! Process-wide parameter tables of the compiled-in models.
//!
//! Tables are generated deterministically from a per-model seed the first time they are used
//! and are read-only afterwards.

use lazy_static::lazy_static;

use crate::{model::Model, params::ParameterSet};

fn build(model: Model) -> ParameterSet {
	ParameterSet::seeded(model.architecture().cell, &model.table_shape(), model.seed())
}

lazy_static! {
	static ref R941_NATIVE: ParameterSet = build(Model::R941Native);
	static ref R941_NATIVE_5MC: ParameterSet = build(Model::R941Native5mC);
	static ref R10C_PCR: ParameterSet = build(Model::R10cPcr);
	static ref RLE_R941_NATIVE: ParameterSet = build(Model::RleR941Native);
	static ref NEWRLE_R941_NATIVE: ParameterSet = build(Model::NewRleR941Native);
}

pub(crate) fn compiled_parameters(model: Model) -> &'static ParameterSet {
	match model {
		Model::R941Native => &*R941_NATIVE,
		Model::R941Native5mC => &*R941_NATIVE_5MC,
		Model::R10cPcr => &*R10C_PCR,
		Model::RleR941Native => &*RLE_R941_NATIVE,
		Model::NewRleR941Native => &*NEWRLE_R941_NATIVE,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_tables_are_built_once() {
		let first = compiled_parameters(Model::R10cPcr) as *const ParameterSet;
		let second = compiled_parameters(Model::R10cPcr) as *const ParameterSet;
		assert_eq!(first, second);
		assert_eq!(
			compiled_parameters(Model::R941Native).output().w.nc(),
			Model::R941Native.table_shape().encoding.nparam(4)
		);
	}
}
