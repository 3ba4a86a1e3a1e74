// Copyright 2025 Irreducible Inc.

//! Fixed-point encoding of probabilities and weight quantisation.

use super::matrix::Matrix;

/// Unsigned fixed-point value with [`FIXED_POINT_FRACTIONAL_BITS`] fractional bits.
pub type FixedPoint = u16;

pub const FIXED_POINT_FRACTIONAL_BITS: u32 = 5;

const FIXED_POINT_ONE: f32 = (1u32 << FIXED_POINT_FRACTIONAL_BITS) as f32;

/// Rounds `x` to the nearest representable fixed-point value, saturating at the ends of the
/// range.
pub fn float_to_fixed(x: f32) -> FixedPoint {
	(x * FIXED_POINT_ONE)
		.round()
		.clamp(0.0, FixedPoint::MAX as f32) as FixedPoint
}

pub fn fixed_to_float(q: FixedPoint) -> f32 {
	f32::from(q) / FIXED_POINT_ONE
}

/// Simulates storing weights as signed bytes at the given scale: every value becomes
/// `clamp(trunc(x · scale), -127, 127) / scale`.
pub fn quantize_clip(matrix: &Matrix, scale: f32) -> Matrix {
	let mut out = matrix.clone();
	quantize_clip_inplace(&mut out, scale);
	out
}

pub fn quantize_clip_inplace(matrix: &mut Matrix, scale: f32) {
	matrix.map_inplace(|x| (x * scale).trunc().clamp(-127.0, 127.0) / scale);
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	#[test]
	fn test_fixed_point_values() {
		assert_eq!(float_to_fixed(1.0), 32);
		assert_eq!(float_to_fixed(0.5), 16);
		assert_eq!(float_to_fixed(-3.0), 0);
		assert_eq!(float_to_fixed(1e9), u16::MAX);
		assert_eq!(fixed_to_float(48), 1.5);
	}

	#[test]
	fn test_quantize_clip() {
		let m = Matrix::from_columns(2, 2, &[0.123, -0.456, 3.0, -2.0]).unwrap();
		let q = quantize_clip(&m, 100.0);
		assert!((q[(0, 0)] - 0.12).abs() < 1e-6);
		assert!((q[(1, 0)] + 0.45).abs() < 1e-6);
		assert!((q[(0, 1)] - 1.27).abs() < 1e-6);
		assert!((q[(1, 1)] + 1.27).abs() < 1e-6);
	}

	proptest! {
		#[test]
		fn test_fixed_point_round_trip(x in 0.0f32..2000.0) {
			let back = fixed_to_float(float_to_fixed(x));
			prop_assert!((back - x).abs() <= 0.5 / 32.0 + 1e-3);
		}
	}
}
