// Copyright 2025 Irreducible Inc.

/// Division that yields `None` unless `a` is an exact multiple of `b`.
pub const fn exact_div(a: usize, b: usize) -> Option<usize> {
	if b == 0 || a % b != 0 {
		return None;
	}
	Some(a / b)
}

/// Integer square root, rounded down.
pub const fn isqrt(n: usize) -> usize {
	if n < 2 {
		return n;
	}
	// Newton iteration from an overestimate converges monotonically downwards.
	let mut x = n;
	let mut y = x / 2 + x % 2;
	while y < x {
		x = y;
		y = (x + n / x) / 2;
	}
	x
}

/// Square root that yields `None` unless `n` is a perfect square.
pub const fn exact_isqrt(n: usize) -> Option<usize> {
	let root = isqrt(n);
	if root * root == n {
		Some(root)
	} else {
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_exact_div() {
		assert_eq!(exact_div(6, 1), Some(6));
		assert_eq!(exact_div(6, 2), Some(3));
		assert_eq!(exact_div(6, 6), Some(1));
		assert_eq!(exact_div(5, 2), None);
		assert_eq!(exact_div(5, 0), None);
	}

	#[test]
	fn test_isqrt() {
		for n in 0..2000usize {
			let r = isqrt(n);
			assert!(r * r <= n);
			assert!((r + 1) * (r + 1) > n);
		}
	}

	#[test]
	fn test_exact_isqrt() {
		assert_eq!(exact_isqrt(0), Some(0));
		assert_eq!(exact_isqrt(1), Some(1));
		assert_eq!(exact_isqrt(81), Some(9));
		assert_eq!(exact_isqrt(80), None);
		assert_eq!(exact_isqrt(82), None);
	}
}
