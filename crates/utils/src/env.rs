// Copyright 2025 Irreducible Inc.

use std::str::FromStr;

/// Read boolean flag from the environment variable.
pub fn boolean_env_flag_set(flag: &str) -> bool {
	match std::env::var(flag) {
		Ok(val) => ["1", "on", "ON", "true", "TRUE", "yes", "YES"].contains(&val.as_str()),
		Err(_) => false,
	}
}

/// Read and parse a value from the environment variable.
///
/// Returns `None` when the variable is unset, and `Some(Err(raw))` carrying the raw string
/// when it is set but cannot be parsed as `T`.
pub fn parsed_env_var<T: FromStr>(name: &str) -> Option<Result<T, String>> {
	let raw = std::env::var(name).ok()?;
	Some(raw.trim().parse::<T>().map_err(|_| raw))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_unset_variables() {
		assert!(!boolean_env_flag_set("SQUIGGLE_TEST_SURELY_UNSET_FLAG"));
		assert_eq!(parsed_env_var::<f32>("SQUIGGLE_TEST_SURELY_UNSET_VALUE"), None);
	}

	#[test]
	fn test_parsed_env_var() {
		std::env::set_var("SQUIGGLE_TEST_PARSED_OK", " 1.5 ");
		assert_eq!(parsed_env_var::<f32>("SQUIGGLE_TEST_PARSED_OK"), Some(Ok(1.5)));

		std::env::set_var("SQUIGGLE_TEST_PARSED_BAD", "warm");
		assert_eq!(
			parsed_env_var::<f32>("SQUIGGLE_TEST_PARSED_BAD"),
			Some(Err("warm".to_string()))
		);
	}
}
