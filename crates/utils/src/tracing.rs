// Copyright 2025 Irreducible Inc.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "warn";

/// Installs the global tracing subscriber.
///
/// The filter is read from `RUST_LOG` and falls back to [`DEFAULT_FILTER`]. Setting
/// `SQUIGGLE_LOG_SPANS` additionally prints span close events, which carry the elapsed time of
/// every pipeline stage. Calling this more than once is harmless; later calls are ignored.
pub fn init_tracing() {
	use tracing_subscriber::fmt::format::FmtSpan;

	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

	let span_events = if crate::env::boolean_env_flag_set("SQUIGGLE_LOG_SPANS") {
		FmtSpan::CLOSE
	} else {
		FmtSpan::NONE
	};

	let _ = tracing_subscriber::registry()
		.with(filter)
		.with(
			tracing_subscriber::fmt::layer()
				.with_writer(std::io::stderr)
				.with_span_events(span_events),
		)
		.try_init();
}
