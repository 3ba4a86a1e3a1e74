// Copyright 2025 Irreducible Inc.

use std::{env, sync::OnceLock};

/// In case when number of threads is set to 1, use rayon thread pool with
/// `use_current_thread` set to true, so batched kernels run on the calling thread.
/// This keeps profiles of the batched pipeline as readable as the scalar one.
///
/// NOTE: rayon doesn't allow initializing global thread pool several times, so
/// in case when it was initialized before this function returns an error.
/// The function returns reference to the result because `ThreadPoolBuildError`
/// doesn't implement `Clone`.
pub fn adjust_thread_pool() -> &'static Result<(), rayon::ThreadPoolBuildError> {
	static ONCE_GUARD: OnceLock<Result<(), rayon::ThreadPoolBuildError>> = OnceLock::new();

	ONCE_GUARD.get_or_init(|| {
		// We cannot use `rayon::current_num_threads` because it would force the global thread
		// pool to initialize, so we won't be able to override it.
		match env::var("RAYON_NUM_THREADS") {
			Ok(v) if v == "1" => rayon::ThreadPoolBuilder::new()
				.num_threads(1)
				.use_current_thread()
				.build_global(),
			_ => Ok(()),
		}
	})
}
