//! Runtime environment initialization for the CLI.

/// Rayon worker stack size; graph DP over wide workbooks builds deep vectors.
const RAYON_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Configure the global rayon pool once at startup.
pub fn configure_thread_pool(jobs: usize) {
    let mut builder = rayon::ThreadPoolBuilder::new().stack_size(RAYON_STACK_SIZE);

    if jobs > 0 {
        builder = builder.num_threads(jobs);
    }

    if let Err(e) = builder.build_global() {
        // Already configured, which is fine.
        log::debug!("thread pool already configured: {e}");
    }
}

/// Worker thread count: explicit, or every available core.
pub fn get_worker_count(jobs: usize) -> usize {
    if jobs == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    } else {
        jobs
    }
}
