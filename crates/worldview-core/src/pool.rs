use bevy_tasks::{TaskPool, TaskPoolBuilder};
use std::thread;

/// Upper bound on generation threads, no matter how many cores the machine has.
pub const MAX_GENERATION_THREADS: usize = 25;

/// One thread fewer than the available parallelism, so the owning thread keeps a core, clamped to
/// `[1, MAX_GENERATION_THREADS]`.
pub fn default_generation_threads() -> usize {
    let available = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    clamp_generation_threads(available.saturating_sub(1))
}

pub fn clamp_generation_threads(requested: usize) -> usize {
    requested.clamp(1, MAX_GENERATION_THREADS)
}

/// The pool used for CPU-bound sampling and rasterizing.
pub fn generation_pool(num_threads: usize) -> TaskPool {
    let num_threads = clamp_generation_threads(num_threads);
    log::info!("Starting tile generation pool with {} threads", num_threads);
    TaskPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name("worldview-generation".to_owned())
        .build()
}

/// The pool used for disk writes. Kept separate from generation so slow IO never starves sampling.
pub fn io_pool(num_threads: usize) -> TaskPool {
    let num_threads = num_threads.max(1);
    log::info!("Starting IO pool with {} threads", num_threads);
    TaskPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name("worldview-io".to_owned())
        .build()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generation_threads_are_clamped() {
        assert_eq!(clamp_generation_threads(0), 1);
        assert_eq!(clamp_generation_threads(7), 7);
        assert_eq!(clamp_generation_threads(64), MAX_GENERATION_THREADS);
        let default = default_generation_threads();
        assert!((1..=MAX_GENERATION_THREADS).contains(&default));
    }

    #[test]
    fn pools_get_their_own_worker_threads() {
        let generation = generation_pool(3);
        assert_eq!(generation.thread_num(), 3);
        let io = io_pool(2);
        assert_eq!(io.thread_num(), 2);

        // Work runs on a pool thread, not the caller's.
        let caller = thread::current().id();
        let task = io.spawn(async move { thread::current().id() });
        assert_ne!(futures_lite::future::block_on(task), caller);
    }
}
