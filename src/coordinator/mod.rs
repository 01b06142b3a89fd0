// ABOUTME: Coordinator module for bounding concurrent subagent execution.
// ABOUTME: Contains the semaphore-backed concurrency limiter.

mod limiter;

pub use limiter::{Cancelled, ConcurrencyLimiter};

#[cfg(test)]
mod limiter_test;
