//! Utility functions and types

mod parallel;
mod timer;

pub use parallel::ParallelConfig;
pub use timer::Timer;
