//! Stage timing

use std::time::{Duration, Instant};
use tracing::info;

/// Timer for measuring execution time
#[derive(Debug)]
pub struct Timer {
    name: String,
    start: Instant,
    checkpoints: Vec<(String, Duration)>,
}

impl Timer {
    /// Create and start a new timer
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            checkpoints: Vec::new(),
        }
    }

    /// Record the time elapsed so far under `name`
    pub fn checkpoint(&mut self, name: impl Into<String>) {
        self.checkpoints.push((name.into(), self.start.elapsed()));
    }

    pub fn checkpoints(&self) -> &[(String, Duration)] {
        &self.checkpoints
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Stop and log the total
    pub fn stop(self) -> Duration {
        let elapsed = self.start.elapsed();
        info!(stage = %self.name, secs = elapsed.as_secs_f64(), "Stage completed");
        elapsed
    }

    /// Stop and log every checkpoint with its delta from the previous one
    pub fn stop_with_report(self) -> Duration {
        let elapsed = self.start.elapsed();

        let mut prev = Duration::ZERO;
        for (name, at) in &self.checkpoints {
            let delta = at.saturating_sub(prev);
            info!(
                stage = %self.name,
                checkpoint = %name,
                at_secs = at.as_secs_f64(),
                delta_secs = delta.as_secs_f64(),
                "Checkpoint"
            );
            prev = *at;
        }
        info!(stage = %self.name, secs = elapsed.as_secs_f64(), "Stage completed");

        elapsed
    }
}
