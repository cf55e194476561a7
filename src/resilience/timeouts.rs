//! Deadline tracking.
//!
//! # Responsibilities
//! - Bound every external call made while applying a configuration
//! - Let a multi-step wait (probe, sleep, probe) share one budget
//!
//! # Design Decisions
//! - Uses Tokio's clock so tests can pause time
//! - Timeout errors are distinct from other errors at the call site

use std::time::Duration;
use tokio::time::Instant;

/// A fixed point in time after which a wait gives up.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }
}
