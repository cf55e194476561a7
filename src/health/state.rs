//! Manager liveness.
//!
//! # States
//! - Live: `HEAD /health` answers 200 and an outer balancer sends RPC traffic here
//! - Out: `HEAD /health` answers 404
//!
//! Set at startup once the proxy has been verified, and toggled by the
//! `BringIntoLB` / `BringOutOfLB` methods.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct LiveState {
    live: AtomicBool,
}

impl LiveState {
    pub fn new(live: bool) -> Self {
        Self {
            live: AtomicBool::new(live),
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Returns the previous state.
    pub fn set(&self, live: bool) -> bool {
        let previous = self.live.swap(live, Ordering::AcqRel);
        if previous != live {
            tracing::info!(live, "Manager liveness changed");
        }
        previous
    }
}
