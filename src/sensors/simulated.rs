//! Simulated sensor line.
//!
//! Lets the server run on machines without GPIO. The level is shared with a
//! [`SimulatedLineHandle`], so tests (or a dev task) can open and close the
//! "door" while the poller is running. Optionally flips itself every N
//! reads.

use super::SensorLine;
use crate::error::SensorFault;
use log::info;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Controls a [`SimulatedLine`] from another task.
#[derive(Debug, Clone)]
pub struct SimulatedLineHandle {
    level: Arc<AtomicBool>,
    fault: Arc<AtomicBool>,
}

impl SimulatedLineHandle {
    pub fn set(&self, open: bool) {
        self.level.store(open, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    /// Make every following read fail.
    pub fn inject_fault(&self) {
        self.fault.store(true, Ordering::SeqCst);
    }
}

/// In-memory line driven by a handle.
pub struct SimulatedLine {
    level: Arc<AtomicBool>,
    fault: Arc<AtomicBool>,
    toggle_every: u32,
    reads: u32,
    torn_down: Arc<AtomicBool>,
}

impl SimulatedLine {
    /// Create a line at the given level together with its control handle.
    pub fn new(initial: bool) -> (Self, SimulatedLineHandle) {
        let level = Arc::new(AtomicBool::new(initial));
        let fault = Arc::new(AtomicBool::new(false));
        let line = Self {
            level: level.clone(),
            fault: fault.clone(),
            toggle_every: 0,
            reads: 0,
            torn_down: Arc::new(AtomicBool::new(false)),
        };
        (line, SimulatedLineHandle { level, fault })
    }

    /// Flip the level on every `n`th read (0 disables).
    pub fn toggling_every(mut self, n: u32) -> Self {
        self.toggle_every = n;
        self
    }

    /// Flag that is set once `teardown` has run.
    pub fn teardown_flag(&self) -> Arc<AtomicBool> {
        self.torn_down.clone()
    }
}

impl SensorLine for SimulatedLine {
    fn read_line(&mut self) -> Result<bool, SensorFault> {
        if self.fault.load(Ordering::SeqCst) {
            return Err(SensorFault::Simulated("injected read fault".to_string()));
        }

        self.reads = self.reads.wrapping_add(1);
        if self.toggle_every > 0 && self.reads % self.toggle_every == 0 {
            let old = self.level.fetch_xor(true, Ordering::SeqCst);
            info!("[Sim] Line toggled to: {}", if old { "closed" } else { "open" });
        }
        Ok(self.level.load(Ordering::SeqCst))
    }

    fn teardown(&mut self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        if self.toggle_every > 0 {
            format!("simulated line (toggles every {} reads)", self.toggle_every)
        } else {
            "simulated line".to_string()
        }
    }
}
