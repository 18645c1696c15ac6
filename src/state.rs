//! Shared device state.
//!
//! The single source of truth for the contact sensor: three tri-state
//! flags (`open`, `armed`, `enabled`). `None` means "unknown", which is
//! what every flag starts as until the line is sampled or a client
//! configures it.
//!
//! Readers and writers all go through one mutex so a snapshot of the
//! three flags is never torn by a concurrent update.

use parking_lot::Mutex;

/// A boolean that may not have been set yet.
pub type TriState = Option<bool>;

/// Point-in-time copy of the device flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceSnapshot {
    /// Last observed physical state of the line.
    pub open: TriState,
    /// Monitoring is active.
    pub armed: TriState,
    /// The device may report changes at all.
    pub enabled: TriState,
}

impl DeviceSnapshot {
    /// Whether `sample` counts as a reportable transition against this
    /// snapshot: armed, enabled, and different from the last `open`.
    ///
    /// An unknown `open` differs from every sample.
    pub fn is_reportable(&self, sample: bool) -> bool {
        self.armed == Some(true) && self.enabled == Some(true) && self.open != Some(sample)
    }
}

/// A partial update: only `Some` fields are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub open: Option<bool>,
    pub armed: Option<bool>,
    pub enabled: Option<bool>,
}

/// Thread-safe device state shared by the poller and the message path.
#[derive(Debug, Default)]
pub struct SharedDeviceState {
    inner: Mutex<DeviceSnapshot>,
}

impl SharedDeviceState {
    /// Create a state record with all three flags unknown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic snapshot of all three flags.
    pub fn get(&self) -> DeviceSnapshot {
        *self.inner.lock()
    }

    pub fn set_open(&self, value: bool) {
        self.inner.lock().open = Some(value);
    }

    pub fn set_armed(&self, value: bool) {
        self.inner.lock().armed = Some(value);
    }

    pub fn set_enabled(&self, value: bool) {
        self.inner.lock().enabled = Some(value);
    }

    /// Write the fields present in `update`, leave the rest alone.
    ///
    /// Returns the snapshot taken right after the write.
    pub fn apply_partial_update(&self, update: StateUpdate) -> DeviceSnapshot {
        let mut state = self.inner.lock();
        if let Some(open) = update.open {
            state.open = Some(open);
        }
        if let Some(armed) = update.armed {
            state.armed = Some(armed);
        }
        if let Some(enabled) = update.enabled {
            state.enabled = Some(enabled);
        }
        *state
    }

    /// Gate a fresh line sample and record it if it is reportable.
    ///
    /// Snapshot, check and write happen under one lock acquisition, so a
    /// client disarming concurrently either lands before (no report) or
    /// after (report already made). Returns the new `open` value when the
    /// sample was recorded.
    pub fn apply_sample(&self, sample: bool) -> Option<bool> {
        let mut state = self.inner.lock();
        if state.is_reportable(sample) {
            state.open = Some(sample);
            Some(sample)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_initial_state_unknown() {
        let state = SharedDeviceState::new();
        assert_eq!(state.get(), DeviceSnapshot::default());
        assert_eq!(state.get().open, None);
        assert_eq!(state.get().armed, None);
        assert_eq!(state.get().enabled, None);
    }

    #[test]
    fn test_individual_setters() {
        let state = SharedDeviceState::new();
        state.set_armed(true);
        assert_eq!(state.get().armed, Some(true));
        assert_eq!(state.get().enabled, None);

        state.set_enabled(false);
        state.set_open(true);
        assert_eq!(
            state.get(),
            DeviceSnapshot {
                open: Some(true),
                armed: Some(true),
                enabled: Some(false),
            }
        );
    }

    #[test]
    fn test_partial_update_leaves_absent_fields() {
        let state = SharedDeviceState::new();
        state.set_open(false);
        state.set_enabled(true);

        let after = state.apply_partial_update(StateUpdate {
            armed: Some(true),
            ..Default::default()
        });
        assert_eq!(after.armed, Some(true));
        assert_eq!(after.enabled, Some(true));
        assert_eq!(after.open, Some(false));

        let after = state.apply_partial_update(StateUpdate::default());
        assert_eq!(after, state.get());
        assert_eq!(after.armed, Some(true));
    }

    #[test]
    fn test_partial_update_isolation_over_sequences() {
        let updates = [
            StateUpdate { armed: Some(true), ..Default::default() },
            StateUpdate { enabled: Some(false), ..Default::default() },
            StateUpdate { open: Some(true), armed: Some(false), ..Default::default() },
            StateUpdate::default(),
            StateUpdate { enabled: Some(true), open: Some(false), ..Default::default() },
        ];

        let state = SharedDeviceState::new();
        for update in updates {
            let before = state.get();
            let after = state.apply_partial_update(update);
            if update.open.is_none() {
                assert_eq!(after.open, before.open);
            }
            if update.armed.is_none() {
                assert_eq!(after.armed, before.armed);
            }
            if update.enabled.is_none() {
                assert_eq!(after.enabled, before.enabled);
            }
        }
    }

    #[test]
    fn test_reportable_truth_table() {
        // (armed, enabled, sample changed) -> reportable
        for armed in [false, true] {
            for enabled in [false, true] {
                for changed in [false, true] {
                    let last_open = false;
                    let sample = if changed { !last_open } else { last_open };
                    let snapshot = DeviceSnapshot {
                        open: Some(last_open),
                        armed: Some(armed),
                        enabled: Some(enabled),
                    };
                    assert_eq!(
                        snapshot.is_reportable(sample),
                        armed && enabled && changed,
                        "armed={armed} enabled={enabled} changed={changed}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_unknown_flags_never_report() {
        let snapshot = DeviceSnapshot::default();
        assert!(!snapshot.is_reportable(true));

        let snapshot = DeviceSnapshot {
            armed: Some(true),
            ..Default::default()
        };
        assert!(!snapshot.is_reportable(true));
    }

    #[test]
    fn test_unknown_open_reports_first_sample() {
        let snapshot = DeviceSnapshot {
            open: None,
            armed: Some(true),
            enabled: Some(true),
        };
        assert!(snapshot.is_reportable(false));
        assert!(snapshot.is_reportable(true));
    }

    #[test]
    fn test_apply_sample_freezes_open_while_disarmed() {
        let state = SharedDeviceState::new();
        state.set_armed(true);
        state.set_enabled(true);
        assert_eq!(state.apply_sample(true), Some(true));
        assert_eq!(state.apply_sample(true), None);

        state.set_armed(false);
        assert_eq!(state.apply_sample(false), None);
        assert_eq!(state.get().open, Some(true));

        state.set_armed(true);
        assert_eq!(state.apply_sample(false), Some(false));
        assert_eq!(state.get().open, Some(false));
    }

    #[test]
    fn test_concurrent_snapshots_are_consistent() {
        let state = Arc::new(SharedDeviceState::new());
        let writer = {
            let state = state.clone();
            std::thread::spawn(move || {
                for i in 0..10_000 {
                    let v = i % 2 == 0;
                    state.apply_partial_update(StateUpdate {
                        armed: Some(v),
                        enabled: Some(v),
                        ..Default::default()
                    });
                }
            })
        };

        for _ in 0..10_000 {
            let snapshot = state.get();
            assert_eq!(snapshot.armed, snapshot.enabled);
        }
        writer.join().unwrap();
    }
}
