//! Background sampler for the sensor line.
//!
//! Samples the line at a fixed cadence. A sample is only reported when the
//! device is armed and enabled and the value differs from the last
//! recorded `open`; otherwise nothing is written and `open` stays frozen at
//! its last reported value, so re-arming does not trigger an edge against a
//! stale reading.

use crate::error::SensorFault;
use crate::hub::ConnectionHub;
use crate::protocol::encode_notify;
use crate::sensors::SensorLine;
use crate::state::SharedDeviceState;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Polls a [`SensorLine`] and broadcasts reportable transitions.
pub struct SensorPoller {
    state: Arc<SharedDeviceState>,
    hub: Arc<ConnectionHub>,
    line: Box<dyn SensorLine>,
    interval: Duration,
}

impl SensorPoller {
    pub fn new(
        state: Arc<SharedDeviceState>,
        hub: Arc<ConnectionHub>,
        line: Box<dyn SensorLine>,
        interval: Duration,
    ) -> Self {
        Self {
            state,
            hub,
            line,
            interval,
        }
    }

    /// Take one sample and report it if it is a reportable transition.
    ///
    /// Returns the new `open` value when a NOTIFY was broadcast.
    pub async fn tick(&mut self) -> Result<Option<bool>, SensorFault> {
        let sample = self.line.read_line()?;

        match self.state.apply_sample(sample) {
            Some(open) => {
                info!(
                    "[Poller] Device {}, notifying observers",
                    if open { "opened" } else { "closed" }
                );
                self.hub.broadcast(&encode_notify(Some(open))).await;
                Ok(Some(open))
            }
            None => Ok(None),
        }
    }

    /// Run until `shutdown` is cancelled or the line faults.
    ///
    /// The line is torn down on every exit path.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), SensorFault> {
        info!(
            "[Poller] Watching {} every {:?}",
            self.line.describe(),
            self.interval
        );

        let result = self.poll_loop(&shutdown).await;
        self.line.teardown();

        match &result {
            Ok(()) => info!("[Poller] Stopped"),
            Err(e) => error!("[Poller] Sensor fault, polling stopped: {}", e),
        }
        result
    }

    async fn poll_loop(&mut self, shutdown: &CancellationToken) -> Result<(), SensorFault> {
        self.line.setup()?;

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("[Poller] Shutdown requested");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.tick().await?;
                }
            }
        }
    }
}
