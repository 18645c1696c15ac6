//! Sensor line sources.
//!
//! The poller only needs a boolean sample on demand. Backends own their
//! hardware setup and cleanup and expose it through [`SensorLine::setup`]
//! and [`SensorLine::teardown`], which the poller calls once at start and
//! once on exit.
//!
//! Current backends:
//! - `sysfs`: Linux GPIO through `/sys/class/gpio`
//! - `simulated`: in-memory line for development and tests

pub mod simulated;
pub mod sysfs;

pub use simulated::{SimulatedLine, SimulatedLineHandle};
pub use sysfs::SysfsLine;

use crate::config::{SensorBackend, SensorConfig};
use crate::error::SensorFault;
use log::warn;

/// A digital input line that can be sampled synchronously.
pub trait SensorLine: Send {
    /// Prepare the line for reading. Called once before the first sample.
    fn setup(&mut self) -> Result<(), SensorFault> {
        Ok(())
    }

    /// Read a fresh sample. `true` means the monitored point is open.
    fn read_line(&mut self) -> Result<bool, SensorFault>;

    /// Release the line. Called once when the poller stops, also after a fault.
    fn teardown(&mut self) {}

    /// Short description for log output.
    fn describe(&self) -> String;
}

/// Build the line selected by configuration.
pub fn from_config(config: &SensorConfig) -> Box<dyn SensorLine> {
    match config.backend {
        SensorBackend::Sysfs => Box::new(SysfsLine::new(
            &config.sysfs_root,
            config.gpio_pin,
            config.invert,
        )),
        SensorBackend::Simulated => {
            // No one holds the handle here, toggling is the only way it moves
            let (line, _handle) = SimulatedLine::new(false);
            if config.simulated_toggle_every == 0 {
                warn!("[Sim] SIM_TOGGLE_EVERY is 0, the simulated line will stay closed");
            }
            Box::new(line.toggling_every(config.simulated_toggle_every))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_simulated_line_from_default_config_moves() {
        let mut config = Config::default().sensor;
        config.backend = SensorBackend::Simulated;

        let mut line = from_config(&config);
        let samples: Vec<bool> = (0..config.simulated_toggle_every * 2)
            .map(|_| line.read_line().unwrap())
            .collect();

        assert!(samples.contains(&true));
        assert!(samples.contains(&false));
    }

    #[test]
    fn test_simulated_line_static_when_toggling_disabled() {
        let mut config = Config::default().sensor;
        config.backend = SensorBackend::Simulated;
        config.simulated_toggle_every = 0;

        let mut line = from_config(&config);
        assert!((0..50).all(|_| !line.read_line().unwrap()));
    }
}
