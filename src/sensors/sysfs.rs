//! Linux sysfs GPIO input line.
//!
//! Uses the legacy `/sys/class/gpio` interface: the pin is exported if it
//! is not already, configured as an input, and sampled by reading its
//! `value` file. Pull-up configuration is not available through sysfs and
//! must be done in the device tree (or by wiring an external resistor).

use super::SensorLine;
use crate::error::SensorFault;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// GPIO input read through sysfs.
pub struct SysfsLine {
    root: PathBuf,
    pin: u32,
    invert: bool,
    /// Set when `setup` exported the pin, so `teardown` only unexports
    /// what it created.
    exported_by_us: bool,
}

impl SysfsLine {
    pub fn new(root: impl AsRef<Path>, pin: u32, invert: bool) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            pin,
            invert,
            exported_by_us: false,
        }
    }

    fn pin_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn value_path(&self) -> PathBuf {
        self.pin_dir().join("value")
    }

    fn setup_error(&self, source: std::io::Error) -> SensorFault {
        SensorFault::SetupFailed {
            pin: self.pin,
            source,
        }
    }

    fn parse_value(&self, raw: &str) -> Result<bool, SensorFault> {
        let level = match raw.trim() {
            "0" => false,
            "1" => true,
            other => {
                return Err(SensorFault::InvalidValue {
                    pin: self.pin,
                    value: other.to_string(),
                });
            }
        };
        Ok(level ^ self.invert)
    }
}

impl SensorLine for SysfsLine {
    fn setup(&mut self) -> Result<(), SensorFault> {
        if !self.pin_dir().exists() {
            fs::write(self.root.join("export"), self.pin.to_string())
                .map_err(|e| self.setup_error(e))?;
            self.exported_by_us = true;
            debug!("[Sensor] Exported GPIO {}", self.pin);
        }

        fs::write(self.pin_dir().join("direction"), "in").map_err(|e| self.setup_error(e))?;

        info!(
            "[Sensor] GPIO {} configured as input{}",
            self.pin,
            if self.invert { " (inverted)" } else { "" }
        );
        Ok(())
    }

    fn read_line(&mut self) -> Result<bool, SensorFault> {
        let raw = fs::read_to_string(self.value_path()).map_err(|source| {
            SensorFault::ReadFailed {
                pin: self.pin,
                source,
            }
        })?;
        self.parse_value(&raw)
    }

    fn teardown(&mut self) {
        if !self.exported_by_us {
            return;
        }
        match fs::write(self.root.join("unexport"), self.pin.to_string()) {
            Ok(()) => {
                self.exported_by_us = false;
                info!("[Sensor] Released GPIO {}", self.pin);
            }
            Err(e) => warn!("[Sensor] Failed to unexport GPIO {}: {}", self.pin, e),
        }
    }

    fn describe(&self) -> String {
        format!("sysfs GPIO {} at {}", self.pin, self.root.display())
    }
}
