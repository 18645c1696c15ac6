use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

fn load_dotenv_from(env_path: &Path) {
    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: We're single-threaded at this point (called before any async runtime)
            unsafe { std::env::set_var(key, value) };
        }
    }
}

/// Parse `KEY=value` lines, skipping blanks and comments.
fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Find the first '=' and split there
        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            // Remove surrounding quotes if present
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            pairs.push((key, value));
        }
    }

    pairs
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub sensor: SensorConfig,
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// WebSocket route observers connect to.
    pub ws_path: String,
    /// Let clients overwrite `open` through `DEVICE_OPEN`.
    pub accept_client_open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorBackend {
    Sysfs,
    Simulated,
}

impl SensorBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "sysfs" | "gpio" => Some(Self::Sysfs),
            "simulated" | "sim" => Some(Self::Simulated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub backend: SensorBackend,
    /// Kernel GPIO number (BCM numbering on a Raspberry Pi).
    pub gpio_pin: u32,
    pub sysfs_root: PathBuf,
    /// Report a low line as open.
    pub invert: bool,
    pub poll_interval_ms: u64,
    /// Simulated backend only: flip the line every N reads (0 = never).
    pub simulated_toggle_every: u32,
}

impl SensorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Upper bound on a single observer write.
    pub write_timeout_ms: u64,
    /// Outbound messages buffered per observer; further messages for that
    /// observer are dropped until it catches up.
    pub outbound_queue: usize,
}

impl BroadcastConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8888,
                ws_path: "/".to_string(),
                accept_client_open: false,
            },
            sensor: SensorConfig {
                backend: SensorBackend::Sysfs,
                // Physical board pin 12
                gpio_pin: 18,
                sysfs_root: PathBuf::from("/sys/class/gpio"),
                invert: false,
                poll_interval_ms: 300,
                simulated_toggle_every: 10,
            },
            broadcast: BroadcastConfig {
                write_timeout_ms: 2000,
                outbound_queue: 32,
            },
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Unparseable
    /// values are ignored and the default is kept.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Server
        if let Some(addr) = lookup("BIND_ADDRESS") {
            config.server.bind_address = addr;
        }
        if let Some(port) = lookup("SERVER_PORT")
            && let Ok(p) = port.parse()
        {
            config.server.port = p;
        }
        if let Some(path) = lookup("WS_PATH") {
            config.server.ws_path = path;
        }
        if let Some(flag) = lookup("ACCEPT_CLIENT_OPEN")
            && let Some(f) = parse_flag(&flag)
        {
            config.server.accept_client_open = f;
        }

        // Sensor line
        if let Some(backend) = lookup("SENSOR_BACKEND")
            && let Some(b) = SensorBackend::parse(&backend)
        {
            config.sensor.backend = b;
        }
        if let Some(pin) = lookup("GPIO_PIN")
            && let Ok(p) = pin.parse()
        {
            config.sensor.gpio_pin = p;
        }
        if let Some(root) = lookup("GPIO_SYSFS_ROOT") {
            config.sensor.sysfs_root = PathBuf::from(root);
        }
        if let Some(flag) = lookup("SENSOR_INVERT")
            && let Some(f) = parse_flag(&flag)
        {
            config.sensor.invert = f;
        }
        if let Some(ms) = lookup("POLL_INTERVAL_MS")
            && let Ok(v) = ms.parse::<u64>()
            && v > 0
        {
            config.sensor.poll_interval_ms = v;
        }
        if let Some(n) = lookup("SIM_TOGGLE_EVERY")
            && let Ok(v) = n.parse()
        {
            config.sensor.simulated_toggle_every = v;
        }

        // Broadcast
        if let Some(ms) = lookup("WRITE_TIMEOUT_MS")
            && let Ok(v) = ms.parse::<u64>()
            && v > 0
        {
            config.broadcast.write_timeout_ms = v;
        }
        if let Some(n) = lookup("OUTBOUND_QUEUE")
            && let Ok(v) = n.parse::<usize>()
            && v > 0
        {
            config.broadcast.outbound_queue = v;
        }

        config
    }
}
