use std::time::Duration;
use thiserror::Error as ThisError;

/// Top-level error returned by the server and the binary.
#[derive(ThisError, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    InstanceLock(#[from] crate::instance_lock::InstanceLockError),
}

/// The sensor line could not be set up or read.
///
/// Fatal to the poller: once the line cannot be read, state reporting
/// can no longer be honoured.
#[derive(ThisError, Debug)]
pub enum SensorFault {
    #[error("GPIO {pin} setup failed: {source}")]
    SetupFailed {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("GPIO {pin} read failed: {source}")]
    ReadFailed {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("GPIO {pin} returned unexpected value {value:?}")]
    InvalidValue { pin: u32, value: String },

    #[error("Simulated line fault: {0}")]
    Simulated(String),
}

/// An inbound client payload was rejected.
#[derive(ThisError, Debug)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("key {key} must be a boolean: {source}")]
    InvalidField {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Writing to a single observer failed.
#[derive(ThisError, Debug)]
pub enum BroadcastWriteError {
    #[error("observer connection closed")]
    Closed,

    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error("outbound queue full")]
    QueueFull,
}

pub type Result<T> = std::result::Result<T, ServerError>;
