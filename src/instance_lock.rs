//! Single instance lock using Unix socket.
//!
//! Two servers polling the same GPIO line would fight over export and
//! unexport, so the binary takes a lock named after the line before it
//! starts. A Unix socket is used because the OS drops it when the process
//! dies, which avoids stale lock files.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstanceLockError {
    #[error("another instance already holds {0}")]
    AlreadyRunning(String),

    #[error("failed to acquire instance lock: {0}")]
    Io(#[from] io::Error),
}

/// Held for as long as the value lives; the socket file is removed on drop.
pub struct InstanceLock {
    _listener: UnixListener,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock called `name`.
    pub fn acquire(name: &str) -> Result<Self, InstanceLockError> {
        let path = Self::socket_path(name);

        if path.exists() {
            // A live owner accepts the connection; a stale file refuses it
            if UnixStream::connect(&path).is_ok() {
                return Err(InstanceLockError::AlreadyRunning(name.to_string()));
            }
            let _ = std::fs::remove_file(&path);
        }

        match UnixListener::bind(&path) {
            Ok(listener) => Ok(Self {
                _listener: listener,
                path,
            }),
            // Another instance bound between our check and bind
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                Err(InstanceLockError::AlreadyRunning(name.to_string()))
            }
            Err(e) => Err(InstanceLockError::Io(e)),
        }
    }

    /// Socket path for a lock name, in the user's runtime dir or `/tmp`.
    pub fn socket_path(name: &str) -> PathBuf {
        dirs::runtime_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(format!("contact-sentry-{name}.sock"))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name() -> String {
        format!("test-{}", uuid::Uuid::new_v4().simple())
    }

    #[test]
    fn test_socket_path_includes_name() {
        let path = InstanceLock::socket_path("gpio18");
        assert!(path.ends_with("contact-sentry-gpio18.sock"));
    }

    #[test]
    fn test_second_acquire_fails() {
        let name = unique_name();
        let lock = InstanceLock::acquire(&name).unwrap();
        assert!(lock.path().exists());

        let second = InstanceLock::acquire(&name);
        assert!(matches!(second, Err(InstanceLockError::AlreadyRunning(_))));

        drop(lock);
        let again = InstanceLock::acquire(&name).unwrap();
        drop(again);
    }

    #[test]
    fn test_stale_socket_is_replaced() {
        let name = unique_name();
        let path = InstanceLock::socket_path(&name);
        {
            // Bind and drop the listener without removing the file
            let listener = UnixListener::bind(&path).unwrap();
            drop(listener);
        }
        assert!(path.exists());

        let lock = InstanceLock::acquire(&name).unwrap();
        assert_eq!(lock.path(), &path);
    }
}
