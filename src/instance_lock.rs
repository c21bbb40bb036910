//! Single instance lock using a Unix socket.
//!
//! Keeps two bridge processes with the same name from serving the same
//! storage and ports. The socket disappears with the process, so a crashed
//! bridge never leaves a stale lock behind.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error types for instance lock operations.
#[derive(Debug, Error)]
pub enum InstanceLockError {
    /// Another bridge with the same name is already running.
    #[error("another bridge instance is already running ({0})")]
    AlreadyRunning(PathBuf),

    #[error("failed to acquire instance lock: {0}")]
    Io(#[from] io::Error),
}

/// Held for the lifetime of the bridge process.
pub struct InstanceLock {
    _listener: UnixListener,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock for a bridge name in the runtime directory.
    pub fn acquire(bridge_name: &str) -> Result<Self, InstanceLockError> {
        let dir = std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from);
        Self::acquire_at(socket_path(dir.as_deref(), bridge_name))
    }

    /// Acquire the lock at an explicit socket path.
    pub fn acquire_at(path: PathBuf) -> Result<Self, InstanceLockError> {
        if path.exists() {
            // A live listener answers; a socket left by a killed process does not
            if UnixStream::connect(&path).is_ok() {
                return Err(InstanceLockError::AlreadyRunning(path));
            }
            let _ = std::fs::remove_file(&path);
        }

        match UnixListener::bind(&path) {
            Ok(listener) => Ok(Self {
                _listener: listener,
                path,
            }),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                Err(InstanceLockError::AlreadyRunning(path))
            }
            Err(e) => Err(InstanceLockError::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Socket path for a bridge name, in `runtime_dir` or `/tmp`.
pub fn socket_path(runtime_dir: Option<&Path>, bridge_name: &str) -> PathBuf {
    let slug: String = bridge_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    runtime_dir
        .unwrap_or_else(|| Path::new("/tmp"))
        .join(format!("plugin-matter-bridge-{}.sock", slug))
}
