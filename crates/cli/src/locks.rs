//! Lock file that keeps two daemons out of the same destination

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Lock file name inside the destination root
pub const LOCK_FILE_NAME: &str = ".keepsake.lock";

/// Exclusive hold on a destination root
pub struct DestinationLock {
    path: PathBuf,
    _file: File,
}

/// Lock file content
#[derive(Debug, Serialize, Deserialize)]
struct LockContent {
    pid: u32,
    started_at: u64,
}

impl DestinationLock {
    /// Acquire the lock for `destination_root`
    ///
    /// Returns error if:
    /// - Another live process holds the lock
    /// - The lock file cannot be created
    pub fn acquire(destination_root: &Path) -> Result<Self> {
        let lock_path = destination_root.join(LOCK_FILE_NAME);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

        if !try_flock_exclusive(&file)? {
            let holder = Self::read_lock_content(&mut file)
                .map(|c| format!("pid {}", c.pid))
                .unwrap_or_else(|_| "another process".to_string());
            anyhow::bail!(
                "Destination {} is already in use by {}",
                destination_root.display(),
                holder
            );
        }

        // Content outlives a crash; the flock does not
        if let Ok(previous) = Self::read_lock_content(&mut file) {
            if previous.pid != std::process::id() {
                if is_process_alive(previous.pid) {
                    anyhow::bail!(
                        "Destination {} is already in use by pid {}",
                        destination_root.display(),
                        previous.pid
                    );
                }
                warn!(pid = previous.pid, "reclaiming stale destination lock");
            }
        }

        Self::write_lock_content(&mut file)?;

        Ok(Self {
            path: lock_path,
            _file: file,
        })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write lock content (PID + timestamp)
    fn write_lock_content(file: &mut File) -> Result<()> {
        let content = LockContent {
            pid: std::process::id(),
            started_at: current_timestamp_ms(),
        };

        let serialized =
            serde_json::to_string(&content).context("Failed to serialize lock content")?;

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serialized.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Read lock content from file
    fn read_lock_content(file: &mut File) -> Result<LockContent> {
        file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let content: LockContent =
            serde_json::from_str(&contents).context("Failed to deserialize lock content")?;
        Ok(content)
    }
}

impl Drop for DestinationLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Try to acquire exclusive file lock (non-blocking)
#[cfg(unix)]
fn try_flock_exclusive(file: &File) -> Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn try_flock_exclusive(_file: &File) -> Result<bool> {
    // Only the pid check applies here
    Ok(true)
}

/// Check if process is alive
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // Null signal: checks existence without delivering anything
    match kill(Pid::from_raw(raw), None::<Signal>) {
        Ok(_) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true, // EPERM: exists, owned by someone else
    }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    // Conservative: assume process is alive on unknown platforms
    true
}

/// Get current timestamp in milliseconds
fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
