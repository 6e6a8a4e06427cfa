use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Get the local data directory for Stay On Track.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("stayontrack");
    Ok(path)
}

/// Path of the control socket inside the data directory
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_socket_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("sot.sock"))
}

/// Bounded retry: `attempts` tries in total, `backoff` between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

/// Delays that drive the policy machine and the host loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyTiming {
    /// Grace before closing an off-topic tab found by a full scan
    pub scan_closure_delay: Duration,
    /// Grace before closing an off-topic tab the user just navigated to
    pub live_closure_delay: Duration,
    pub warning_retry: RetryPolicy,
    /// Wait after restoring a saved session before scanning, so content scripts are loaded
    pub restore_scan_delay: Duration,
    pub scan_interval: Duration,
    /// How long a request to the browser waits for its reply
    pub reply_timeout: Duration,
}

impl Default for PolicyTiming {
    fn default() -> Self {
        Self {
            scan_closure_delay: Duration::from_secs(3),
            live_closure_delay: Duration::from_secs(6),
            warning_retry: RetryPolicy {
                attempts: 2,
                backoff: Duration::from_millis(500),
            },
            restore_scan_delay: Duration::from_secs(2),
            scan_interval: Duration::from_secs(30),
            reply_timeout: Duration::from_secs(2),
        }
    }
}
