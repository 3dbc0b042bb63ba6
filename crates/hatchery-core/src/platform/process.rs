//! Platform-specific process liveness and termination.
//!
//! This module owns the OS/FFI boundary for process management; every unsafe
//! block documents its invariant with `SAFETY:`.
#![allow(unsafe_code)]

use crate::error::{HatcheryError, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Check if a process with the given PID is alive.
///
/// # Platform Behavior
/// - **Linux/macOS**: Uses `kill(pid, 0)` signal check
/// - **Windows**: Uses `OpenProcess` with `PROCESS_QUERY_LIMITED_INFORMATION`
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // Signal 0 doesn't actually send a signal, just checks whether the
        // PID resolves to a process we may signal.
        // SAFETY: kill(2) with signal 0 performs no action on the target and
        // is safe to call with any pid value.
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }

    #[cfg(windows)]
    {
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Threading::{
            OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        };

        // SAFETY: OpenProcess with a query-only access right has no side
        // effects; the handle is closed before returning.
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if !handle.is_null() {
                CloseHandle(handle);
                true
            } else {
                false
            }
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!("Process alive check not implemented for this platform");
        true
    }
}

/// Terminate a process gracefully, then forcefully if needed.
///
/// # Platform Behavior
/// - **Linux/macOS**: Sends SIGTERM, waits up to `timeout`, then SIGKILL
/// - **Windows**: Uses `taskkill /PID {pid} /F`
///
/// Returns `true` if the process was terminated (or wasn't running).
pub fn terminate_process(pid: u32, timeout: Duration) -> Result<bool> {
    if !is_process_alive(pid) {
        debug!("Process {} is not running", pid);
        return Ok(true);
    }

    #[cfg(unix)]
    {
        terminate_process_unix(pid, timeout)
    }

    #[cfg(windows)]
    {
        terminate_process_windows(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(HatcheryError::Other(
            "Process termination not implemented for this platform".into(),
        ))
    }
}

#[cfg(unix)]
fn terminate_process_unix(pid: u32, timeout: Duration) -> Result<bool> {
    use nix::sys::signal::{kill, Signal};
    use nix::sys::wait::{waitpid, WaitPidFlag};
    use nix::unistd::Pid;
    use std::thread::sleep;

    let nix_pid = Pid::from_raw(pid as i32);

    // First try SIGTERM (graceful)
    debug!("Sending SIGTERM to process {}", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
        if e == nix::errno::Errno::ESRCH {
            return Ok(true);
        }
        warn!("Failed to send SIGTERM to {}: {}", pid, e);
    }

    // Wait for the process to exit, reaping zombies along the way
    let wait_interval = Duration::from_millis(100);
    let iterations = (timeout.as_millis() as u64 / 100).max(1);

    for _ in 0..iterations {
        sleep(wait_interval);
        let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));
        if !is_process_alive(pid) {
            debug!("Process {} terminated gracefully", pid);
            return Ok(true);
        }
    }

    // Process still running, use SIGKILL
    debug!("Process {} still running, sending SIGKILL", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGKILL) {
        if e == nix::errno::Errno::ESRCH {
            return Ok(true);
        }
        return Err(HatcheryError::KillFailed {
            pid,
            message: e.to_string(),
        });
    }

    // Brief wait, then reap. Without the waitpid the process lingers as a
    // zombie and is_process_alive keeps returning true.
    sleep(Duration::from_millis(100));
    let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));

    Ok(!is_process_alive(pid))
}

#[cfg(windows)]
fn terminate_process_windows(pid: u32) -> Result<bool> {
    use std::process::Command;

    debug!("Terminating process {} with taskkill", pid);

    let output = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .output()
        .map_err(|e| HatcheryError::KillFailed {
            pid,
            message: format!("Failed to run taskkill: {}", e),
        })?;

    if output.status.success() {
        debug!("Process {} terminated successfully", pid);
        Ok(true)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // "not found" errors are OK - process already dead
        if stderr.contains("not found") || stderr.contains("not running") {
            Ok(true)
        } else {
            warn!("taskkill failed for {}: {}", pid, stderr);
            Ok(false)
        }
    }
}
