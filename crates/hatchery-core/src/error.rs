//! Error types for the hatchery crate.
//!
//! Nothing in this subsystem is fatal to the host process: registration
//! conflicts are reported as boolean failures, stale pooled processes are
//! discarded silently, and the worst case is a fallback to a direct launch.

use thiserror::Error;

/// Main error type for hatchery operations.
#[derive(Debug, Error)]
pub enum HatcheryError {
    /// The launcher could not start the requested command. Propagated
    /// unchanged to the caller of a spawn or refill; the pool never retries
    /// on its own.
    #[error("Process launch failed for {command}: {message}")]
    LaunchFailed { command: String, message: String },

    /// A pooled process could not be terminated during pool teardown.
    #[error("Failed to kill process {pid}: {message}")]
    KillFailed { pid: u32, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for hatchery operations.
pub type Result<T> = std::result::Result<T, HatcheryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HatcheryError::LaunchFailed {
            command: "alacritty".into(),
            message: "No such file or directory".into(),
        };
        assert_eq!(
            err.to_string(),
            "Process launch failed for alacritty: No such file or directory"
        );
    }

    #[test]
    fn test_kill_failed_display() {
        let err = HatcheryError::KillFailed {
            pid: 4242,
            message: "EPERM".into(),
        };
        assert_eq!(err.to_string(), "Failed to kill process 4242: EPERM");
    }
}
