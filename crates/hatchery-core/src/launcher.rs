//! Process launching: the spawn seam between the pool and the OS.
//!
//! This module owns an intentional OS boundary (process detachment); each
//! unsafe block documents its invariant with `SAFETY:`.
#![allow(unsafe_code)]

use crate::error::{HatcheryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::{Command, Stdio};
use tracing::{debug, error};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

/// Options attached to a spawn request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpawnOptions {
    /// Extra arguments appended to the command line.
    pub args: Vec<String>,
    /// Environment variables to set for the child.
    pub env: HashMap<String, String>,
    /// Startup-notification token. Its presence marks a re-invocation that
    /// must never be served from a pool.
    pub startup_id: Option<String>,
    /// Opaque caller metadata, echoed back in the launch ticket.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SpawnOptions {
    /// Create empty options: no extra arguments, no startup token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an extra argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the startup-notification token.
    pub fn with_startup_id(mut self, id: impl Into<String>) -> Self {
        self.startup_id = Some(id.into());
        self
    }

    /// Attach opaque caller metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Result of a successful launch.
#[derive(Debug, Clone)]
pub struct LaunchTicket {
    /// OS-assigned process identifier.
    pub pid: u32,
    /// Launch metadata echoed from the spawn options.
    pub metadata: serde_json::Value,
}

/// The external launch facility, seen through a thin adapter.
///
/// Implementations return the new process identifier together with the
/// caller-supplied launch metadata; a failure propagates unchanged to
/// whoever requested the spawn.
pub trait Launcher: Send + Sync {
    /// Launch `command` with the given options.
    fn launch(&self, command: &str, options: &SpawnOptions) -> Result<LaunchTicket>;
}

/// Launcher that spawns detached OS processes with null stdio.
///
/// The command string is split on whitespace; the first token is the program,
/// the rest are arguments, followed by `SpawnOptions::args`. A startup token
/// is exported to the child as `DESKTOP_STARTUP_ID`.
pub struct CommandLauncher;

impl CommandLauncher {
    /// Create a new command launcher.
    pub fn new() -> Self {
        Self
    }
}

impl Default for CommandLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher for CommandLauncher {
    fn launch(&self, command: &str, options: &SpawnOptions) -> Result<LaunchTicket> {
        let mut parts = command.split_whitespace();
        let program = match parts.next() {
            Some(p) => p,
            None => {
                return Err(HatcheryError::LaunchFailed {
                    command: command.to_string(),
                    message: "empty command".to_string(),
                })
            }
        };

        let mut cmd = Command::new(program);
        cmd.args(parts);
        cmd.args(&options.args);
        for (key, value) in &options.env {
            cmd.env(key, value);
        }
        if let Some(ref token) = options.startup_id {
            cmd.env("DESKTOP_STARTUP_ID", token);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        // Detach the child so it runs independently of us.
        #[cfg(unix)]
        {
            // SAFETY: setsid() is async-signal-safe and only detaches the
            // child into its own session; no memory is shared with the
            // parent at this point.
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        #[cfg(windows)]
        {
            // CREATE_NEW_PROCESS_GROUP detaches the process on Windows
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to spawn {}: {}", program, e);
                return Err(HatcheryError::LaunchFailed {
                    command: command.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let pid = child.id();
        debug!("Launched {} with PID {}", program, pid);

        Ok(LaunchTicket {
            pid,
            metadata: options.metadata.clone(),
        })
    }
}
