//! Platform abstraction layer for cross-platform compatibility.
//!
//! All `#[cfg]` blocks for OS-specific process handling live here rather than
//! scattered throughout the codebase.

pub mod process;

// Re-export commonly used items
pub use process::{is_process_alive, terminate_process};
