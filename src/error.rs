//! Error types for the Bluetooth monitor.
//!
//! This module defines all error types that can occur while querying the
//! Bluetooth stack, reading configuration, or invoking the lock action.

use std::{path::PathBuf, process::ExitStatus};

use thiserror::Error;

/// Main error type for the monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("{0} not found. Please install bluez package.")]
   ToolNotFound(&'static str),

   #[error("`{command}` exited with {status}")]
   CommandFailed {
      command: String,
      status: ExitStatus,
   },

   #[error("Request timeout")]
   RequestTimeout,

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("Config file not found: {}", .0.display())]
   ConfigNotFound(PathBuf),

   #[error("Invalid configuration: {0}")]
   InvalidConfig(String),

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),

   #[error("Monitor has been shut down")]
   ManagerShutdown,

   #[error("Lock script {} not found or not executable", .0.display())]
   ActionNotExecutable(PathBuf),

   #[error("Event feed closed")]
   FeedClosed,
}

/// Convenience type alias for Results with `MonitorError`.
pub type Result<T> = std::result::Result<T, MonitorError>;
