//! Device-state reconciliation.
//!
//! This module merges the periodic poll and the live event feed into one
//! view of connected devices, and drives the delayed lock action for the
//! watched device.

pub mod directory;
pub mod feed;
pub mod manager;
pub mod poller;
pub mod scheduler;
pub mod state;
