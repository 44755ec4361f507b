//! Bluetooth stack access layer.
//!
//! This module provides the address type used as device identity and the
//! backend that queries BlueZ for connected devices, device metadata and
//! the live event stream.

pub mod address;
pub mod backend;
pub mod bluetoothctl;
