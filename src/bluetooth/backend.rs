//! Interface to the external Bluetooth stack.

use std::{future::Future, io};

use futures::stream::BoxStream;
use smol_str::SmolStr;

use crate::{bluetooth::address::DeviceAddress, error::Result};

/// Stream of human-readable lines describing Bluetooth stack activity.
///
/// Dropping the stream releases whatever produces it.
pub type LineStream = BoxStream<'static, io::Result<String>>;

/// Queries the monitor needs from the Bluetooth stack.
///
/// Implementations do not enforce timeouts themselves: callers wrap each
/// request in `tokio::time::timeout`, and a dropped request must not leak
/// work in the background.
pub trait BluetoothBackend: Send + Sync + 'static {
   /// Lists the addresses of every currently connected device.
   fn connected_devices(&self) -> impl Future<Output = Result<Vec<DeviceAddress>>> + Send;

   /// Looks up the friendly name of a device, `None` if it has none.
   fn device_name(
      &self,
      address: &DeviceAddress,
   ) -> impl Future<Output = Result<Option<SmolStr>>> + Send;

   /// Opens the live event stream.
   fn open_feed(&self) -> impl Future<Output = Result<LineStream>> + Send;
}
