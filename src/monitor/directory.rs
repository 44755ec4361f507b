//! Address to friendly-name cache.

use std::{collections::HashMap, time::Duration};

use log::debug;
use smol_str::SmolStr;
use tokio::time;

use crate::bluetooth::{address::DeviceAddress, backend::BluetoothBackend};

/// A device and the name it is displayed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
   pub address: DeviceAddress,
   pub name: SmolStr,
}

/// Memoizes device names.
///
/// The first lookup for an address queries the backend; whatever comes out
/// of it, including the address itself as a stand-in after a failure or
/// timeout, is cached for the lifetime of the process and never re-queried.
#[derive(Debug)]
pub struct DeviceDirectory {
   names: HashMap<DeviceAddress, SmolStr>,
   timeout: Duration,
}

impl DeviceDirectory {
   pub fn new(timeout: Duration) -> Self {
      Self {
         names: HashMap::new(),
         timeout,
      }
   }

   pub async fn resolve<B: BluetoothBackend>(
      &mut self,
      backend: &B,
      address: &DeviceAddress,
   ) -> SmolStr {
      if let Some(name) = self.names.get(address) {
         return name.clone();
      }

      let name = match time::timeout(self.timeout, backend.device_name(address)).await {
         Ok(Ok(Some(name))) => name,
         Ok(Ok(None)) => {
            debug!("No name reported for {address}");
            SmolStr::from(address.as_str())
         },
         Ok(Err(e)) => {
            debug!("Name lookup for {address} failed: {e}");
            SmolStr::from(address.as_str())
         },
         Err(_) => {
            debug!("Name lookup for {address} timed out");
            SmolStr::from(address.as_str())
         },
      };

      self.names.insert(address.clone(), name.clone());
      name
   }

   pub async fn record<B: BluetoothBackend>(
      &mut self,
      backend: &B,
      address: DeviceAddress,
   ) -> DeviceRecord {
      let name = self.resolve(backend, &address).await;
      DeviceRecord { address, name }
   }
}
