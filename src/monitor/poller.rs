//! Full-state polling of connected devices.

use std::time::Duration;

use tokio::time;

use crate::{
   bluetooth::{address::DeviceAddress, backend::BluetoothBackend},
   error::{MonitorError, Result},
   monitor::state::Snapshot,
};

/// Takes snapshots of connected devices, optionally narrowed to one address.
#[derive(Debug, Clone)]
pub struct Poller {
   filter: Option<DeviceAddress>,
   timeout: Duration,
}

impl Poller {
   pub const fn new(filter: Option<DeviceAddress>, timeout: Duration) -> Self {
      Self { filter, timeout }
   }

   pub const fn filter(&self) -> Option<&DeviceAddress> {
      self.filter.as_ref()
   }

   /// Returns true if `address` passes the configured filter.
   pub fn accepts(&self, address: &DeviceAddress) -> bool {
      self.filter.as_ref().is_none_or(|filter| filter == address)
   }

   /// Queries the backend, bounded by the poll timeout.
   ///
   /// A failed or timed-out query is returned as an error and callers must
   /// not treat it as "nothing connected" unless they mean to.
   pub async fn snapshot<B: BluetoothBackend>(&self, backend: &B) -> Result<Snapshot> {
      let devices = time::timeout(self.timeout, backend.connected_devices())
         .await
         .map_err(|_| MonitorError::RequestTimeout)??;

      Ok(devices
         .into_iter()
         .filter(|address| self.accepts(address))
         .collect())
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::testing::FakeBackend;

   const TIMEOUT: Duration = Duration::from_secs(5);

   fn addr(s: &str) -> DeviceAddress {
      s.parse().unwrap()
   }

   #[tokio::test]
   async fn test_snapshot_lists_all_devices() {
      let backend = FakeBackend::new();
      backend.set_connected(&["AA:AA:AA:AA:AA:AA", "BB:BB:BB:BB:BB:BB"]);

      let snapshot = Poller::new(None, TIMEOUT).snapshot(&backend).await.unwrap();
      assert_eq!(snapshot, [addr("AA:AA:AA:AA:AA:AA"), addr("BB:BB:BB:BB:BB:BB")].into());
   }

   #[tokio::test]
   async fn test_snapshot_honors_filter() {
      let backend = FakeBackend::new();
      backend.set_connected(&["AA:AA:AA:AA:AA:AA", "BB:BB:BB:BB:BB:BB"]);
      let poller = Poller::new(Some(addr("BB:BB:BB:BB:BB:BB")), TIMEOUT);

      let snapshot = poller.snapshot(&backend).await.unwrap();
      assert_eq!(snapshot, [addr("BB:BB:BB:BB:BB:BB")].into());

      backend.set_connected(&["AA:AA:AA:AA:AA:AA"]);
      assert!(poller.snapshot(&backend).await.unwrap().is_empty());
   }

   #[tokio::test]
   async fn test_snapshot_surfaces_failure() {
      let backend = FakeBackend::new();
      backend.fail_polls(true);

      let result = Poller::new(None, TIMEOUT).snapshot(&backend).await;
      assert!(result.is_err());
   }

   #[tokio::test(start_paused = true)]
   async fn test_snapshot_times_out() {
      let backend = FakeBackend::new();
      backend.delay_polls(Duration::from_secs(60));

      let result = Poller::new(None, TIMEOUT).snapshot(&backend).await;
      assert!(matches!(result, Err(MonitorError::RequestTimeout)));
   }
}
