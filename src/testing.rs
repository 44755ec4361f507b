//! Test doubles for the Bluetooth backend, the event bus and the lock action.

use std::{
   collections::{HashMap, VecDeque},
   io,
   sync::atomic::{AtomicBool, AtomicUsize, Ordering},
   time::Duration,
};

use futures::{
   StreamExt,
   channel::mpsc::{self, UnboundedSender},
   stream,
};
use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::time;

use crate::{
   bluetooth::{
      address::DeviceAddress,
      backend::{BluetoothBackend, LineStream},
   },
   error::{MonitorError, Result},
   event::{EventBus, MonitorEvent, RecordKind},
   monitor::scheduler::LockAction,
};

/// In-memory Bluetooth stack.
#[derive(Default)]
pub struct FakeBackend {
   connected: Mutex<Vec<DeviceAddress>>,
   names: Mutex<HashMap<DeviceAddress, SmolStr>>,
   feeds: Mutex<VecDeque<LineStream>>,
   poll_delay: Mutex<Option<Duration>>,
   name_delay: Mutex<Option<Duration>>,
   fail_polls: AtomicBool,
   fail_names: AtomicBool,
   name_lookups: AtomicUsize,
   feeds_opened: AtomicUsize,
}

impl FakeBackend {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn set_connected(&self, addresses: &[&str]) {
      *self.connected.lock() = addresses
         .iter()
         .map(|address| address.parse().unwrap())
         .collect();
   }

   pub fn set_name(&self, address: &DeviceAddress, name: &str) {
      self.names.lock().insert(address.clone(), name.into());
   }

   pub fn fail_polls(&self, fail: bool) {
      self.fail_polls.store(fail, Ordering::SeqCst);
   }

   pub fn fail_names(&self, fail: bool) {
      self.fail_names.store(fail, Ordering::SeqCst);
   }

   pub fn delay_polls(&self, delay: Duration) {
      *self.poll_delay.lock() = Some(delay);
   }

   pub fn delay_names(&self, delay: Duration) {
      *self.name_delay.lock() = Some(delay);
   }

   /// Queues a feed for the next `open_feed` call. Closing the returned
   /// sender ends that feed.
   pub fn push_feed(&self) -> UnboundedSender<String> {
      let (tx, rx) = mpsc::unbounded();
      self.feeds.lock().push_back(rx.map(Ok).boxed());
      tx
   }

   pub fn name_lookups(&self) -> usize {
      self.name_lookups.load(Ordering::SeqCst)
   }

   pub fn feeds_opened(&self) -> usize {
      self.feeds_opened.load(Ordering::SeqCst)
   }
}

impl BluetoothBackend for FakeBackend {
   async fn connected_devices(&self) -> Result<Vec<DeviceAddress>> {
      let delay = *self.poll_delay.lock();
      if let Some(delay) = delay {
         time::sleep(delay).await;
      }
      if self.fail_polls.load(Ordering::SeqCst) {
         return Err(MonitorError::Io(io::Error::other("bluetoothd not responding")));
      }
      Ok(self.connected.lock().clone())
   }

   async fn device_name(&self, address: &DeviceAddress) -> Result<Option<SmolStr>> {
      self.name_lookups.fetch_add(1, Ordering::SeqCst);
      let delay = *self.name_delay.lock();
      if let Some(delay) = delay {
         time::sleep(delay).await;
      }
      if self.fail_names.load(Ordering::SeqCst) {
         return Err(MonitorError::RequestTimeout);
      }
      Ok(self.names.lock().get(address).cloned())
   }

   async fn open_feed(&self) -> Result<LineStream> {
      self.feeds_opened.fetch_add(1, Ordering::SeqCst);
      let feed = self.feeds.lock().pop_front();
      Ok(feed.unwrap_or_else(|| stream::pending().boxed()))
   }
}

/// Event bus that keeps everything it is given.
#[derive(Default)]
pub struct RecordingBus {
   events: Mutex<Vec<MonitorEvent>>,
}

impl RecordingBus {
   pub fn len(&self) -> usize {
      self.events.lock().len()
   }

   pub fn count(&self, kind: RecordKind) -> usize {
      self.events.lock().iter().filter(|e| e.kind() == kind).count()
   }

   /// Address and name of every device record of `kind`, in order.
   pub fn records_of(&self, kind: RecordKind) -> Vec<(DeviceAddress, SmolStr)> {
      self
         .events
         .lock()
         .iter()
         .filter(|e| e.kind() == kind)
         .filter_map(|e| match e {
            MonitorEvent::Initial { device, .. } => Some((device.address.clone(), device.name.clone())),
            MonitorEvent::Transition(t) => Some((t.address.clone(), t.name.clone())),
            MonitorEvent::Error { .. } => None,
         })
         .collect()
   }
}

impl EventBus for RecordingBus {
   fn emit(&self, event: MonitorEvent) {
      self.events.lock().push(event);
   }
}

/// Lock action that only counts its invocations.
#[derive(Default)]
pub struct CountingAction {
   fired: AtomicUsize,
   fail: bool,
}

impl CountingAction {
   pub fn failing() -> Self {
      Self {
         fired: AtomicUsize::new(0),
         fail: true,
      }
   }

   pub fn fired(&self) -> usize {
      self.fired.load(Ordering::SeqCst)
   }
}

impl LockAction for CountingAction {
   fn invoke(&self) -> Result<()> {
      self.fired.fetch_add(1, Ordering::SeqCst);
      if self.fail {
         return Err(MonitorError::ActionNotExecutable("lock_screen.sh".into()));
      }
      Ok(())
   }
}
