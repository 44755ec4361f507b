//! Authoritative connection state and the observations that mutate it.
//!
//! [`ConnectionState`] is the set of devices currently believed connected.
//! Both state sources feed it [`Observation`]s; only observations that flip
//! membership produce a [`TransitionKind`], so duplicate reports from the
//! poller and the event feed collapse into a single transition.

use std::collections::HashSet;

use chrono::{DateTime, Local};
use smol_str::SmolStr;

use crate::bluetooth::address::DeviceAddress;

/// Full point-in-time set of connected devices.
pub type Snapshot = HashSet<DeviceAddress>;

/// Where an observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Source {
   Poll,
   Event,
}

/// A single-device state assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
   pub address: DeviceAddress,
   pub is_connected: bool,
   pub source: Source,
}

impl Observation {
   pub const fn new(address: DeviceAddress, is_connected: bool, source: Source) -> Self {
      Self {
         address,
         is_connected,
         source,
      }
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionKind {
   Connected,
   Disconnected,
}

/// A de-duplicated state change, carrying the resolved display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
   pub address: DeviceAddress,
   pub name: SmolStr,
   pub kind: TransitionKind,
   pub timestamp: DateTime<Local>,
}

impl Transition {
   pub fn new(address: DeviceAddress, name: SmolStr, kind: TransitionKind) -> Self {
      Self {
         address,
         name,
         kind,
         timestamp: Local::now(),
      }
   }
}

#[derive(Debug, Default)]
pub struct ConnectionState {
   connected: HashSet<DeviceAddress>,
}

impl ConnectionState {
   pub const fn seeded(snapshot: Snapshot) -> Self {
      Self { connected: snapshot }
   }

   pub fn contains(&self, address: &DeviceAddress) -> bool {
      self.connected.contains(address)
   }

   pub fn len(&self) -> usize {
      self.connected.len()
   }

   /// Connected addresses in a stable order.
   pub fn addresses(&self) -> Vec<DeviceAddress> {
      let mut addresses: Vec<_> = self.connected.iter().cloned().collect();
      addresses.sort();
      addresses
   }

   /// Applies an observation, returning the transition it caused, if any.
   pub fn apply(&mut self, observation: &Observation) -> Option<TransitionKind> {
      if observation.is_connected {
         self
            .connected
            .insert(observation.address.clone())
            .then_some(TransitionKind::Connected)
      } else {
         self
            .connected
            .remove(&observation.address)
            .then_some(TransitionKind::Disconnected)
      }
   }

   /// Observations that would bring this state in line with `snapshot`:
   /// newly connected devices first, then the ones that went away.
   pub fn diff(&self, snapshot: &Snapshot) -> Vec<Observation> {
      let mut appeared: Vec<_> = snapshot.difference(&self.connected).cloned().collect();
      let mut vanished: Vec<_> = self.connected.difference(snapshot).cloned().collect();
      appeared.sort();
      vanished.sort();

      appeared
         .into_iter()
         .map(|address| Observation::new(address, true, Source::Poll))
         .chain(
            vanished
               .into_iter()
               .map(|address| Observation::new(address, false, Source::Poll)),
         )
         .collect()
   }
}
