//! User-facing record stream.
//!
//! Every connection state change, the initial device listing and
//! non-fatal errors are published as [`MonitorEvent`]s. Their `Display`
//! form is the line-oriented output format of the monitor.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Local};

use crate::monitor::{
   directory::DeviceRecord,
   state::{Transition, TransitionKind},
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
   Initial,
   Connected,
   Disconnected,
   Error,
}

/// Events that can be emitted by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
   Initial {
      device: DeviceRecord,
      timestamp: DateTime<Local>,
   },
   Transition(Transition),
   Error {
      message: String,
      timestamp: DateTime<Local>,
   },
}

impl MonitorEvent {
   pub fn initial(device: DeviceRecord) -> Self {
      Self::Initial {
         device,
         timestamp: Local::now(),
      }
   }

   pub fn error(message: impl fmt::Display) -> Self {
      Self::Error {
         message: message.to_string(),
         timestamp: Local::now(),
      }
   }

   pub const fn kind(&self) -> RecordKind {
      match self {
         Self::Initial { .. } => RecordKind::Initial,
         Self::Transition(t) => match t.kind {
            TransitionKind::Connected => RecordKind::Connected,
            TransitionKind::Disconnected => RecordKind::Disconnected,
         },
         Self::Error { .. } => RecordKind::Error,
      }
   }

   pub const fn timestamp(&self) -> &DateTime<Local> {
      match self {
         Self::Initial { timestamp, .. } | Self::Error { timestamp, .. } => timestamp,
         Self::Transition(t) => &t.timestamp,
      }
   }
}

impl fmt::Display for MonitorEvent {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let timestamp = self.timestamp().format(TIMESTAMP_FORMAT);
      let kind = self.kind();
      match self {
         Self::Initial { device, .. } => {
            write!(f, "[{timestamp}] {:<12} {}  {}", kind.as_ref(), device.address, device.name)
         },
         Self::Transition(t) => {
            write!(f, "[{timestamp}] {:<12} {}  {}", kind.as_ref(), t.address, t.name)
         },
         Self::Error { message, .. } => write!(f, "[{timestamp}] {kind}: {message}"),
      }
   }
}

/// Trait for implementing event emission.
pub trait EventBus: Send + Sync {
   /// Publishes an event to the output.
   fn emit(&self, event: MonitorEvent);
}

/// Type alias for a thread-safe event sender.
pub type EventSender = Arc<dyn EventBus>;
