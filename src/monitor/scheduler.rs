//! Delayed lock action for the watched device.
//!
//! A disconnect of the watched device arms a single-shot timer; a reconnect
//! before it elapses disarms it. At most one timer is ever pending: arming
//! again replaces the previous one instead of stacking a second firing.

use std::{
   mem,
   path::{Path, PathBuf},
   process::Stdio,
   sync::Arc,
   time::Duration,
};

use log::{debug, error, info};
use tokio::{
   process::Command,
   task::JoinHandle,
   time::{self, Instant},
};

use crate::{
   bluetooth::address::DeviceAddress,
   error::{MonitorError, Result},
   event::{EventSender, MonitorEvent},
   monitor::state::{Transition, TransitionKind},
};

/// Something to run once the lock delay elapses.
pub trait LockAction: Send + Sync {
   fn invoke(&self) -> Result<()>;
}

/// Type alias for a shareable lock action.
pub type ActionRef = Arc<dyn LockAction>;

/// Runs an executable in the background, without waiting for it.
#[derive(Debug, Clone)]
pub struct ScriptAction {
   path: PathBuf,
}

impl ScriptAction {
   pub fn new(path: impl Into<PathBuf>) -> Self {
      Self { path: path.into() }
   }

   pub fn path(&self) -> &Path {
      &self.path
   }

   pub fn exists(&self) -> bool {
      self.path.exists()
   }

   pub fn is_executable(&self) -> bool {
      is_executable(&self.path)
   }

   /// A bare file name refers to the working directory, not `$PATH`.
   fn program(&self) -> PathBuf {
      if self.path.components().count() == 1 && self.path.is_relative() {
         Path::new(".").join(&self.path)
      } else {
         self.path.clone()
      }
   }
}

impl LockAction for ScriptAction {
   fn invoke(&self) -> Result<()> {
      if !self.is_executable() {
         return Err(MonitorError::ActionNotExecutable(self.path.clone()));
      }

      let child = Command::new(self.program())
         .stdin(Stdio::null())
         .stdout(Stdio::null())
         .stderr(Stdio::null())
         .spawn()?;
      debug!("Lock script started (pid {:?})", child.id());
      Ok(())
   }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
   use std::os::unix::fs::PermissionsExt;

   path
      .metadata()
      .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
   path.is_file()
}

#[derive(Debug, Default)]
enum TimerState {
   #[default]
   Idle,
   Armed {
      fire_at: Instant,
      handle: JoinHandle<()>,
   },
}

/// Arms and disarms the lock timer for one watched address.
pub struct LockScheduler {
   watched: DeviceAddress,
   delay: Duration,
   action: ActionRef,
   events: EventSender,
   state: TimerState,
}

impl LockScheduler {
   pub fn new(
      watched: DeviceAddress,
      delay: Duration,
      action: ActionRef,
      events: EventSender,
   ) -> Self {
      Self {
         watched,
         delay,
         action,
         events,
         state: TimerState::Idle,
      }
   }

   pub const fn watched(&self) -> &DeviceAddress {
      &self.watched
   }

   /// Reacts to a transition; transitions for other devices are ignored.
   pub fn on_transition(&mut self, transition: &Transition) {
      if transition.address != self.watched {
         return;
      }
      match transition.kind {
         TransitionKind::Connected => {
            self.cancel();
         },
         TransitionKind::Disconnected => self.arm(),
      }
   }

   /// Schedules the action `delay` from now, replacing any pending timer.
   pub fn arm(&mut self) {
      self.abort_pending();

      let Some(fire_at) = Instant::now().checked_add(self.delay) else {
         let message = format!("Lock delay of {}s is out of range", self.delay.as_secs());
         error!("{message}");
         self.events.emit(MonitorEvent::error(message));
         return;
      };
      let action = Arc::clone(&self.action);
      let events = Arc::clone(&self.events);
      let watched = self.watched.clone();

      // No await point follows the sleep, so once the action starts an
      // abort can no longer interrupt it.
      let handle = tokio::spawn(async move {
         time::sleep_until(fire_at).await;
         info!("Running lock action for {watched}");
         match action.invoke() {
            Ok(()) => info!("Lock action executed successfully"),
            Err(e) => {
               error!("Failed to run lock action: {e}");
               events.emit(MonitorEvent::error(e));
            },
         }
      });

      self.state = TimerState::Armed { fire_at, handle };
      info!("Lock scheduled in {} seconds", self.delay.as_secs());
   }

   /// Disarms a pending timer. Returns false if nothing was pending.
   pub fn cancel(&mut self) -> bool {
      let cancelled = self.abort_pending();
      if cancelled {
         info!("Lock execution cancelled");
      }
      cancelled
   }

   pub fn is_armed(&self) -> bool {
      matches!(&self.state, TimerState::Armed { handle, .. } if !handle.is_finished())
   }

   pub fn fire_at(&self) -> Option<Instant> {
      match &self.state {
         TimerState::Armed { fire_at, .. } if self.is_armed() => Some(*fire_at),
         _ => None,
      }
   }

   fn abort_pending(&mut self) -> bool {
      match mem::take(&mut self.state) {
         TimerState::Armed { handle, .. } if !handle.is_finished() => {
            handle.abort();
            true
         },
         _ => false,
      }
   }
}

impl Drop for LockScheduler {
   fn drop(&mut self) {
      self.abort_pending();
   }
}
