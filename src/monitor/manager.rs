//! Reconciliation engine and task supervision.
//!
//! A single actor task owns the authoritative connection state, the name
//! directory and the lock scheduler. The periodic poll, the event feed and
//! handle requests all reach that state through the actor's loop, so every
//! mutation is serialized without a shared lock.

use std::{sync::Arc, time::Duration};

use log::{debug, error, info, warn};
use tokio::{
   select,
   sync::{mpsc, oneshot},
   task::JoinHandle,
   time::{self, Instant, MissedTickBehavior},
};

use crate::{
   bluetooth::{address::DeviceAddress, backend::BluetoothBackend},
   config::Config,
   error::{MonitorError, Result},
   event::{EventSender, MonitorEvent},
   monitor::{
      directory::DeviceDirectory,
      feed,
      poller::Poller,
      scheduler::{ActionRef, LockScheduler},
      state::{ConnectionState, Observation, Snapshot, Transition},
   },
};

/// Channel buffer size
const CHANNEL_BUFFER_SIZE: usize = 1000;
/// Time given to the feed task to wind down on shutdown
const FEED_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// === Commands ===

#[derive(Debug)]
enum ManagerCommand {
   // Feed supervision
   FeedEnded(Result<()>),
   RestartFeed,

   // User commands
   Refresh(oneshot::Sender<Result<()>>),
   GetConnected(oneshot::Sender<Vec<DeviceAddress>>),
   GetLockDeadline(oneshot::Sender<Option<Instant>>),
   Shutdown(oneshot::Sender<()>),
}

// === Handle ===

/// Handle to the running monitor.
///
/// Dropping every handle stops the monitor as if [`shutdown`] was called.
///
/// [`shutdown`]: MonitorManager::shutdown
pub struct MonitorManager {
   inbox: mpsc::Sender<ManagerCommand>,
}

impl MonitorManager {
   /// Starts the monitor: seeds state from an initial poll, then runs the
   /// event feed and the periodic poll until shut down.
   ///
   /// Fails without starting anything if `config` does not validate.
   pub fn spawn<B: BluetoothBackend>(
      backend: Arc<B>,
      config: &Config,
      events: EventSender,
      action: ActionRef,
   ) -> Result<Self> {
      config.validate()?;
      let (command_tx, command_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      tokio::spawn(ManagerActor::new(backend, config, events, action, command_rx).run());
      Ok(Self { inbox: command_tx })
   }

   /// Resolves once the monitor task has exited, for whatever reason.
   pub async fn closed(&self) {
      self.inbox.closed().await;
   }

   /// Polls immediately instead of waiting for the next interval.
   pub async fn refresh(&self) -> Result<()> {
      let (tx, rx) = oneshot::channel();
      self
         .inbox
         .send(ManagerCommand::Refresh(tx))
         .await
         .map_err(|_| MonitorError::ManagerShutdown)?;
      rx.await.map_err(|_| MonitorError::ManagerShutdown)?
   }

   pub async fn connected_devices(&self) -> Vec<DeviceAddress> {
      let (tx, rx) = oneshot::channel();
      if self
         .inbox
         .send(ManagerCommand::GetConnected(tx))
         .await
         .is_err()
      {
         return Vec::new();
      }
      rx.await.unwrap_or_default()
   }

   /// When the pending lock fires, `None` if no lock is armed.
   pub async fn lock_deadline(&self) -> Option<Instant> {
      let (tx, rx) = oneshot::channel();
      self
         .inbox
         .send(ManagerCommand::GetLockDeadline(tx))
         .await
         .ok()?;
      rx.await.ok().flatten()
   }

   /// Stops polling, cancels the event feed and disarms a pending lock
   /// without running it. Resolves once cleanup is done.
   pub async fn shutdown(&self) -> Result<()> {
      let (tx, rx) = oneshot::channel();
      self
         .inbox
         .send(ManagerCommand::Shutdown(tx))
         .await
         .map_err(|_| MonitorError::ManagerShutdown)?;
      rx.await.map_err(|_| MonitorError::ManagerShutdown)
   }
}

// === Actor ===

struct ManagerActor<B> {
   backend: Arc<B>,
   events: EventSender,
   command_rx: mpsc::Receiver<ManagerCommand>,
   loopback_rx: mpsc::Receiver<ManagerCommand>,
   loopback_tx: mpsc::Sender<ManagerCommand>,
   observation_rx: mpsc::Receiver<Observation>,
   observation_tx: mpsc::Sender<Observation>,
   poll_interval: Duration,
   feed_restart_delay: Duration,

   // State
   poller: Poller,
   directory: DeviceDirectory,
   state: ConnectionState,
   scheduler: Option<LockScheduler>,
   feed_handle: Option<JoinHandle<()>>,
   shutdown_reply: Option<oneshot::Sender<()>>,
}

impl<B: BluetoothBackend> ManagerActor<B> {
   fn new(
      backend: Arc<B>,
      config: &Config,
      events: EventSender,
      action: ActionRef,
      command_rx: mpsc::Receiver<ManagerCommand>,
   ) -> Self {
      let (loopback_tx, loopback_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      let (observation_tx, observation_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
      let scheduler = config.lock_address.clone().map(|watched| {
         LockScheduler::new(watched, config.lock_delay(), action, Arc::clone(&events))
      });

      Self {
         backend,
         events,
         command_rx,
         loopback_rx,
         loopback_tx,
         observation_rx,
         observation_tx,
         poll_interval: config.poll_interval(),
         feed_restart_delay: config.feed_restart_delay(),
         poller: Poller::new(config.filter_address.clone(), config.query_timeout()),
         directory: DeviceDirectory::new(config.name_timeout()),
         state: ConnectionState::default(),
         scheduler,
         feed_handle: None,
         shutdown_reply: None,
      }
   }

   async fn run(mut self) {
      match self.poller.filter() {
         Some(filter) => info!("Monitor starting up, filtering for device: {filter}"),
         None => info!("Monitor starting up, watching all Bluetooth devices"),
      }

      self.seed().await;
      self.feed_handle = Some(self.start_feed());

      // The initial poll already happened; the first periodic one waits a
      // full interval.
      let mut poll_interval =
         time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
      poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

      loop {
         select! {
             _ = poll_interval.tick() => {
                 let _ = self.poll().await;
             }
             Some(observation) = self.observation_rx.recv() => {
                 self.handle_observation(observation).await;
             }
             cmd = self.command_rx.recv() => {
                 let Some(cmd) = cmd else {
                     info!("All monitor handles dropped");
                     break;
                 };
                 if !self.handle_command(cmd).await {
                     break;
                 }
             }
             Some(cmd) = self.loopback_rx.recv() => {
                 if !self.handle_command(cmd).await {
                     break;
                 }
             }
         }
      }

      self.cleanup().await;
   }

   /// Builds the initial state. A failed poll counts as an empty snapshot,
   /// so a watched device that cannot be confirmed is treated as gone.
   async fn seed(&mut self) {
      let snapshot = match self.poller.snapshot(&*self.backend).await {
         Ok(snapshot) => snapshot,
         Err(e) => {
            error!("Failed to get initial state: {e}");
            self
               .events
               .emit(MonitorEvent::error(format!("Failed to get initial state: {e}")));
            Snapshot::new()
         },
      };

      self.state = ConnectionState::seeded(snapshot);
      info!("{} device(s) connected at startup", self.state.len());
      for address in self.state.addresses() {
         let device = self.directory.record(&*self.backend, address).await;
         self.events.emit(MonitorEvent::initial(device));
      }

      if let Some(scheduler) = &mut self.scheduler
         && !self.state.contains(scheduler.watched())
      {
         info!("{} not connected at startup", scheduler.watched());
         scheduler.arm();
      }
   }

   fn start_feed(&self) -> JoinHandle<()> {
      let backend = Arc::clone(&self.backend);
      let observations = self.observation_tx.clone();
      let loopback = self.loopback_tx.clone();

      tokio::spawn(async move {
         let result = match backend.open_feed().await {
            Ok(lines) => feed::run(lines, &observations).await,
            Err(e) => Err(e),
         };
         if loopback.send(ManagerCommand::FeedEnded(result)).await.is_err() {
            debug!("Monitor stopped before the feed exit was handled");
         }
      })
   }

   async fn handle_command(&mut self, cmd: ManagerCommand) -> bool {
      match cmd {
         ManagerCommand::FeedEnded(result) => {
            self.handle_feed_ended(result);
         },
         ManagerCommand::RestartFeed => {
            if self.feed_handle.is_none() {
               info!("Restarting event feed");
               self.feed_handle = Some(self.start_feed());
            }
         },
         ManagerCommand::Refresh(reply) => {
            let result = self.poll().await;
            let _ = reply.send(result);
         },
         ManagerCommand::GetConnected(reply) => {
            let _ = reply.send(self.state.addresses());
         },
         ManagerCommand::GetLockDeadline(reply) => {
            let deadline = self.scheduler.as_ref().and_then(LockScheduler::fire_at);
            let _ = reply.send(deadline);
         },
         ManagerCommand::Shutdown(reply) => {
            self.shutdown_reply = Some(reply);
            return false;
         },
      }
      true
   }

   fn handle_feed_ended(&mut self, result: Result<()>) {
      self.feed_handle = None;
      match result {
         Ok(()) => warn!("Event feed ended, restarting..."),
         Err(e) => {
            error!("Event monitoring failed: {e}");
            self
               .events
               .emit(MonitorEvent::error(format!("Event monitoring failed: {e}")));
         },
      }

      let loopback = self.loopback_tx.clone();
      let delay = self.feed_restart_delay;
      tokio::spawn(async move {
         time::sleep(delay).await;
         let _ = loopback.send(ManagerCommand::RestartFeed).await;
      });
   }

   async fn handle_observation(&mut self, observation: Observation) {
      if !self.poller.accepts(&observation.address) {
         return;
      }
      if let Some(transition) = self.apply_observation(&observation).await {
         self.publish(transition);
      }
   }

   /// Polls and reconciles. A failed poll leaves the state untouched.
   async fn poll(&mut self) -> Result<()> {
      match self.poller.snapshot(&*self.backend).await {
         Ok(snapshot) => {
            for transition in self.reconcile_snapshot(&snapshot).await {
               self.publish(transition);
            }
            Ok(())
         },
         Err(e) => {
            warn!("Periodic check failed: {e}");
            self
               .events
               .emit(MonitorEvent::error(format!("Failed to get devices: {e}")));
            Err(e)
         },
      }
   }

   async fn apply_observation(&mut self, observation: &Observation) -> Option<Transition> {
      let kind = self.state.apply(observation)?;
      debug!("{} observation changed state of {}", observation.source, observation.address);
      let name = self
         .directory
         .resolve(&*self.backend, &observation.address)
         .await;
      Some(Transition::new(observation.address.clone(), name, kind))
   }

   async fn reconcile_snapshot(&mut self, snapshot: &Snapshot) -> Vec<Transition> {
      let mut transitions = Vec::new();
      for observation in self.state.diff(snapshot) {
         if let Some(transition) = self.apply_observation(&observation).await {
            transitions.push(transition);
         }
      }
      transitions
   }

   fn publish(&mut self, transition: Transition) {
      self
         .events
         .emit(MonitorEvent::Transition(transition.clone()));
      if let Some(scheduler) = &mut self.scheduler {
         scheduler.on_transition(&transition);
      }
   }

   async fn cleanup(&mut self) {
      info!(
         "Stopping monitor with {} device(s) connected...",
         self.state.len()
      );

      if let Some(handle) = self.feed_handle.take() {
         handle.abort();
         let _ = time::timeout(FEED_SHUTDOWN_TIMEOUT, handle).await;
      }

      if let Some(scheduler) = &mut self.scheduler {
         scheduler.cancel();
      }

      if let Some(reply) = self.shutdown_reply.take() {
         let _ = reply.send(());
      }
   }
}
