//! Bluetooth connection monitor
//!
//! Reports Bluetooth devices connecting and disconnecting in real time and
//! runs a lock script when a watched device stays away for longer than a
//! configured delay.

use std::{
   io::{self, Write},
   path::PathBuf,
   sync::Arc,
};

use clap::Parser;
use log::{error, info, warn};
use tokio::{
   select,
   signal::{
      self,
      unix::{SignalKind, signal as unix_signal},
   },
   time::Instant,
};

use bluetooth::{address::DeviceAddress, bluetoothctl::BluetoothCtl};
use config::{Config, Overrides};
use event::{EventBus, MonitorEvent};
use monitor::{manager::MonitorManager, scheduler::ScriptAction};

mod bluetooth;
mod config;
mod error;
mod event;
mod monitor;
#[cfg(test)]
mod testing;

use crate::error::{MonitorError, Result};

#[derive(Parser)]
#[command(name = "bluewatch")]
#[command(about = "Monitor Bluetooth device connections")]
struct Cli {
   /// Filter events for a specific MAC address (e.g. AA:BB:CC:11:22:33)
   #[arg(long)]
   mac: Option<DeviceAddress>,

   /// MAC address that triggers the lock script when disconnected
   #[arg(long)]
   lock_mac: Option<DeviceAddress>,

   /// Delay in seconds before running the lock script [default: 5]
   #[arg(long)]
   lock_delay: Option<u64>,

   /// Path to the lock script [default: lock_screen.sh]
   #[arg(long)]
   lock_script: Option<PathBuf>,

   /// Read settings from this file instead of the default location
   #[arg(long)]
   config: Option<PathBuf>,
}

impl Cli {
   fn overrides(&self) -> Overrides {
      Overrides {
         filter_address: self.mac.clone(),
         lock_address: self.lock_mac.clone(),
         lock_delay: self.lock_delay,
         lock_script: self.lock_script.clone(),
      }
   }
}

#[tokio::main]
async fn main() -> Result<()> {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

   let cli = Cli::parse();

   // Load configuration
   let config = match &cli.config {
      Some(path) => Config::load_from(path)?,
      None => Config::load()?,
   }
   .with_overrides(cli.overrides());
   config.validate()?;

   let backend = BluetoothCtl::new();
   let version = backend.version().await?;
   info!("Using bluetoothctl {version}");

   info!("Starting Bluetooth monitor...");
   let action = ScriptAction::new(&config.lock_script);
   if let Some(lock_address) = &config.lock_address {
      info!(
         "Auto-lock enabled for: {lock_address} (delay: {}s)",
         config.lock_delay
      );
      info!("Using lock script: {}", action.path().display());
      if !action.exists() {
         warn!("Lock script {} not found", action.path().display());
         warn!(
            "Create {} with your screen lock command",
            action.path().display()
         );
      }
   }

   let manager = MonitorManager::spawn(
      Arc::new(backend),
      &config,
      Arc::new(ConsoleReporter),
      Arc::new(action),
   )?;

   // SIGHUP forces an immediate poll and reports status; Ctrl-C stops.
   let mut hangup = unix_signal(SignalKind::hangup())?;
   loop {
      select! {
          result = signal::ctrl_c() => {
              result?;
              break;
          }
          _ = hangup.recv() => {
              info!("Refresh requested");
              if let Err(e) = manager.refresh().await {
                  warn!("Refresh failed: {e}");
              }
              report_status(&manager).await;
          }
          () = manager.closed() => {
              error!("Monitor stopped unexpectedly");
              return Err(MonitorError::ManagerShutdown);
          }
      }
   }

   info!("Shutting down monitor...");
   manager.shutdown().await?;

   Ok(())
}

async fn report_status(manager: &MonitorManager) {
   let connected = manager.connected_devices().await;
   info!("{} device(s) connected", connected.len());
   if let Some(deadline) = manager.lock_deadline().await {
      let remaining = deadline.saturating_duration_since(Instant::now());
      info!("Lock fires in {}s", remaining.as_secs());
   }
}

/// Writes records to stdout, one line each.
struct ConsoleReporter;

impl EventBus for ConsoleReporter {
   fn emit(&self, event: MonitorEvent) {
      let mut stdout = io::stdout().lock();
      if let Err(e) = writeln!(stdout, "{event}").and_then(|()| stdout.flush()) {
         warn!("Failed to write record: {e}");
      }
   }
}
