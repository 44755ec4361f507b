//! `bluetoothctl` backed implementation of [`BluetoothBackend`].
//!
//! Every request spawns a short-lived `bluetoothctl` child; the event feed
//! keeps one `bluetoothctl --monitor` child alive for as long as its line
//! stream exists.

use std::{io, process::Stdio};

use futures::stream::{self, StreamExt};
use log::debug;
use smol_str::SmolStr;
use tokio::{
   io::{AsyncBufRead, AsyncBufReadExt, BufReader},
   process::Command,
};

use crate::{
   bluetooth::{
      address::DeviceAddress,
      backend::{BluetoothBackend, LineStream},
   },
   error::{MonitorError, Result},
};

const PROGRAM: &str = "bluetoothctl";

/// Talks to BlueZ through the `bluetoothctl` command line tool.
#[derive(Debug, Clone, Default)]
pub struct BluetoothCtl;

impl BluetoothCtl {
   pub const fn new() -> Self {
      Self
   }

   /// Checks the tool is installed and returns its version string.
   pub async fn version(&self) -> Result<SmolStr> {
      let output = command()
         .arg("--version")
         .output()
         .await
         .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => MonitorError::ToolNotFound(PROGRAM),
            _ => MonitorError::Io(e),
         })?;

      if !output.status.success() {
         return Err(MonitorError::ToolNotFound(PROGRAM));
      }
      Ok(String::from_utf8_lossy(&output.stdout).trim().into())
   }

   async fn run(&self, args: &[&str]) -> Result<String> {
      let output = command().args(args).output().await?;
      if !output.status.success() {
         return Err(MonitorError::CommandFailed {
            command: format!("{PROGRAM} {}", args.join(" ")),
            status: output.status,
         });
      }
      Ok(String::from_utf8_lossy(&output.stdout).into_owned())
   }
}

impl BluetoothBackend for BluetoothCtl {
   async fn connected_devices(&self) -> Result<Vec<DeviceAddress>> {
      let output = self.run(&["devices", "Connected"]).await?;
      Ok(parse_device_list(&output))
   }

   async fn device_name(&self, address: &DeviceAddress) -> Result<Option<SmolStr>> {
      let output = self.run(&["info", address.as_str()]).await?;
      Ok(parse_info_name(&output))
   }

   async fn open_feed(&self) -> Result<LineStream> {
      let mut child = command()
         .arg("--monitor")
         .stdout(Stdio::piped())
         .stderr(Stdio::null())
         .spawn()?;
      let stdout = child.stdout.take().ok_or(MonitorError::FeedClosed)?;
      debug!("Started {PROGRAM} monitor (pid {:?})", child.id());
      Ok(line_stream(BufReader::new(stdout), child))
   }
}

fn command() -> Command {
   let mut cmd = Command::new(PROGRAM);
   cmd.stdin(Stdio::null()).kill_on_drop(true);
   cmd
}

/// Turns a reader into a stream of lines, keeping `guard` alive alongside.
///
/// Invalid UTF-8 is replaced rather than reported, so a garbled line never
/// ends the stream.
fn line_stream<R, G>(reader: R, guard: G) -> LineStream
where
   R: AsyncBufRead + Unpin + Send + 'static,
   G: Send + 'static,
{
   stream::unfold((reader, guard), |(mut reader, guard)| async move {
      let mut buf = Vec::new();
      match reader.read_until(b'\n', &mut buf).await {
         Ok(0) => None,
         Ok(_) => {
            let line = String::from_utf8_lossy(&buf).trim_end().to_string();
            Some((Ok(line), (reader, guard)))
         },
         Err(e) => Some((Err(e), (reader, guard))),
      }
   })
   .boxed()
}

/// Parses `bluetoothctl devices Connected` output.
pub fn parse_device_list(output: &str) -> Vec<DeviceAddress> {
   output
      .lines()
      .filter_map(|line| {
         let token = line.trim().strip_prefix("Device ")?.split_whitespace().next()?;
         token.parse().ok()
      })
      .collect()
}

/// Extracts the `Name:` field from `bluetoothctl info` output.
pub fn parse_info_name(output: &str) -> Option<SmolStr> {
   output
      .lines()
      .find_map(|line| line.trim().strip_prefix("Name:"))
      .map(str::trim)
      .filter(|name| !name.is_empty())
      .map(SmolStr::from)
}
