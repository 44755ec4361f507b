//! Live event feed parsing.
//!
//! The feed is a stream of human-readable lines from the Bluetooth stack.
//! Only lines asserting a connection state for a device are recognized;
//! everything else, including garbled or partial lines, is skipped.

use futures::StreamExt;
use log::{debug, trace};
use tokio::sync::mpsc;

use crate::{
   bluetooth::{address::DeviceAddress, backend::LineStream},
   error::Result,
   monitor::state::{Observation, Source},
};

const CONNECTED_MARKER: &str = "Connected: yes";
const DISCONNECTED_MARKER: &str = "Connected: no";
const DEVICE_MARKER: &str = "Device ";

/// Extracts an observation from a feed line, if it carries one.
///
/// A line must contain a connection assertion, the `Device ` marker and a
/// 17-character colon-delimited address token.
pub fn parse_line(line: &str) -> Option<Observation> {
   let is_connected = if line.contains(CONNECTED_MARKER) {
      true
   } else if line.contains(DISCONNECTED_MARKER) {
      false
   } else {
      return None;
   };

   if !line.contains(DEVICE_MARKER) {
      return None;
   }

   let address = line
      .split_whitespace()
      .filter(|token| DeviceAddress::looks_like(token))
      .find_map(|token| token.parse().ok())?;

   Some(Observation::new(address, is_connected, Source::Event))
}

/// Reads `lines` until the stream ends, forwarding each recognized
/// observation.
///
/// Returns `Ok` when the stream closes or nobody is listening anymore, and
/// the read error if the stream fails. The feed never restarts itself.
pub async fn run(mut lines: LineStream, observations: &mpsc::Sender<Observation>) -> Result<()> {
   while let Some(line) = lines.next().await {
      let line = line?;
      let Some(observation) = parse_line(&line) else {
         trace!("Ignoring feed line: {line}");
         continue;
      };

      debug!(
         "Feed reports {} {}",
         observation.address,
         if observation.is_connected {
            "connected"
         } else {
            "disconnected"
         }
      );
      if observations.send(observation).await.is_err() {
         break;
      }
   }
   Ok(())
}
