//! Bluetooth stack access.
//!
//! This module wraps BlueZ: adapter power, the pairing agent, SDP queries
//! and RFCOMM channels. Results come back as `StackEvent`s.

use std::time::Duration;

use bluer::Address;
use log::warn;

use crate::{
   config::Config,
   event::{EventSender, StackEvent},
   sdp,
};

pub mod adapter;
pub mod agent;
pub mod rfcomm;

/// Operations the dispatcher can start on the stack.
///
/// Both calls return immediately; completion is reported through events.
pub trait Stack {
   /// Starts an SDP query for RFCOMM services of `service_uuid`.
   fn query_services(&self, remote: Address, service_uuid: u16);

   /// Starts opening an RFCOMM channel.
   fn open_channel(&self, remote: Address, channel: u8);
}

/// `Stack` backed by BlueZ sockets.
pub struct BluerStack {
   events: EventSender,
   sdp_timeout: Duration,
   connect_timeout: Duration,
   frame_size: u16,
}

impl BluerStack {
   pub fn new(config: &Config, events: EventSender) -> Self {
      Self {
         events,
         sdp_timeout: config.sdp_timeout(),
         connect_timeout: config.connect_timeout(),
         frame_size: config.rfcomm_frame_size,
      }
   }
}

impl Stack for BluerStack {
   fn query_services(&self, remote: Address, service_uuid: u16) {
      let events = self.events.clone();
      let timeout = self.sdp_timeout;
      tokio::spawn(async move {
         sdp::query_rfcomm_services(remote, service_uuid, timeout, &events).await;
      });
   }

   fn open_channel(&self, remote: Address, channel: u8) {
      let events = self.events.clone();
      let timeout = self.connect_timeout;
      let frame_size = self.frame_size;
      tokio::spawn(async move {
         match rfcomm::connect(remote, channel, frame_size, timeout, events.clone()).await {
            Ok(link) => events.emit(StackEvent::ChannelOpened(link)),
            Err(reason) => {
               warn!("{remote}: RFCOMM connect on channel {channel} failed: {reason}");
               events.emit(StackEvent::ChannelOpenFailed { channel, reason });
            },
         }
      });
   }
}
