//! Event dispatcher.
//!
//! Owns all probe state and reacts to stack events one at a time: power on
//! starts service discovery, discovery completion opens an RFCOMM channel,
//! and data on that channel drives the HFP service level connection.

use std::{collections::VecDeque, sync::Arc};

use bluer::Address;
use log::{debug, error, info, warn};
use smol_str::SmolStr;

use crate::{
   bluetooth::{
      Stack,
      rfcomm::{Packet, RfcommLink},
   },
   config::Config,
   error::Result,
   event::{EventQueue, QueryEvent, StackEvent},
   hfp::ServiceLevelConnection,
   services::ServiceList,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Phase {
   WaitingForPower,
   Querying,
   Connecting,
   Connected,
   Finished,
}

/// Whether the dispatcher keeps running after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
   Continue,
   Stop,
}

pub struct Probe<S> {
   stack: S,
   remote: Address,
   service_uuid: u16,
   channel_override: Option<u8>,
   pin_code: SmolStr,
   phase: Phase,
   services: ServiceList,
   connection: Option<RfcommLink>,
   slc: ServiceLevelConnection,
   outbox: VecDeque<Packet>,
}

impl<S: Stack> Probe<S> {
   pub fn new(config: &Config, stack: S) -> Result<Self> {
      Ok(Self {
         stack,
         remote: config.remote()?,
         service_uuid: config.service_uuid,
         channel_override: config.rfcomm_channel.filter(|&c| c != 0),
         pin_code: config.pin_code.as_str().into(),
         phase: Phase::WaitingForPower,
         services: ServiceList::new(),
         connection: None,
         slc: ServiceLevelConnection::new(config.ag_features),
         outbox: VecDeque::new(),
      })
   }

   pub const fn phase(&self) -> Phase {
      self.phase
   }

   pub const fn services(&self) -> &ServiceList {
      &self.services
   }

   pub const fn slc(&self) -> &ServiceLevelConnection {
      &self.slc
   }

   /// Dispatches events until the channel closes or nothing is left to do.
   pub async fn run(mut self, queue: &Arc<EventQueue>) {
      while let Some(event) = queue.recv().await {
         if self.handle(event) == Flow::Stop {
            break;
         }
      }
      info!("Probe finished in phase {}", self.phase);
   }

   pub fn handle(&mut self, event: StackEvent) -> Flow {
      debug!("Event {} in phase {}", event.name(), self.phase);
      match event {
         StackEvent::PoweredOn => {
            if self.phase == Phase::WaitingForPower {
               self.phase = Phase::Querying;
               self.stack.query_services(self.remote, self.service_uuid);
            }
         },
         StackEvent::PoweredOff => {
            warn!("Adapter powered off");
         },
         StackEvent::PinCodeRequest { device, reply } => {
            info!("Pin code request from {device} - using '{}'", self.pin_code);
            if reply.send(self.pin_code.clone()).is_err() {
               warn!("Pin code request from {device} went away");
            }
         },
         StackEvent::Query(event) => return self.handle_query_event(event),
         StackEvent::ChannelOpened(link) => {
            info!(
               "RFCOMM channel open succeeded. New RFCOMM Channel ID {}, max frame size {}",
               link.channel, link.mtu
            );
            self.connection = Some(link);
            self.phase = Phase::Connected;
            self.send_packet();
         },
         StackEvent::ChannelOpenFailed { channel, reason } => {
            error!("RFCOMM channel {channel} open failed: {reason}");
            self.phase = Phase::Finished;
            return Flow::Stop;
         },
         StackEvent::CanSendNow => self.send_packet(),
         StackEvent::Data(bytes) => {
            self.outbox.extend(self.slc.receive(&bytes));
            self.send_packet();
         },
         StackEvent::ChannelClosed => {
            info!("RFCOMM channel closed");
            self.connection = None;
            self.phase = Phase::Finished;
            return Flow::Stop;
         },
      }
      Flow::Continue
   }

   fn handle_query_event(&mut self, event: QueryEvent) -> Flow {
      match event {
         QueryEvent::Service(service) => {
            self.services.store(service);
            Flow::Continue
         },
         QueryEvent::Complete(result) => {
            if let Err(e) = result {
               warn!("Service query failed: {e}");
            }
            info!("{}", self.services);

            let channel = self
               .channel_override
               .or_else(|| self.services.first().map(|s| s.channel));
            let Some(channel) = channel else {
               warn!("No RFCOMM channel to connect to");
               self.phase = Phase::Finished;
               return Flow::Stop;
            };

            info!("Connecting to {} on RFCOMM channel {channel}", self.remote);
            self.phase = Phase::Connecting;
            self.stack.open_channel(self.remote, channel);
            Flow::Continue
         },
      }
   }

   /// Hands the next queued response to the link if it can take it.
   fn send_packet(&mut self) {
      let Some(conn) = &self.connection else {
         return;
      };
      if !conn.sender.can_send_now() {
         return;
      }
      let Some(packet) = self.outbox.pop_front() else {
         return;
      };
      if let Err(e) = conn.sender.try_send(&packet) {
         error!("rfcomm send -> error {e}");
      }
   }
}

#[cfg(test)]
mod tests {
   use std::cell::RefCell;

   use tokio::sync::{mpsc, oneshot};

   use super::*;
   use crate::{error::ProbeError, hfp::SlcState, sdp::RfcommService};

   #[derive(Debug, PartialEq, Eq)]
   enum Call {
      Query(Address, u16),
      Open(Address, u8),
   }

   #[derive(Default)]
   struct RecordingStack {
      calls: RefCell<Vec<Call>>,
   }

   impl Stack for &RecordingStack {
      fn query_services(&self, remote: Address, service_uuid: u16) {
         self.calls.borrow_mut().push(Call::Query(remote, service_uuid));
      }

      fn open_channel(&self, remote: Address, channel: u8) {
         self.calls.borrow_mut().push(Call::Open(remote, channel));
      }
   }

   fn remote() -> Address {
      Address::new([0x00, 0x21, 0x3C, 0xAC, 0xF7, 0x38])
   }

   fn found(name: &str, channel: u8) -> StackEvent {
      StackEvent::Query(QueryEvent::Service(RfcommService {
         name: name.into(),
         channel,
      }))
   }

   fn complete() -> StackEvent {
      StackEvent::Query(QueryEvent::Complete(Ok(())))
   }

   #[test]
   fn test_power_on_starts_query_once() {
      let stack = RecordingStack::default();
      let mut probe = Probe::new(&Config::default(), &stack).unwrap();

      assert_eq!(probe.handle(StackEvent::PoweredOn), Flow::Continue);
      assert_eq!(probe.handle(StackEvent::PoweredOn), Flow::Continue);

      assert_eq!(probe.phase(), Phase::Querying);
      assert_eq!(*stack.calls.borrow(), vec![Call::Query(remote(), 0x111E)]);
   }

   #[test]
   fn test_pin_code_reply() {
      let stack = RecordingStack::default();
      let mut probe = Probe::new(&Config::default(), &stack).unwrap();

      let (tx, mut rx) = oneshot::channel();
      probe.handle(StackEvent::PinCodeRequest {
         device: remote(),
         reply: tx,
      });
      assert_eq!(rx.try_recv().unwrap(), "0000");
   }

   #[test]
   fn test_query_complete_opens_configured_channel() {
      let stack = RecordingStack::default();
      let mut probe = Probe::new(&Config::default(), &stack).unwrap();

      probe.handle(StackEvent::PoweredOn);
      probe.handle(found("Hands-Free unit", 5));
      probe.handle(complete());

      assert_eq!(probe.services().len(), 1);
      assert_eq!(probe.phase(), Phase::Connecting);
      assert_eq!(
         *stack.calls.borrow(),
         vec![Call::Query(remote(), 0x111E), Call::Open(remote(), 2)]
      );
   }

   #[test]
   fn test_query_complete_falls_back_to_discovered_channel() {
      let stack = RecordingStack::default();
      let config = Config {
         rfcomm_channel: None,
         ..Config::default()
      };
      let mut probe = Probe::new(&config, &stack).unwrap();

      probe.handle(found("Hands-Free unit", 5));
      probe.handle(found("Second", 6));
      probe.handle(complete());

      assert_eq!(*stack.calls.borrow(), vec![Call::Open(remote(), 5)]);
   }

   #[test]
   fn test_channel_zero_means_discovered() {
      let stack = RecordingStack::default();
      let config = Config {
         rfcomm_channel: Some(0),
         ..Config::default()
      };
      let mut probe = Probe::new(&config, &stack).unwrap();

      probe.handle(found("Hands-Free unit", 7));
      probe.handle(complete());

      assert_eq!(*stack.calls.borrow(), vec![Call::Open(remote(), 7)]);
   }

   #[test]
   fn test_failed_query_without_channel_stops() {
      let stack = RecordingStack::default();
      let config = Config {
         rfcomm_channel: None,
         ..Config::default()
      };
      let mut probe = Probe::new(&config, &stack).unwrap();

      let flow = probe.handle(StackEvent::Query(QueryEvent::Complete(Err(
         ProbeError::RequestTimeout,
      ))));
      assert_eq!(flow, Flow::Stop);
      assert_eq!(probe.phase(), Phase::Finished);
      assert!(stack.calls.borrow().is_empty());
   }

   #[test]
   fn test_open_failure_stops() {
      let stack = RecordingStack::default();
      let mut probe = Probe::new(&Config::default(), &stack).unwrap();
      let flow = probe.handle(StackEvent::ChannelOpenFailed {
         channel: 2,
         reason: ProbeError::RequestTimeout,
      });
      assert_eq!(flow, Flow::Stop);
   }

   fn drain(rx: &mut mpsc::Receiver<Packet>) -> Vec<String> {
      let mut out = Vec::new();
      while let Ok(packet) = rx.try_recv() {
         out.push(String::from_utf8(packet.to_vec()).unwrap());
      }
      out
   }

   #[test]
   fn test_data_is_answered_one_packet_per_send_opportunity() {
      let stack = RecordingStack::default();
      let mut probe = Probe::new(&Config::default(), &stack).unwrap();

      let (link, mut rx) = RfcommLink::detached(2, 667, 1);
      probe.handle(StackEvent::ChannelOpened(link));
      assert_eq!(probe.phase(), Phase::Connected);

      // Two commands in one packet produce two responses
      probe.handle(StackEvent::Data(Packet::from_slice(b"AT+BRSF=0\rAT+CIND=?\r")));
      assert_eq!(drain(&mut rx), vec!["\r\n+BRSF: 224\r\n\r\nOK\r\n"]);

      // The second goes out once the writer reports it is ready again
      probe.handle(StackEvent::CanSendNow);
      let sent = drain(&mut rx);
      assert_eq!(sent.len(), 1);
      assert!(sent[0].starts_with("\r\n+CIND: (\"service\""));

      probe.handle(StackEvent::CanSendNow);
      assert!(drain(&mut rx).is_empty());
      assert_eq!(probe.slc().state(), SlcState::AwaitingIndicatorValues);
   }

   #[test]
   fn test_send_waits_while_link_busy() {
      let stack = RecordingStack::default();
      let mut probe = Probe::new(&Config::default(), &stack).unwrap();

      let (link, mut rx) = RfcommLink::detached(2, 667, 1);
      probe.handle(StackEvent::ChannelOpened(link));
      probe.handle(StackEvent::Data(Packet::from_slice(b"AT+BRSF=0\r")));
      // Writer has not taken the first packet yet
      probe.handle(StackEvent::Data(Packet::from_slice(b"AT+CIND=?\r")));
      probe.handle(StackEvent::CanSendNow);

      assert_eq!(drain(&mut rx).len(), 1);
      probe.handle(StackEvent::CanSendNow);
      assert_eq!(drain(&mut rx).len(), 1);
   }

   #[test]
   fn test_channel_closed_stops() {
      let stack = RecordingStack::default();
      let mut probe = Probe::new(&Config::default(), &stack).unwrap();

      let (link, _rx) = RfcommLink::detached(2, 667, 1);
      probe.handle(StackEvent::ChannelOpened(link));
      assert_eq!(probe.handle(StackEvent::ChannelClosed), Flow::Stop);
      assert_eq!(probe.phase(), Phase::Finished);
   }

   #[tokio::test]
   async fn test_run_drains_queue_until_close() {
      let stack = RecordingStack::default();
      let probe = Probe::new(&Config::default(), &stack).unwrap();
      let queue = EventQueue::new();

      {
         use crate::event::EventBus;
         queue.emit(StackEvent::PoweredOn);
         queue.emit(found("Hands-Free unit", 2));
         queue.emit(complete());
         queue.emit(StackEvent::ChannelClosed);
      }
      probe.run(&queue).await;

      assert_eq!(
         *stack.calls.borrow(),
         vec![Call::Query(remote(), 0x111E), Call::Open(remote(), 2)]
      );
   }
}
