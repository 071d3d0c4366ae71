//! Stack events and the queue that carries them to the dispatcher.
//!
//! Everything the Bluetooth stack reports (adapter power, pairing requests,
//! SDP results, RFCOMM channel state and data) arrives at the dispatcher as
//! a `StackEvent`. Producers run in their own tasks and only ever `emit`.

use std::{sync::Arc, time::Duration};

use bluer::Address;
use crossbeam::queue::SegQueue;
use smol_str::SmolStr;
use tokio::{
   sync::{Notify, oneshot},
   time,
};

use crate::{
   bluetooth::rfcomm::{Packet, RfcommLink},
   error::{ProbeError, Result},
   sdp::RfcommService,
};

/// Events produced by an SDP query.
#[derive(Debug)]
pub enum QueryEvent {
   /// One record with an RFCOMM channel
   Service(RfcommService),
   /// The query finished; all `Service` events precede this one
   Complete(Result<()>),
}

/// Events that can be emitted by the Bluetooth stack.
#[derive(Debug, strum::IntoStaticStr)]
pub enum StackEvent {
   PoweredOn,
   PoweredOff,
   PinCodeRequest {
      device: Address,
      reply: oneshot::Sender<SmolStr>,
   },
   Query(QueryEvent),
   ChannelOpened(RfcommLink),
   ChannelOpenFailed {
      channel: u8,
      reason: ProbeError,
   },
   /// The link finished writing a packet and can take the next one
   CanSendNow,
   Data(Packet),
   ChannelClosed,
}

impl StackEvent {
   pub fn name(&self) -> &'static str {
      self.into()
   }
}

/// Trait for implementing event emission.
pub trait EventBus: Send + Sync {
   /// Hands an event to the dispatcher.
   fn emit(&self, event: StackEvent);
}

/// Type alias for a thread-safe event sender.
pub type EventSender = Arc<dyn EventBus>;

/// Unbounded event queue drained by the dispatcher.
pub struct EventQueue {
   queue: SegQueue<StackEvent>,
   notifier: Notify,
}

impl EventQueue {
   pub fn new() -> Arc<Self> {
      Arc::new(Self {
         queue: SegQueue::new(),
         notifier: Notify::new(),
      })
   }

   /// Waits for the next event.
   ///
   /// Returns `None` once every producer handle has been dropped and the
   /// queue is empty.
   pub async fn recv(self: &Arc<Self>) -> Option<StackEvent> {
      loop {
         if let Some(event) = self.queue.pop() {
            return Some(event);
         }
         let notify = self.notifier.notified();
         if let Some(event) = self.queue.pop() {
            return Some(event);
         }
         if Arc::strong_count(self) == 1 {
            return None;
         }
         let _ = time::timeout(Duration::from_secs(1), notify).await;
      }
   }
}

impl EventBus for EventQueue {
   fn emit(&self, event: StackEvent) {
      self.queue.push(event);
      self.notifier.notify_waiters();
   }
}
