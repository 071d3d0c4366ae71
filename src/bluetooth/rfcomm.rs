//! RFCOMM channel to the remote Hands-Free service.
//!
//! The stream is split into a reader task and a writer task. The reader
//! turns inbound bytes into `StackEvent::Data`; the writer emits
//! `StackEvent::CanSendNow` after every completed write, which is the cue
//! for the dispatcher to hand over the next outbound packet.

use std::time::Duration;

use bluer::{
   Address,
   rfcomm::{SocketAddr, Stream},
};
use log::{debug, warn};
use smallvec::SmallVec;
use tokio::{
   io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf},
   sync::mpsc::{self, error::TrySendError},
   task::JoinSet,
   time,
};

use crate::{
   error::{ProbeError, Result},
   event::{EventSender, StackEvent},
};

pub type Packet = SmallVec<[u8; 64]>;

/// Outbound packets that may be queued ahead of the writer
const SEND_QUEUE_DEPTH: usize = 4;

/// Sender half of an RFCOMM connection.
///
/// Never blocks: a packet is either queued for the writer task or rejected.
#[derive(Debug, Clone)]
pub struct RfcommSender {
   tx: mpsc::Sender<Packet>,
}

impl RfcommSender {
   pub fn is_connected(&self) -> bool {
      !self.tx.is_closed()
   }

   /// Whether the writer has room for another packet.
   pub fn can_send_now(&self) -> bool {
      self.is_connected() && self.tx.capacity() > 0
   }

   pub fn try_send(&self, data: &[u8]) -> Result<()> {
      self
         .tx
         .try_send(Packet::from_slice(data))
         .map_err(|e| match e {
            TrySendError::Full(_) => ProbeError::SendBufferFull,
            TrySendError::Closed(_) => ProbeError::ConnectionClosed,
         })
   }
}

/// An open RFCOMM channel.
///
/// Dropping the link stops its reader and writer tasks.
#[derive(Debug)]
pub struct RfcommLink {
   pub channel: u8,
   /// Largest frame read from the channel in one go
   pub mtu: u16,
   pub sender: RfcommSender,
   jset: JoinSet<()>,
}

impl Drop for RfcommLink {
   fn drop(&mut self) {
      self.jset.abort_all();
   }
}

impl RfcommLink {
   /// A link with no socket behind it; packets handed to the sender show
   /// up on the returned receiver.
   #[cfg(test)]
   pub fn detached(channel: u8, mtu: u16, depth: usize) -> (Self, mpsc::Receiver<Packet>) {
      let (tx, rx) = mpsc::channel(depth);
      let link = Self {
         channel,
         mtu,
         sender: RfcommSender { tx },
         jset: JoinSet::new(),
      };
      (link, rx)
   }
}

pub async fn connect(
   address: Address,
   channel: u8,
   mtu: u16,
   timeout: Duration,
   events: EventSender,
) -> Result<RfcommLink> {
   debug!("Connecting to {address} RFCOMM channel {channel}");

   let stream = time::timeout(timeout, Stream::connect(SocketAddr::new(address, channel)))
      .await
      .map_err(|_| ProbeError::RequestTimeout)??;
   let (reader, writer) = tokio::io::split(stream);

   let (tx, rx) = mpsc::channel(SEND_QUEUE_DEPTH);
   let mut jset = JoinSet::new();
   jset.spawn(recv_thread(address, reader, mtu, events.clone()));
   jset.spawn(send_thread(address, rx, writer, events));

   Ok(RfcommLink {
      channel,
      mtu,
      sender: RfcommSender { tx },
      jset,
   })
}

async fn recv_thread(adr: Address, mut reader: ReadHalf<Stream>, mtu: u16, events: EventSender) {
   let mut buf = vec![0u8; usize::from(mtu.max(1))];
   loop {
      match reader.read(&mut buf).await {
         Ok(0) => {
            warn!("{adr}: RFCOMM channel closed by remote");
            break;
         },
         Ok(n) => {
            let recvd = &buf[..n];
            debug!("← {adr}: {}", hex::encode(recvd));
            events.emit(StackEvent::Data(Packet::from_slice(recvd)));
         },
         Err(e) => {
            warn!("{adr}: RFCOMM receive failed: {e}");
            break;
         },
      }
   }
   events.emit(StackEvent::ChannelClosed);
}

async fn send_thread(
   adr: Address,
   mut rx: mpsc::Receiver<Packet>,
   mut writer: WriteHalf<Stream>,
   events: EventSender,
) {
   while let Some(data) = rx.recv().await {
      debug!("→ {adr}: {}", hex::encode(&data));
      if let Err(e) = writer.write_all(&data).await {
         warn!("rfcomm send -> error {e}");
      } else {
         events.emit(StackEvent::CanSendNow);
      }
   }
   debug!("{adr}: RFCOMM writer shut down");
}

#[cfg(test)]
mod tests {
   use super::*;

   #[tokio::test]
   async fn test_sender_respects_queue_depth() {
      let (link, mut rx) = RfcommLink::detached(2, 667, 1);
      assert!(link.sender.can_send_now());

      link.sender.try_send(b"\r\nOK\r\n").unwrap();
      assert!(!link.sender.can_send_now());
      assert!(matches!(
         link.sender.try_send(b"\r\nOK\r\n"),
         Err(ProbeError::SendBufferFull)
      ));

      assert_eq!(rx.recv().await.unwrap().as_slice(), b"\r\nOK\r\n");
      assert!(link.sender.can_send_now());
   }

   #[test]
   fn test_sender_reports_closed_link() {
      let (link, rx) = RfcommLink::detached(2, 667, 4);
      drop(rx);
      assert!(!link.sender.is_connected());
      assert!(!link.sender.can_send_now());
      assert!(matches!(
         link.sender.try_send(b"x"),
         Err(ProbeError::ConnectionClosed)
      ));
   }
}
