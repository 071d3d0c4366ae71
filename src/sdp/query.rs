//! Service Search Attribute transaction.
//!
//! `ServiceQuery` holds the protocol state (transaction id, continuation,
//! collected attribute bytes) and never touches a socket, so the whole
//! request/response exchange can be driven from tests.
//! `query_rfcomm_services` runs it over a real L2CAP channel.

use std::time::Duration;

use bluer::{
   Address, AddressType,
   l2cap::{Socket, SocketAddr},
};
use log::{debug, info};
use tokio::time;

use super::{
   ATTR_PROTOCOL_DESCRIPTOR_LIST, ATTR_SERVICE_NAME, SDP_PSM, SdpError,
   pdu::{self, Continuation, Response, SearchAttributeRequest},
   record::{RfcommService, extract_services},
};
use crate::{
   error::{ProbeError, Result},
   event::{EventSender, QueryEvent, StackEvent},
};

/// Maximum transmission unit for the SDP channel
const L2CAP_MTU: usize = 672;
/// Attribute bytes requested per response, sized to fit the MTU
const MAX_ATTRIBUTE_BYTES: u16 = 600;
/// Upper bound on the reassembled attribute lists
const MAX_COLLECTED_BYTES: usize = 64 * 1024;
/// Attributes needed to name a service and find its channel
const QUERY_ATTRIBUTES: [u16; 2] = [ATTR_PROTOCOL_DESCRIPTOR_LIST, ATTR_SERVICE_NAME];

/// State of one `ServiceSearchAttribute` transaction, possibly spanning
/// several request/response round trips.
#[derive(Debug)]
pub struct ServiceQuery {
   service_uuid: u16,
   transaction_id: u16,
   continuation: Continuation,
   collected: Vec<u8>,
}

impl ServiceQuery {
   pub fn new(service_uuid: u16) -> Self {
      Self {
         service_uuid,
         transaction_id: 0,
         continuation: Continuation::new(),
         collected: Vec::new(),
      }
   }

   /// Encodes the next request PDU.
   pub fn next_request(&mut self) -> Vec<u8> {
      self.transaction_id = self.transaction_id.wrapping_add(1);
      SearchAttributeRequest {
         transaction_id: self.transaction_id,
         service_uuid: self.service_uuid,
         max_attribute_bytes: MAX_ATTRIBUTE_BYTES,
         attribute_ids: &QUERY_ATTRIBUTES,
         continuation: &self.continuation,
      }
      .encode()
   }

   /// Consumes a response PDU.
   ///
   /// Returns `Ok(None)` when the server has more to send, and the decoded
   /// services once the last fragment is in.
   pub fn handle_response(&mut self, data: &[u8]) -> std::result::Result<Option<Vec<RfcommService>>, SdpError> {
      let response = pdu::parse_response(data)?;
      if response.transaction_id() != self.transaction_id {
         return Err(SdpError::TransactionMismatch {
            sent: self.transaction_id,
            received: response.transaction_id(),
         });
      }

      match response {
         Response::Error { code, .. } => Err(SdpError::Remote { code }),
         Response::SearchAttribute {
            attribute_lists,
            continuation,
            ..
         } => {
            if self.collected.len() + attribute_lists.len() > MAX_COLLECTED_BYTES {
               return Err(SdpError::ResponseTooLarge {
                  max: MAX_COLLECTED_BYTES,
               });
            }
            self.collected.extend_from_slice(attribute_lists);

            if continuation.is_empty() {
               extract_services(&self.collected).map(Some)
            } else {
               self.continuation = continuation;
               Ok(None)
            }
         },
      }
   }
}

/// Queries `remote` for records of `service_uuid` and reports each RFCOMM
/// service found, followed by `QueryEvent::Complete`.
pub async fn query_rfcomm_services(
   remote: Address,
   service_uuid: u16,
   timeout: Duration,
   events: &EventSender,
) {
   info!("Querying {remote} for service 0x{service_uuid:04X}");
   let result = time::timeout(timeout, run_query(remote, service_uuid))
      .await
      .map_err(|_| ProbeError::RequestTimeout)
      .and_then(|r| r);

   let result = result.map(|services| {
      for service in services {
         events.emit(StackEvent::Query(QueryEvent::Service(service)));
      }
   });
   events.emit(StackEvent::Query(QueryEvent::Complete(result)));
}

async fn run_query(remote: Address, service_uuid: u16) -> Result<Vec<RfcommService>> {
   let socket = Socket::new_seq_packet()?;
   let addr = SocketAddr::new(remote, AddressType::BrEdr, SDP_PSM);
   debug!("Connecting to {remote}:{SDP_PSM}");
   let conn = socket.connect(addr).await?;

   let mut query = ServiceQuery::new(service_uuid);
   let mut buf = [0u8; L2CAP_MTU];
   loop {
      let request = query.next_request();
      debug!("→ {remote} SDP: {}", hex::encode(&request));
      conn.send(&request).await?;

      let n = conn.recv(&mut buf).await?;
      if n == 0 {
         return Err(ProbeError::ConnectionLost);
      }
      debug!("← {remote} SDP: {}", hex::encode(&buf[..n]));

      if let Some(services) = query.handle_response(&buf[..n])? {
         return Ok(services);
      }
   }
}
