//! SDP PDU framing.
//!
//! All multi-byte fields are big-endian. Every PDU starts with a 5-byte
//! header: PDU id, transaction id, parameter length.

use log::debug;

use super::SdpError;

/// Size of the PDU header
pub const HEADER_LEN: usize = 5;

/// Longest continuation state a server may hand back
pub const MAX_CONTINUATION_LEN: usize = 16;

/// Continuation state echoed back to the server on the next request
pub type Continuation = heapless::Vec<u8, MAX_CONTINUATION_LEN>;

/// SDP PDU identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr, strum::Display)]
#[repr(u8)]
pub enum PduId {
   ErrorResponse = 0x01,
   ServiceSearchRequest = 0x02,
   ServiceSearchResponse = 0x03,
   ServiceAttributeRequest = 0x04,
   ServiceAttributeResponse = 0x05,
   ServiceSearchAttributeRequest = 0x06,
   ServiceSearchAttributeResponse = 0x07,
}

/// A `ServiceSearchAttributeRequest` for a single 16-bit service UUID.
#[derive(Debug, Clone)]
pub struct SearchAttributeRequest<'a> {
   pub transaction_id: u16,
   pub service_uuid: u16,
   pub max_attribute_bytes: u16,
   pub attribute_ids: &'a [u16],
   pub continuation: &'a [u8],
}

impl SearchAttributeRequest<'_> {
   pub fn encode(&self) -> Vec<u8> {
      let mut params = Vec::with_capacity(32);

      // ServiceSearchPattern: DES { UUID16 }
      params.extend_from_slice(&[0x35, 0x03, 0x19]);
      params.extend_from_slice(&self.service_uuid.to_be_bytes());

      params.extend_from_slice(&self.max_attribute_bytes.to_be_bytes());

      // AttributeIDList: DES { UINT16 ... }
      params.push(0x35);
      params.push((self.attribute_ids.len() * 3) as u8);
      for id in self.attribute_ids {
         params.push(0x09);
         params.extend_from_slice(&id.to_be_bytes());
      }

      params.push(self.continuation.len() as u8);
      params.extend_from_slice(self.continuation);

      let mut pdu = Vec::with_capacity(HEADER_LEN + params.len());
      pdu.push(PduId::ServiceSearchAttributeRequest as u8);
      pdu.extend_from_slice(&self.transaction_id.to_be_bytes());
      pdu.extend_from_slice(&(params.len() as u16).to_be_bytes());
      pdu.extend_from_slice(&params);
      pdu
   }
}

/// A decoded response PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response<'a> {
   /// One fragment of the attribute lists of all matching records
   SearchAttribute {
      transaction_id: u16,
      attribute_lists: &'a [u8],
      continuation: Continuation,
   },
   Error {
      transaction_id: u16,
      code: u16,
   },
}

impl Response<'_> {
   pub const fn transaction_id(&self) -> u16 {
      match self {
         Self::SearchAttribute { transaction_id, .. } | Self::Error { transaction_id, .. } => {
            *transaction_id
         },
      }
   }
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, SdpError> {
   data
      .get(offset..offset + 2)
      .map(|b| u16::from_be_bytes([b[0], b[1]]))
      .ok_or(SdpError::Truncated {
         expected: offset + 2,
         actual: data.len(),
      })
}

/// Parses a response PDU received from the SDP server.
pub fn parse_response(data: &[u8]) -> Result<Response<'_>, SdpError> {
   if data.len() < HEADER_LEN {
      return Err(SdpError::Truncated {
         expected: HEADER_LEN,
         actual: data.len(),
      });
   }

   let pdu_id = data[0];
   let transaction_id = read_u16(data, 1)?;
   let declared = read_u16(data, 3)? as usize;
   let params = &data[HEADER_LEN..];
   if params.len() != declared {
      return Err(SdpError::LengthMismatch {
         declared,
         actual: params.len(),
      });
   }

   match PduId::from_repr(pdu_id) {
      Some(PduId::ErrorResponse) => {
         let code = read_u16(params, 0)?;
         Ok(Response::Error {
            transaction_id,
            code,
         })
      },
      Some(PduId::ServiceSearchAttributeResponse) => {
         let byte_count = read_u16(params, 0)? as usize;
         let lists_end = 2 + byte_count;
         let attribute_lists = params.get(2..lists_end).ok_or(SdpError::Truncated {
            expected: lists_end,
            actual: params.len(),
         })?;

         let &cont_len = params.get(lists_end).ok_or(SdpError::Truncated {
            expected: lists_end + 1,
            actual: params.len(),
         })?;
         let cont_len = cont_len as usize;
         if cont_len > MAX_CONTINUATION_LEN {
            return Err(SdpError::InvalidContinuation { len: cont_len });
         }
         let cont_bytes = &params[lists_end + 1..];
         if cont_bytes.len() != cont_len {
            return Err(SdpError::InvalidContinuation {
               len: cont_bytes.len(),
            });
         }
         let continuation = Continuation::from_slice(cont_bytes)
            .map_err(|()| SdpError::InvalidContinuation { len: cont_len })?;

         debug!(
            "SDP fragment tid={transaction_id}: {} bytes, continuation {}",
            attribute_lists.len(),
            hex::encode(&continuation)
         );
         Ok(Response::SearchAttribute {
            transaction_id,
            attribute_lists,
            continuation,
         })
      },
      _ => Err(SdpError::UnexpectedPdu { pdu_id }),
   }
}
