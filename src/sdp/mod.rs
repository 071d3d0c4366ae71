//! Service Discovery Protocol client.
//!
//! Just enough SDP to answer one question: which RFCOMM channels does the
//! remote device offer for a given service class, and what are they called.
//! Requests go out over an L2CAP channel to the SDP PSM.

use thiserror::Error;

pub mod element;
pub mod pdu;
pub mod query;
pub mod record;

pub use element::{DataElement, ElementType};
pub use query::{ServiceQuery, query_rfcomm_services};
pub use record::RfcommService;

/// L2CAP PSM of the SDP server
pub const SDP_PSM: u16 = 0x0001;

/// Protocol UUID for RFCOMM inside a protocol descriptor list
pub const UUID_RFCOMM: u16 = 0x0003;
/// Protocol UUID for L2CAP inside a protocol descriptor list
pub const UUID_L2CAP: u16 = 0x0100;

/// Attribute: ProtocolDescriptorList
pub const ATTR_PROTOCOL_DESCRIPTOR_LIST: u16 = 0x0004;
/// Attribute: ServiceName at the primary language base
pub const ATTR_SERVICE_NAME: u16 = 0x0100;

/// Bluetooth Base UUID 00000000-0000-1000-8000-00805F9B34FB
pub const BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Expands a 16- or 32-bit short UUID onto the Bluetooth base UUID.
pub const fn expand_short_uuid(short: u32) -> u128 {
   BASE_UUID | ((short as u128) << 96)
}

/// Error codes carried by an SDP `ErrorResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr, strum::Display)]
#[repr(u16)]
pub enum SdpErrorCode {
   InvalidVersion = 0x0001,
   InvalidServiceRecordHandle = 0x0002,
   InvalidRequestSyntax = 0x0003,
   InvalidPduSize = 0x0004,
   InvalidContinuationState = 0x0005,
   InsufficientResources = 0x0006,
}

/// Error type for SDP encoding, decoding and transactions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdpError {
   /// Input ended before a complete header or body
   #[error("Data too short: expected at least {expected} bytes, got {actual}")]
   Truncated { expected: usize, actual: usize },

   #[error("Unknown data element type: {type_id}")]
   UnknownElementType { type_id: u8 },

   /// Size index not allowed for the element type
   #[error("Invalid size index {size_index} for {kind} element")]
   InvalidSize { kind: ElementType, size_index: u8 },

   #[error("Data elements nested deeper than {max} levels")]
   NestingTooDeep { max: usize },

   #[error("Unexpected PDU 0x{pdu_id:02x}")]
   UnexpectedPdu { pdu_id: u8 },

   #[error("Transaction id mismatch: sent {sent}, got {received}")]
   TransactionMismatch { sent: u16, received: u16 },

   #[error("Parameter length mismatch: header says {declared}, got {actual}")]
   LengthMismatch { declared: usize, actual: usize },

   /// `ErrorResponse` from the remote SDP server
   #[error("Remote error 0x{code:04x}{}", describe_code(.code))]
   Remote { code: u16 },

   #[error("Invalid continuation state length {len}")]
   InvalidContinuation { len: usize },

   #[error("Attribute lists exceed {max} bytes")]
   ResponseTooLarge { max: usize },

   #[error("Invalid record format: {reason}")]
   InvalidFormat { reason: &'static str },
}

fn describe_code(code: &u16) -> String {
   SdpErrorCode::from_repr(*code)
      .map(|c| format!(" ({c})"))
      .unwrap_or_default()
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_expand_short_uuid() {
      let hfp = uuid::Uuid::from_u128(expand_short_uuid(0x111E));
      assert_eq!(
         hfp.to_string(),
         "0000111e-0000-1000-8000-00805f9b34fb"
      );
   }

   #[test]
   fn test_remote_error_display() {
      let err = SdpError::Remote { code: 0x0003 };
      assert_eq!(err.to_string(), "Remote error 0x0003 (InvalidRequestSyntax)");
      let err = SdpError::Remote { code: 0x00ff };
      assert_eq!(err.to_string(), "Remote error 0x00ff");
   }
}
