//! Error types for the probe.
//!
//! Startup failures propagate out of `main`; failures that happen while the
//! dispatcher is running are only logged.

use thiserror::Error;

use crate::sdp::SdpError;

/// Main error type for the probe.
#[derive(Error, Debug)]
pub enum ProbeError {
   #[error("Bluetooth error: {0}")]
   Bluetooth(#[from] bluer::Error),

   #[error("I/O error: {0}")]
   Io(#[from] std::io::Error),

   #[error("SDP error: {0}")]
   Sdp(#[from] SdpError),

   #[error("Invalid Bluetooth address: {0}")]
   InvalidAddress(String),

   #[error("Invalid PIN code: must be 1-16 characters")]
   InvalidPinCode,

   #[error("Connection lost")]
   ConnectionLost,

   #[error("Connection closed")]
   ConnectionClosed,

   #[error("Send buffer full")]
   SendBufferFull,

   #[error("Request timeout")]
   RequestTimeout,

   #[error("Could not determine config directory")]
   ConfigDirNotFound,

   #[error("TOML parsing error: {0}")]
   TomlParse(#[from] toml::de::Error),

   #[error("TOML serialization error: {0}")]
   TomlSerialize(#[from] toml::ser::Error),
}

/// Convenience type alias for Results with `ProbeError`.
pub type Result<T> = std::result::Result<T, ProbeError>;
