//! Hands-Free Profile, Audio Gateway role.
//!
//! The remote device publishes the Hands-Free service, so the probe plays
//! the phone: it answers the AT commands the Hands-Free unit sends to set up
//! the service level connection.

pub mod at;
pub mod slc;

pub use slc::{ServiceLevelConnection, SlcState};
