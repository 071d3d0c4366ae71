//! Services found during discovery.

use std::fmt;

use log::{info, warn};
use smol_str::SmolStr;

use crate::sdp::RfcommService;

/// Services kept from one query
pub const MAX_SERVICES: usize = 10;
/// Longest service name kept, in bytes
pub const MAX_SERVICE_NAME_LEN: usize = 20;

/// Bounded list of discovered services, in discovery order.
#[derive(Debug, Default)]
pub struct ServiceList {
   entries: heapless::Vec<RfcommService, MAX_SERVICES>,
   dropped: usize,
}

impl ServiceList {
   pub fn new() -> Self {
      Self::default()
   }

   /// Records a discovered service.
   ///
   /// Returns `false` if the list is full and the service was dropped.
   pub fn store(&mut self, service: RfcommService) -> bool {
      info!(
         "Service name: '{}', RFCOMM port {}",
         service.name, service.channel
      );
      let entry = RfcommService {
         name: bounded_name(&service.name),
         channel: service.channel,
      };
      if self.entries.push(entry).is_err() {
         self.dropped += 1;
         warn!(
            "Service list full ({MAX_SERVICES}), dropping '{}' on channel {}",
            service.name, service.channel
         );
         return false;
      }
      true
   }

   pub fn len(&self) -> usize {
      self.entries.len()
   }

   pub fn is_empty(&self) -> bool {
      self.entries.is_empty()
   }

   pub fn first(&self) -> Option<&RfcommService> {
      self.entries.first()
   }

   pub fn iter(&self) -> impl Iterator<Item = &RfcommService> {
      self.entries.iter()
   }

   /// Services that did not fit.
   pub const fn dropped(&self) -> usize {
      self.dropped
   }
}

/// The query report.
impl fmt::Display for ServiceList {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "*** Client query response done. ")?;
      if self.is_empty() {
         writeln!(f, "No service found.")?;
      } else {
         writeln!(f, "Found following {} services:", self.len())?;
      }
      for service in self.iter() {
         writeln!(
            f,
            "     Service name {}, RFCOMM port {}",
            service.name, service.channel
         )?;
      }
      if self.dropped > 0 {
         writeln!(f, "     ({} more not stored)", self.dropped)?;
      }
      write!(f, "***")
   }
}

fn bounded_name(name: &str) -> SmolStr {
   if name.len() <= MAX_SERVICE_NAME_LEN {
      return name.into();
   }
   let mut end = MAX_SERVICE_NAME_LEN;
   while !name.is_char_boundary(end) {
      end -= 1;
   }
   name[..end].into()
}
