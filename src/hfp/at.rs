//! AT command framing and parsing.
//!
//! The Hands-Free unit terminates each command with `\r`. RFCOMM does not
//! preserve message boundaries, so bytes are accumulated until a full line
//! is available.

use log::warn;
use smol_str::SmolStr;

/// Longest command line accepted
pub const MAX_LINE_LEN: usize = 256;

/// Splits an inbound byte stream into command lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
   line: heapless::Vec<u8, MAX_LINE_LEN>,
   overflowed: bool,
}

impl LineBuffer {
   /// Feeds received bytes; returns every line completed by them.
   pub fn push(&mut self, bytes: &[u8]) -> Vec<SmolStr> {
      let mut lines = Vec::new();
      for &b in bytes {
         match b {
            b'\r' => {
               if self.overflowed {
                  warn!("Dropping AT command longer than {MAX_LINE_LEN} bytes");
               } else if let Some(line) = self.take_line() {
                  lines.push(line);
               }
               self.line.clear();
               self.overflowed = false;
            },
            b'\n' => {},
            _ => {
               if self.line.push(b).is_err() {
                  self.overflowed = true;
               }
            },
         }
      }
      lines
   }

   fn take_line(&mut self) -> Option<SmolStr> {
      let line = String::from_utf8_lossy(&self.line);
      let line = line.trim();
      (!line.is_empty()).then(|| line.into())
   }
}

/// A command sent by the Hands-Free unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtCommand {
   /// `AT+BRSF=<features>`
   SupportedFeatures(u32),
   /// `AT+CIND=?`
   IndicatorMap,
   /// `AT+CIND?`
   IndicatorValues,
   /// `AT+CMER=<mode>,<keyp>,<disp>,<ind>`
   EventReporting { enabled: bool },
   /// `AT+CHLD=?`
   CallHoldTest,
   /// `AT+<name>=<value>`
   Set { name: SmolStr, value: SmolStr },
   /// `AT+<name>?`
   Read { name: SmolStr },
   /// `AT+<name>`
   Action { name: SmolStr },
   /// Anything that is not an extended AT command
   Unknown(SmolStr),
}

impl AtCommand {
   /// Parses one command line (without the terminator).
   pub fn parse(line: &str) -> Self {
      let line = line.trim();
      let unknown = || Self::Unknown(line.into());

      let Some(rest) = line
         .get(..2)
         .filter(|p| p.eq_ignore_ascii_case("AT"))
         .map(|_| &line[2..])
      else {
         return unknown();
      };
      if !rest.starts_with('+') {
         return unknown();
      }

      let split = rest.find(['=', '?']).unwrap_or(rest.len());
      let name = rest[..split].to_ascii_uppercase();
      let suffix = &rest[split..];

      match (name.as_str(), suffix) {
         ("+BRSF", s) if s.starts_with('=') => s[1..]
            .trim()
            .parse()
            .map_or_else(|_| unknown(), Self::SupportedFeatures),
         ("+CIND", "=?") => Self::IndicatorMap,
         ("+CIND", "?") => Self::IndicatorValues,
         ("+CMER", s) if s.starts_with('=') => {
            let params: Vec<&str> = s[1..].split(',').map(str::trim).collect();
            match params.as_slice() {
               [_, _, _, ind, ..] => Self::EventReporting {
                  enabled: *ind == "1",
               },
               _ => unknown(),
            }
         },
         ("+CHLD", "=?") => Self::CallHoldTest,
         (_, "") => Self::Action { name: name.into() },
         (_, "?") => Self::Read { name: name.into() },
         (_, s) if s.starts_with('=') => Self::Set {
            name: name.into(),
            value: s[1..].trim().into(),
         },
         _ => unknown(),
      }
   }
}
