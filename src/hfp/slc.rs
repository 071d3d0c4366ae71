//! Audio Gateway side of the HFP service level connection.
//!
//! The Hands-Free unit drives the handshake:
//!
//! 1. `AT+BRSF` exchange supported features
//! 2. `AT+CIND=?` learn the indicator map
//! 3. `AT+CIND?` read current indicator values
//! 4. `AT+CMER` enable indicator event reporting
//! 5. `AT+CHLD=?` call hold capabilities, only if both sides do three-way
//!    calling
//!
//! After that the connection is established and simple settings are
//! acknowledged.

use log::{debug, info, warn};

use super::at::{AtCommand, LineBuffer};
use crate::bluetooth::rfcomm::Packet;

/// AG feature bit: three-way calling
pub const AG_THREE_WAY_CALLING: u32 = 1 << 0;
/// HF feature bit: three-way calling
pub const HF_THREE_WAY_CALLING: u32 = 1 << 1;

/// Operator name reported for `AT+COPS?`
const OPERATOR_NAME: &str = "hfp-probe";

/// Indicators in the order they are reported by `+CIND`.
const INDICATORS: [(&str, &str); 7] = [
   ("service", "(0,1)"),
   ("call", "(0,1)"),
   ("callsetup", "(0-3)"),
   ("callheld", "(0-2)"),
   ("signal", "(0-5)"),
   ("roam", "(0,1)"),
   ("battchg", "(0-5)"),
];

/// In service, idle, full signal and battery.
const INITIAL_INDICATOR_VALUES: [u8; 7] = [1, 0, 0, 0, 5, 0, 5];

/// Settings acknowledged once the connection is up.
const ACCEPTED_SETTINGS: &[&str] = &[
   "+VGS", "+VGM", "+NREC", "+CMEE", "+CLIP", "+CCWA", "+BIA", "+BVRA", "+COPS",
];

/// Actions acknowledged once the connection is up.
const ACCEPTED_ACTIONS: &[&str] = &["+CLCC", "+CHUP"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SlcState {
   AwaitingFeatures,
   AwaitingIndicatorMap,
   AwaitingIndicatorValues,
   AwaitingEventReporting,
   AwaitingCallHold,
   Established,
}

#[derive(Debug)]
pub struct ServiceLevelConnection {
   state: SlcState,
   ag_features: u32,
   hf_features: Option<u32>,
   indicators: [u8; INDICATORS.len()],
   event_reporting: bool,
   lines: LineBuffer,
}

impl ServiceLevelConnection {
   pub fn new(ag_features: u32) -> Self {
      Self {
         state: SlcState::AwaitingFeatures,
         ag_features,
         hf_features: None,
         indicators: INITIAL_INDICATOR_VALUES,
         event_reporting: false,
         lines: LineBuffer::default(),
      }
   }

   pub const fn state(&self) -> SlcState {
      self.state
   }

   pub const fn is_established(&self) -> bool {
      matches!(self.state, SlcState::Established)
   }

   /// Features the Hands-Free unit reported in `AT+BRSF`.
   pub const fn hf_features(&self) -> Option<u32> {
      self.hf_features
   }

   pub const fn event_reporting(&self) -> bool {
      self.event_reporting
   }

   /// Feeds received bytes and returns one response packet per complete
   /// command.
   pub fn receive(&mut self, bytes: &[u8]) -> Vec<Packet> {
      self
         .lines
         .push(bytes)
         .iter()
         .map(|line| {
            debug!("HF: {line}");
            self.handle(&AtCommand::parse(line))
         })
         .collect()
   }

   /// Answers one command, advancing the handshake where it applies.
   pub fn handle(&mut self, command: &AtCommand) -> Packet {
      match (self.state, command) {
         (SlcState::AwaitingFeatures, AtCommand::SupportedFeatures(hf)) => {
            self.hf_features = Some(*hf);
            self.state = SlcState::AwaitingIndicatorMap;
            respond(Some(&format!("+BRSF: {}", self.ag_features)))
         },
         (SlcState::AwaitingIndicatorMap, AtCommand::IndicatorMap) => {
            self.state = SlcState::AwaitingIndicatorValues;
            respond(Some(&indicator_map()))
         },
         (SlcState::AwaitingIndicatorValues | SlcState::Established, AtCommand::IndicatorValues) => {
            if self.state == SlcState::AwaitingIndicatorValues {
               self.state = SlcState::AwaitingEventReporting;
            }
            respond(Some(&self.indicator_values()))
         },
         (SlcState::AwaitingEventReporting, AtCommand::EventReporting { enabled }) => {
            self.event_reporting = *enabled;
            if self.three_way_calling() {
               self.state = SlcState::AwaitingCallHold;
            } else {
               self.establish();
            }
            respond(None)
         },
         (SlcState::AwaitingCallHold, AtCommand::CallHoldTest) => {
            self.establish();
            respond(Some("+CHLD: (0,1,2,3)"))
         },
         (SlcState::Established, AtCommand::Read { name }) if name == "+COPS" => {
            respond(Some(&format!("+COPS: 0,0,\"{OPERATOR_NAME}\"")))
         },
         (SlcState::Established, AtCommand::Set { name, .. })
            if ACCEPTED_SETTINGS.contains(&name.as_str()) =>
         {
            respond(None)
         },
         (SlcState::Established, AtCommand::Action { name })
            if ACCEPTED_ACTIONS.contains(&name.as_str()) =>
         {
            respond(None)
         },
         (state, command) => {
            warn!("Rejecting {command:?} in state {state}");
            error()
         },
      }
   }

   fn three_way_calling(&self) -> bool {
      self.ag_features & AG_THREE_WAY_CALLING != 0
         && self.hf_features.unwrap_or(0) & HF_THREE_WAY_CALLING != 0
   }

   fn establish(&mut self) {
      self.state = SlcState::Established;
      info!(
         "Service level connection established (HF features {:#x})",
         self.hf_features.unwrap_or(0)
      );
   }

   fn indicator_values(&self) -> String {
      let values: Vec<String> = self.indicators.iter().map(u8::to_string).collect();
      format!("+CIND: {}", values.join(","))
   }
}

fn indicator_map() -> String {
   let entries: Vec<String> = INDICATORS
      .iter()
      .map(|(name, range)| format!("(\"{name}\",{range})"))
      .collect();
   format!("+CIND: {}", entries.join(","))
}

/// Formats a final result, optionally preceded by an information line.
fn respond(info: Option<&str>) -> Packet {
   let mut out = Packet::new();
   if let Some(info) = info {
      out.extend_from_slice(b"\r\n");
      out.extend_from_slice(info.as_bytes());
      out.extend_from_slice(b"\r\n");
   }
   out.extend_from_slice(b"\r\nOK\r\n");
   out
}

fn error() -> Packet {
   Packet::from_slice(b"\r\nERROR\r\n")
}

#[cfg(test)]
mod tests {
   use super::*;

   fn text(packet: &Packet) -> &str {
      std::str::from_utf8(packet).unwrap()
   }

   fn run_handshake(slc: &mut ServiceLevelConnection, hf_features: u32) -> Vec<String> {
      let commands = format!("AT+BRSF={hf_features}\rAT+CIND=?\rAT+CIND?\rAT+CMER=3,0,0,1\r");
      slc.receive(commands.as_bytes())
         .iter()
         .map(|p| text(p).to_string())
         .collect()
   }

   #[test]
   fn test_brsf_response_matches_wire_format() {
      let mut slc = ServiceLevelConnection::new(224);
      let responses = slc.receive(b"AT+BRSF=191\r");
      assert_eq!(responses.len(), 1);
      assert_eq!(text(&responses[0]), "\r\n+BRSF: 224\r\n\r\nOK\r\n");
      assert_eq!(slc.hf_features(), Some(191));
      assert_eq!(slc.state(), SlcState::AwaitingIndicatorMap);
   }

   #[test]
   fn test_full_handshake_without_three_way_calling() {
      let mut slc = ServiceLevelConnection::new(224);
      let responses = run_handshake(&mut slc, 0x1F);

      assert_eq!(responses.len(), 4);
      assert_eq!(
         responses[1],
         "\r\n+CIND: (\"service\",(0,1)),(\"call\",(0,1)),(\"callsetup\",(0-3)),\
          (\"callheld\",(0-2)),(\"signal\",(0-5)),(\"roam\",(0,1)),(\"battchg\",(0-5))\r\n\r\nOK\r\n"
      );
      assert_eq!(responses[2], "\r\n+CIND: 1,0,0,0,5,0,5\r\n\r\nOK\r\n");
      assert_eq!(responses[3], "\r\nOK\r\n");
      assert!(slc.is_established());
      assert!(slc.event_reporting());
   }

   #[test]
   fn test_handshake_with_call_hold() {
      let mut slc = ServiceLevelConnection::new(224 | AG_THREE_WAY_CALLING);
      run_handshake(&mut slc, HF_THREE_WAY_CALLING);
      assert_eq!(slc.state(), SlcState::AwaitingCallHold);

      let responses = slc.receive(b"AT+CHLD=?\r");
      assert_eq!(text(&responses[0]), "\r\n+CHLD: (0,1,2,3)\r\n\r\nOK\r\n");
      assert!(slc.is_established());
   }

   #[test]
   fn test_out_of_order_command_is_rejected() {
      let mut slc = ServiceLevelConnection::new(224);
      let responses = slc.receive(b"AT+CIND?\r");
      assert_eq!(text(&responses[0]), "\r\nERROR\r\n");
      assert_eq!(slc.state(), SlcState::AwaitingFeatures);

      // Settings are not accepted before the handshake is done
      let responses = slc.receive(b"AT+VGS=10\r");
      assert_eq!(text(&responses[0]), "\r\nERROR\r\n");
   }

   #[test]
   fn test_established_commands() {
      let mut slc = ServiceLevelConnection::new(224);
      run_handshake(&mut slc, 0);

      let responses = slc.receive(b"AT+VGS=9\rAT+COPS=3,0\rAT+COPS?\rAT+CLCC\rAT+XYZ\r");
      let responses: Vec<&str> = responses.iter().map(text).collect();
      assert_eq!(
         responses,
         vec![
            "\r\nOK\r\n",
            "\r\nOK\r\n",
            "\r\n+COPS: 0,0,\"hfp-probe\"\r\n\r\nOK\r\n",
            "\r\nOK\r\n",
            "\r\nERROR\r\n",
         ]
      );
   }
}
