//! Extraction of RFCOMM services from SDP attribute lists.

use smol_str::SmolStr;

use super::{
   ATTR_PROTOCOL_DESCRIPTOR_LIST, ATTR_SERVICE_NAME, DataElement, SdpError, UUID_RFCOMM,
};

/// A service record that can be reached over RFCOMM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfcommService {
   pub name: SmolStr,
   pub channel: u8,
}

/// Decodes the concatenated attribute lists of a `ServiceSearchAttribute`
/// transaction and returns every record that carries an RFCOMM channel.
pub fn extract_services(attribute_lists: &[u8]) -> Result<Vec<RfcommService>, SdpError> {
   if attribute_lists.is_empty() {
      return Ok(Vec::new());
   }

   let (lists, _) = DataElement::parse(attribute_lists)?;
   let DataElement::Sequence(records) = lists else {
      return Err(SdpError::InvalidFormat {
         reason: "attribute lists are not a sequence",
      });
   };

   let mut services = Vec::new();
   for record in &records {
      let attributes = match record {
         DataElement::Sequence(items) => items,
         _ => {
            return Err(SdpError::InvalidFormat {
               reason: "attribute list is not a sequence",
            });
         },
      };
      if let Some(service) = service_from_attributes(attributes)? {
         services.push(service);
      }
   }
   Ok(services)
}

fn service_from_attributes(attributes: &[DataElement]) -> Result<Option<RfcommService>, SdpError> {
   if attributes.len() % 2 != 0 {
      return Err(SdpError::InvalidFormat {
         reason: "dangling attribute id",
      });
   }

   let mut channel = None;
   let mut name = SmolStr::default();
   for pair in attributes.chunks_exact(2) {
      let id = pair[0].as_u16().ok_or(SdpError::InvalidFormat {
         reason: "attribute id is not a uint16",
      })?;
      match id {
         ATTR_PROTOCOL_DESCRIPTOR_LIST => channel = rfcomm_channel(&pair[1]),
         ATTR_SERVICE_NAME => {
            if let Some(text) = pair[1].as_text() {
               name = text.into();
            }
         },
         _ => {},
      }
   }

   Ok(channel.map(|channel| RfcommService { name, channel }))
}

/// Finds the RFCOMM server channel inside a ProtocolDescriptorList.
///
/// The list is a sequence of protocol descriptors, each a sequence whose
/// first element is the protocol UUID. Some records wrap alternatives around
/// it; every alternative is searched.
fn rfcomm_channel(list: &DataElement) -> Option<u8> {
   let descriptors = list.as_children()?;
   descriptors.iter().find_map(|descriptor| {
      let DataElement::Sequence(params) = descriptor else {
         return rfcomm_channel(descriptor);
      };
      match params.as_slice() {
         [proto, channel, ..] if proto.as_uuid16() == Some(UUID_RFCOMM) => channel.as_u8(),
         [first, ..] if first.as_children().is_some() => rfcomm_channel(descriptor),
         _ => None,
      }
   })
}

#[cfg(test)]
pub(crate) mod tests {
   use super::*;

   /// Builds the attribute list of one record the way a phone or headset
   /// would publish it.
   pub(crate) fn record(name: Option<&str>, channel: Option<u8>) -> Vec<u8> {
      let mut attrs = Vec::new();
      if let Some(channel) = channel {
         attrs.extend_from_slice(&[0x09, 0x00, 0x04]);
         attrs.extend_from_slice(&[
            0x35, 0x0C, 0x35, 0x03, 0x19, 0x01, 0x00, 0x35, 0x05, 0x19, 0x00, 0x03, 0x08,
         ]);
         attrs.push(channel);
      }
      if let Some(name) = name {
         attrs.extend_from_slice(&[0x09, 0x01, 0x00, 0x25, name.len() as u8]);
         attrs.extend_from_slice(name.as_bytes());
      }
      let mut out = vec![0x35, attrs.len() as u8];
      out.extend(attrs);
      out
   }

   pub(crate) fn lists(records: &[Vec<u8>]) -> Vec<u8> {
      let body: Vec<u8> = records.concat();
      let mut out = vec![0x36];
      out.extend_from_slice(&(body.len() as u16).to_be_bytes());
      out.extend(body);
      out
   }

   #[test]
   fn test_extract_single_service() {
      let data = lists(&[record(Some("Hands-Free unit"), Some(2))]);
      assert_eq!(
         extract_services(&data).unwrap(),
         vec![RfcommService {
            name: "Hands-Free unit".into(),
            channel: 2
         }]
      );
   }

   #[test]
   fn test_extract_skips_records_without_rfcomm() {
      let data = lists(&[
         record(Some("No channel"), None),
         record(Some("Voice gateway"), Some(3)),
         record(None, Some(7)),
      ]);
      let services = extract_services(&data).unwrap();
      assert_eq!(services.len(), 2);
      assert_eq!(services[0].name, "Voice gateway");
      assert_eq!(services[0].channel, 3);
      assert_eq!(services[1].name, "");
      assert_eq!(services[1].channel, 7);
   }

   #[test]
   fn test_extract_empty() {
      assert!(extract_services(&[]).unwrap().is_empty());
      assert!(extract_services(&[0x35, 0x00]).unwrap().is_empty());
   }

   #[test]
   fn test_extract_rejects_malformed() {
      // Top level is a uint, not a sequence
      assert!(extract_services(&[0x08, 0x01]).is_err());
      // Attribute id without a value
      assert!(extract_services(&[0x35, 0x05, 0x35, 0x03, 0x09, 0x00, 0x04]).is_err());
      // Attribute id is a text string
      assert!(extract_services(&[0x35, 0x06, 0x35, 0x04, 0x25, 0x00, 0x08, 0x01]).is_err());
   }

   #[test]
   fn test_rfcomm_channel_inside_alternative() {
      let list = DataElement::Alternative(vec![DataElement::Sequence(vec![
         DataElement::Sequence(vec![DataElement::Uuid(uuid::Uuid::from_u128(
            super::super::expand_short_uuid(0x0100),
         ))]),
         DataElement::Sequence(vec![
            DataElement::Uuid(uuid::Uuid::from_u128(super::super::expand_short_uuid(0x0003))),
            DataElement::Unsigned(12),
         ]),
      ])]);
      assert_eq!(rfcomm_channel(&list), Some(12));
   }
}
