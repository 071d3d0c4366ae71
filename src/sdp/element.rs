//! SDP data element decoding.
//!
//! Every SDP attribute value is a self-describing data element: one
//! descriptor byte (type in the upper 5 bits, size index in the lower 3)
//! followed by an optional length prefix and the body.

use smol_str::SmolStr;
use uuid::Uuid;

use super::{SdpError, expand_short_uuid};

/// Deepest sequence nesting accepted from the wire
const MAX_NESTING: usize = 16;

/// Data element type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr, strum::Display)]
#[repr(u8)]
pub enum ElementType {
   Nil = 0,
   Unsigned = 1,
   Signed = 2,
   Uuid = 3,
   Text = 4,
   Bool = 5,
   Sequence = 6,
   Alternative = 7,
   Url = 8,
}

impl ElementType {
   /// Types whose body length is encoded in an explicit length prefix.
   const fn is_variable(self) -> bool {
      matches!(self, Self::Text | Self::Sequence | Self::Alternative | Self::Url)
   }
}

/// A decoded SDP data element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataElement {
   Nil,
   Unsigned(u128),
   Signed(i128),
   Uuid(Uuid),
   Text(SmolStr),
   Bool(bool),
   Sequence(Vec<DataElement>),
   Alternative(Vec<DataElement>),
   Url(SmolStr),
}

impl DataElement {
   /// Decodes one data element from the front of `data`.
   ///
   /// Returns the element and the number of bytes it occupied.
   pub fn parse(data: &[u8]) -> Result<(Self, usize), SdpError> {
      Self::parse_nested(data, 0)
   }

   fn parse_nested(data: &[u8], depth: usize) -> Result<(Self, usize), SdpError> {
      if depth > MAX_NESTING {
         return Err(SdpError::NestingTooDeep { max: MAX_NESTING });
      }

      let &descriptor = data.first().ok_or(SdpError::Truncated {
         expected: 1,
         actual: 0,
      })?;
      let type_id = descriptor >> 3;
      let size_index = descriptor & 0x07;
      let kind = ElementType::from_repr(type_id).ok_or(SdpError::UnknownElementType { type_id })?;

      let (header_len, body_len) = match (kind, size_index) {
         (ElementType::Nil, 0) => (1, 0),
         (ElementType::Nil, _) => return Err(SdpError::InvalidSize { kind, size_index }),
         (k, 0..=4) if !k.is_variable() => (1, 1usize << size_index),
         (k, 5..=7) if k.is_variable() => read_length_prefix(data, size_index)?,
         _ => return Err(SdpError::InvalidSize { kind, size_index }),
      };

      let total = header_len + body_len;
      if data.len() < total {
         return Err(SdpError::Truncated {
            expected: total,
            actual: data.len(),
         });
      }
      let body = &data[header_len..total];

      let element = match kind {
         ElementType::Nil => Self::Nil,
         ElementType::Unsigned => Self::Unsigned(read_unsigned(body)),
         ElementType::Signed => Self::Signed(read_signed(body)),
         ElementType::Uuid => Self::Uuid(read_uuid(body, size_index)?),
         ElementType::Bool => {
            if body_len != 1 {
               return Err(SdpError::InvalidSize { kind, size_index });
            }
            Self::Bool(body[0] != 0)
         },
         ElementType::Text => Self::Text(read_text(body)),
         ElementType::Url => Self::Url(read_text(body)),
         ElementType::Sequence => Self::Sequence(parse_children(body, depth)?),
         ElementType::Alternative => Self::Alternative(parse_children(body, depth)?),
      };

      Ok((element, total))
   }

   pub const fn element_type(&self) -> ElementType {
      match self {
         Self::Nil => ElementType::Nil,
         Self::Unsigned(_) => ElementType::Unsigned,
         Self::Signed(_) => ElementType::Signed,
         Self::Uuid(_) => ElementType::Uuid,
         Self::Text(_) => ElementType::Text,
         Self::Bool(_) => ElementType::Bool,
         Self::Sequence(_) => ElementType::Sequence,
         Self::Alternative(_) => ElementType::Alternative,
         Self::Url(_) => ElementType::Url,
      }
   }

   pub fn as_unsigned(&self) -> Option<u128> {
      match self {
         Self::Unsigned(v) => Some(*v),
         _ => None,
      }
   }

   pub fn as_u8(&self) -> Option<u8> {
      self.as_unsigned().and_then(|v| u8::try_from(v).ok())
   }

   pub fn as_u16(&self) -> Option<u16> {
      self.as_unsigned().and_then(|v| u16::try_from(v).ok())
   }

   pub fn as_uuid(&self) -> Option<Uuid> {
      match self {
         Self::Uuid(u) => Some(*u),
         _ => None,
      }
   }

   /// Returns the 16-bit short form if this is a UUID on the base UUID.
   pub fn as_uuid16(&self) -> Option<u16> {
      let uuid = self.as_uuid()?.as_u128();
      let short = u16::try_from(uuid >> 96).ok()?;
      (expand_short_uuid(short as u32) == uuid).then_some(short)
   }

   pub fn as_text(&self) -> Option<&str> {
      match self {
         Self::Text(s) => Some(s),
         _ => None,
      }
   }

   /// Children of a sequence or alternative.
   pub fn as_children(&self) -> Option<&[DataElement]> {
      match self {
         Self::Sequence(items) | Self::Alternative(items) => Some(items),
         _ => None,
      }
   }
}

fn read_length_prefix(data: &[u8], size_index: u8) -> Result<(usize, usize), SdpError> {
   let prefix = match size_index {
      5 => 1,
      6 => 2,
      _ => 4,
   };
   let header_len = 1 + prefix;
   if data.len() < header_len {
      return Err(SdpError::Truncated {
         expected: header_len,
         actual: data.len(),
      });
   }
   let len = data[1..header_len]
      .iter()
      .fold(0usize, |acc, &b| (acc << 8) | b as usize);
   Ok((header_len, len))
}

fn read_unsigned(body: &[u8]) -> u128 {
   body.iter().fold(0u128, |acc, &b| (acc << 8) | u128::from(b))
}

fn read_signed(body: &[u8]) -> i128 {
   let init: i128 = if body.first().is_some_and(|b| b & 0x80 != 0) {
      -1
   } else {
      0
   };
   body.iter().fold(init, |acc, &b| (acc << 8) | i128::from(b))
}

fn read_uuid(body: &[u8], size_index: u8) -> Result<Uuid, SdpError> {
   match body.len() {
      2 | 4 => Ok(Uuid::from_u128(expand_short_uuid(read_unsigned(body) as u32))),
      16 => Ok(Uuid::from_u128(read_unsigned(body))),
      _ => Err(SdpError::InvalidSize {
         kind: ElementType::Uuid,
         size_index,
      }),
   }
}

fn read_text(body: &[u8]) -> SmolStr {
   // Some stacks count the C string terminator in the length
   let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
   SmolStr::new(String::from_utf8_lossy(&body[..end]))
}

fn parse_children(mut body: &[u8], depth: usize) -> Result<Vec<DataElement>, SdpError> {
   let mut items = Vec::new();
   while !body.is_empty() {
      let (item, used) = DataElement::parse_nested(body, depth + 1)?;
      items.push(item);
      body = &body[used..];
   }
   Ok(items)
}
