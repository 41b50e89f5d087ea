//! Data object types for DLMS/COSEM protocol

use crate::datatypes::axdr::AxdrTag;
use serde::Serialize;

/// Data received from the meter
///
/// Covers the A-XDR types a register read can return.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DataObject {
    /// Null data
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer 8-bit
    Integer8(i8),
    /// Integer 16-bit
    Integer16(i16),
    /// Integer 32-bit
    Integer32(i32),
    /// Integer 64-bit
    Integer64(i64),
    /// Unsigned integer 8-bit
    Unsigned8(u8),
    /// Unsigned integer 16-bit
    Unsigned16(u16),
    /// Unsigned integer 32-bit
    Unsigned32(u32),
    /// Unsigned integer 64-bit
    Unsigned64(u64),
    /// Float 32-bit
    Float32(f32),
    /// Float 64-bit
    Float64(f64),
    /// Enumeration (8-bit)
    Enumerate(u8),
    /// Octet string
    OctetString(Vec<u8>),
    /// Visible string
    VisibleString(Vec<u8>),
    /// Array of DataObjects
    Array(Vec<DataObject>),
    /// Structure (ordered list of DataObjects)
    Structure(Vec<DataObject>),
}

/// Type enumeration for DataObject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataObjectType {
    NullData,
    Array,
    Structure,
    Boolean,
    /// Integer 32-bit
    DoubleLong,
    /// Unsigned integer 32-bit
    DoubleLongUnsigned,
    OctetString,
    VisibleString,
    /// Integer 8-bit
    Integer,
    /// Integer 16-bit
    LongInteger,
    /// Unsigned integer 8-bit
    Unsigned,
    /// Unsigned integer 16-bit
    LongUnsigned,
    /// Integer 64-bit
    Long64,
    /// Unsigned integer 64-bit
    Long64Unsigned,
    Enumerate,
    Float32,
    Float64,
}

impl DataObjectType {
    /// Check if this type is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataObjectType::DoubleLong
                | DataObjectType::DoubleLongUnsigned
                | DataObjectType::Integer
                | DataObjectType::LongInteger
                | DataObjectType::Unsigned
                | DataObjectType::LongUnsigned
                | DataObjectType::Long64
                | DataObjectType::Long64Unsigned
        )
    }

    /// Check if this type is a signed integer type
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            DataObjectType::DoubleLong
                | DataObjectType::Integer
                | DataObjectType::LongInteger
                | DataObjectType::Long64
        )
    }
}

impl DataObject {
    /// Get the type of this DataObject
    pub fn get_type(&self) -> DataObjectType {
        match self {
            DataObject::Null => DataObjectType::NullData,
            DataObject::Boolean(_) => DataObjectType::Boolean,
            DataObject::Integer8(_) => DataObjectType::Integer,
            DataObject::Integer16(_) => DataObjectType::LongInteger,
            DataObject::Integer32(_) => DataObjectType::DoubleLong,
            DataObject::Integer64(_) => DataObjectType::Long64,
            DataObject::Unsigned8(_) => DataObjectType::Unsigned,
            DataObject::Unsigned16(_) => DataObjectType::LongUnsigned,
            DataObject::Unsigned32(_) => DataObjectType::DoubleLongUnsigned,
            DataObject::Unsigned64(_) => DataObjectType::Long64Unsigned,
            DataObject::Float32(_) => DataObjectType::Float32,
            DataObject::Float64(_) => DataObjectType::Float64,
            DataObject::Enumerate(_) => DataObjectType::Enumerate,
            DataObject::OctetString(_) => DataObjectType::OctetString,
            DataObject::VisibleString(_) => DataObjectType::VisibleString,
            DataObject::Array(_) => DataObjectType::Array,
            DataObject::Structure(_) => DataObjectType::Structure,
        }
    }

    /// Integer value widened to i128, `None` for non-integer types
    pub fn as_integer(&self) -> Option<i128> {
        match *self {
            DataObject::Integer8(v) => Some(v as i128),
            DataObject::Integer16(v) => Some(v as i128),
            DataObject::Integer32(v) => Some(v as i128),
            DataObject::Integer64(v) => Some(v as i128),
            DataObject::Unsigned8(v) => Some(v as i128),
            DataObject::Unsigned16(v) => Some(v as i128),
            DataObject::Unsigned32(v) => Some(v as i128),
            DataObject::Unsigned64(v) => Some(v as i128),
            _ => None,
        }
    }

    /// Encode to A-XDR, tag included
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            DataObject::Null => out.push(AxdrTag::Null as u8),
            DataObject::Boolean(v) => {
                out.push(AxdrTag::Boolean as u8);
                out.push(u8::from(*v));
            }
            DataObject::Integer8(v) => {
                out.push(AxdrTag::Integer8 as u8);
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataObject::Integer16(v) => {
                out.push(AxdrTag::Integer16 as u8);
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataObject::Integer32(v) => {
                out.push(AxdrTag::Integer32 as u8);
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataObject::Integer64(v) => {
                out.push(AxdrTag::Integer64 as u8);
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataObject::Unsigned8(v) => {
                out.push(AxdrTag::Unsigned8 as u8);
                out.push(*v);
            }
            DataObject::Unsigned16(v) => {
                out.push(AxdrTag::Unsigned16 as u8);
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataObject::Unsigned32(v) => {
                out.push(AxdrTag::Unsigned32 as u8);
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataObject::Unsigned64(v) => {
                out.push(AxdrTag::Unsigned64 as u8);
                out.extend_from_slice(&v.to_be_bytes());
            }
            DataObject::Float32(v) => {
                out.push(AxdrTag::Float32 as u8);
                out.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            DataObject::Float64(v) => {
                out.push(AxdrTag::Float64 as u8);
                out.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            DataObject::Enumerate(v) => {
                out.push(AxdrTag::Enumerate as u8);
                out.push(*v);
            }
            DataObject::OctetString(bytes) => {
                out.push(AxdrTag::OctetString as u8);
                encode_length(bytes.len(), out);
                out.extend_from_slice(bytes);
            }
            DataObject::VisibleString(bytes) => {
                out.push(AxdrTag::VisibleString as u8);
                encode_length(bytes.len(), out);
                out.extend_from_slice(bytes);
            }
            DataObject::Array(items) | DataObject::Structure(items) => {
                let tag = if matches!(self, DataObject::Array(_)) {
                    AxdrTag::Array
                } else {
                    AxdrTag::Structure
                };
                out.push(tag as u8);
                encode_length(items.len(), out);
                for item in items {
                    item.encode(out);
                }
            }
        }
    }
}

/// A-XDR variable length: one byte below 0x80, else 0x8N followed by N bytes
pub(crate) fn encode_length(length: usize, out: &mut Vec<u8>) {
    if length < 0x80 {
        out.push(length as u8);
    } else {
        let bytes = (length as u64).to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
}
