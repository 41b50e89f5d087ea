//! A-XDR decoding of the data types a register read returns

use crate::datatypes::data_object::DataObject;
use crate::error::FrameError;

/// Nesting limit for arrays and structures
const MAX_DEPTH: usize = 8;

/// A-XDR tag values for different data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxdrTag {
    Null = 0x00,
    Array = 0x01,
    Structure = 0x02,
    Boolean = 0x03,
    Integer32 = 0x05,
    Unsigned32 = 0x06,
    OctetString = 0x09,
    VisibleString = 0x0A,
    Integer8 = 0x0F,
    Integer16 = 0x10,
    Unsigned8 = 0x11,
    Unsigned16 = 0x12,
    Integer64 = 0x14,
    Unsigned64 = 0x15,
    Enumerate = 0x16,
    Float32 = 0x17,
    Float64 = 0x18,
}

impl AxdrTag {
    /// Get tag from u8 value
    pub fn from_u8(value: u8) -> Result<Self, FrameError> {
        match value {
            0x00 => Ok(AxdrTag::Null),
            0x01 => Ok(AxdrTag::Array),
            0x02 => Ok(AxdrTag::Structure),
            0x03 => Ok(AxdrTag::Boolean),
            0x05 => Ok(AxdrTag::Integer32),
            0x06 => Ok(AxdrTag::Unsigned32),
            0x09 => Ok(AxdrTag::OctetString),
            0x0A => Ok(AxdrTag::VisibleString),
            0x0F => Ok(AxdrTag::Integer8),
            0x10 => Ok(AxdrTag::Integer16),
            0x11 => Ok(AxdrTag::Unsigned8),
            0x12 => Ok(AxdrTag::Unsigned16),
            0x14 => Ok(AxdrTag::Integer64),
            0x15 => Ok(AxdrTag::Unsigned64),
            0x16 => Ok(AxdrTag::Enumerate),
            0x17 => Ok(AxdrTag::Float32),
            0x18 => Ok(AxdrTag::Float64),
            _ => Err(FrameError::InvalidData(format!(
                "Unknown A-XDR tag: 0x{:02X}",
                value
            ))),
        }
    }
}

/// A-XDR decoder over a borrowed buffer
pub struct AxdrDecoder<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> AxdrDecoder<'a> {
    /// Create a new decoder
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }

    /// Decode a DataObject
    pub fn decode_data_object(&mut self) -> Result<DataObject, FrameError> {
        self.decode_nested(0)
    }

    fn decode_nested(&mut self, depth: usize) -> Result<DataObject, FrameError> {
        let tag = AxdrTag::from_u8(self.read_byte()?)?;

        let value = match tag {
            AxdrTag::Null => DataObject::Null,
            AxdrTag::Boolean => DataObject::Boolean(self.read_byte()? != 0x00),
            AxdrTag::Integer8 => DataObject::Integer8(self.read_byte()? as i8),
            AxdrTag::Integer16 => DataObject::Integer16(i16::from_be_bytes(self.read_array()?)),
            AxdrTag::Integer32 => DataObject::Integer32(i32::from_be_bytes(self.read_array()?)),
            AxdrTag::Integer64 => DataObject::Integer64(i64::from_be_bytes(self.read_array()?)),
            AxdrTag::Unsigned8 => DataObject::Unsigned8(self.read_byte()?),
            AxdrTag::Unsigned16 => DataObject::Unsigned16(u16::from_be_bytes(self.read_array()?)),
            AxdrTag::Unsigned32 => DataObject::Unsigned32(u32::from_be_bytes(self.read_array()?)),
            AxdrTag::Unsigned64 => DataObject::Unsigned64(u64::from_be_bytes(self.read_array()?)),
            AxdrTag::Enumerate => DataObject::Enumerate(self.read_byte()?),
            AxdrTag::Float32 => {
                DataObject::Float32(f32::from_bits(u32::from_be_bytes(self.read_array()?)))
            }
            AxdrTag::Float64 => {
                DataObject::Float64(f64::from_bits(u64::from_be_bytes(self.read_array()?)))
            }
            AxdrTag::OctetString => DataObject::OctetString(self.decode_octet_string()?),
            AxdrTag::VisibleString => DataObject::VisibleString(self.decode_octet_string()?),
            AxdrTag::Array | AxdrTag::Structure => {
                if depth >= MAX_DEPTH {
                    return Err(FrameError::InvalidData(format!(
                        "Data nested deeper than {} levels",
                        MAX_DEPTH
                    )));
                }
                let count = self.decode_length()?;
                // every element takes at least one byte
                if count > self.remaining() {
                    return Err(self.short(count));
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.decode_nested(depth + 1)?);
                }
                if tag == AxdrTag::Array {
                    DataObject::Array(items)
                } else {
                    DataObject::Structure(items)
                }
            }
        };
        Ok(value)
    }

    /// Decode an A-XDR variable length field
    pub fn decode_length(&mut self) -> Result<usize, FrameError> {
        let first = self.read_byte()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }

        let count = (first & 0x7F) as usize;
        if count == 0 || count > 4 {
            return Err(FrameError::InvalidData(format!(
                "Unsupported length encoding 0x{:02X}",
                first
            )));
        }
        let mut length = 0usize;
        for _ in 0..count {
            length = (length << 8) | self.read_byte()? as usize;
        }
        Ok(length)
    }

    /// Decode an octet string
    pub fn decode_octet_string(&mut self) -> Result<Vec<u8>, FrameError> {
        let len = self.decode_length()?;
        self.decode_fixed_bytes(len)
    }

    /// Decode fixed-length bytes
    pub fn decode_fixed_bytes(&mut self, len: usize) -> Result<Vec<u8>, FrameError> {
        if len > self.remaining() {
            return Err(self.short(len));
        }

        let result = self.buffer[self.position..self.position + len].to_vec();
        self.position += len;
        Ok(result)
    }

    /// Read a single byte
    pub fn read_byte(&mut self) -> Result<u8, FrameError> {
        if self.position >= self.buffer.len() {
            return Err(self.short(1));
        }
        let byte = self.buffer[self.position];
        self.position += 1;
        Ok(byte)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], FrameError> {
        if N > self.remaining() {
            return Err(self.short(N));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buffer[self.position..self.position + N]);
        self.position += N;
        Ok(out)
    }

    fn short(&self, needed: usize) -> FrameError {
        FrameError::Truncated {
            actual: self.buffer.len(),
            minimum: self.position + needed,
        }
    }

    /// Get current position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Get remaining bytes
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }
}
