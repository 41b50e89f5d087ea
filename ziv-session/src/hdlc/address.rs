//! HDLC address types

use std::fmt;
use ziv_core::FrameError;

const ONE_BYTE_UPPER_BOUND: u16 = 0x7F;
const TWO_BYTE_UPPER_BOUND: u16 = 0x3FFF;

/// HDLC address
///
/// Client addresses are one byte. Server addresses carry an upper (logical
/// device) and a lower (physical device) part and take two or four bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HdlcAddress {
    byte_length: usize,
    logical_id: u16,
    physical_id: u16,
}

impl HdlcAddress {
    /// Create a one-byte address
    pub fn new(logical_id: u16) -> Result<Self, FrameError> {
        if logical_id > ONE_BYTE_UPPER_BOUND {
            return Err(FrameError::InvalidData(format!(
                "One byte address exceeded upper bound of 0x{:02X}",
                ONE_BYTE_UPPER_BOUND
            )));
        }
        Ok(Self {
            byte_length: 1,
            logical_id,
            physical_id: 0,
        })
    }

    /// Create a server address from its logical and physical parts
    pub fn new_with_physical(logical_id: u16, physical_id: u16) -> Result<Self, FrameError> {
        let size = Self::address_size_of(logical_id)?.max(Self::address_size_of(physical_id)?);
        Ok(Self {
            byte_length: size * 2,
            logical_id,
            physical_id,
        })
    }

    fn address_size_of(address: u16) -> Result<usize, FrameError> {
        if address <= ONE_BYTE_UPPER_BOUND {
            Ok(1)
        } else if address <= TWO_BYTE_UPPER_BOUND {
            Ok(2)
        } else {
            Err(FrameError::InvalidData(format!(
                "Address 0x{:X} is out of upper bound 0x{:X}",
                address, TWO_BYTE_UPPER_BOUND
            )))
        }
    }

    pub fn logical_id(&self) -> u16 {
        self.logical_id
    }

    pub fn physical_id(&self) -> u16 {
        self.physical_id
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// Append the wire form, stop bit set on the last byte
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let half = self.byte_length.div_ceil(2);
        let lower = self.byte_length / 2;

        for i in 0..half {
            let shift = 7 * (half - i - 1);
            out.push((((self.logical_id >> shift) & 0x7F) << 1) as u8);
        }
        for i in 0..lower {
            let shift = 7 * (lower - i - 1);
            out.push((((self.physical_id >> shift) & 0x7F) << 1) as u8);
        }
        if let Some(last) = out.last_mut() {
            *last |= 1;
        }
    }

    /// Encode address to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_length);
        self.encode_into(&mut out);
        out
    }

    /// Read an address at the start of `data`
    ///
    /// Returns the address and the number of bytes it took.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), FrameError> {
        let length = match data.iter().take(4).position(|b| b & 0x01 != 0) {
            Some(i) => i + 1,
            None if data.len() < 4 => {
                return Err(FrameError::Truncated {
                    actual: data.len(),
                    minimum: data.len() + 1,
                });
            }
            None => {
                return Err(FrameError::UnexpectedAddress(
                    "address without stop bit".to_string(),
                ));
            }
        };

        let part = |bytes: &[u8]| bytes.iter().fold(0u16, |acc, b| (acc << 7) | (b >> 1) as u16);
        let address = match length {
            1 => Self {
                byte_length: 1,
                logical_id: part(&data[..1]),
                physical_id: 0,
            },
            2 | 4 => {
                let half = length / 2;
                Self {
                    byte_length: length,
                    logical_id: part(&data[..half]),
                    physical_id: part(&data[half..length]),
                }
            }
            _ => {
                return Err(FrameError::UnexpectedAddress(format!(
                    "invalid address length {}",
                    length
                )));
            }
        };
        Ok((address, length))
    }
}

impl fmt::Display for HdlcAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.byte_length.div_ceil(2) * 2;
        write!(f, "{:0width$X}", self.logical_id, width = width)?;
        if self.byte_length > 1 {
            write!(f, "-{:0width$X}", self.physical_id, width = width)?;
        }
        Ok(())
    }
}

/// HDLC address pair (source and destination)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HdlcAddressPair {
    source: HdlcAddress,
    destination: HdlcAddress,
}

impl HdlcAddressPair {
    pub fn new(source: HdlcAddress, destination: HdlcAddress) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn source(&self) -> HdlcAddress {
        self.source
    }

    pub fn destination(&self) -> HdlcAddress {
        self.destination
    }

    /// Same pair seen from the other end
    pub fn reversed(&self) -> Self {
        Self {
            source: self.destination,
            destination: self.source,
        }
    }
}
