//! HDLC frame structure and encoding/decoding
//!
//! Frame format type 3, no byte stuffing:
//!
//! ```text
//! 7E | A0|len | dst | src | ctrl | HCS | information | FCS | 7E
//! ```
//!
//! The length counts every byte between the flags. Frames without an
//! information field carry only the FCS after the control byte.

use crate::hdlc::address::{HdlcAddress, HdlcAddressPair};
use crate::hdlc::fcs::FcsCalc;
use std::fmt;
use ziv_core::{ChecksumField, FrameError};

/// HDLC frame flag
pub const FLAG: u8 = 0x7E;

/// LLC header of a client request
pub const LLC_REQUEST: [u8; 3] = [0xE6, 0xE6, 0x00];

/// LLC header of a server response
pub const LLC_RESPONSE: [u8; 3] = [0xE6, 0xE7, 0x00];

const FORMAT_TYPE_3: u8 = 0xA0;
const SEGMENTATION_BIT: u8 = 0x08;
const MAX_FRAME_LENGTH: usize = 0x07FF;

/// Poll/final bit of the control field
pub const POLL_FINAL: u8 = 0x10;

/// SNRM command, poll bit set
pub const SNRM_CONTROL: u8 = 0x83 | POLL_FINAL;

/// Smallest complete frame: flags, format, two 1-byte addresses, control, FCS
pub const MIN_FRAME_LENGTH: usize = 9;

/// HDLC frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Information,
    ReceiveReady,
    ReceiveNotReady,
    SetNormalResponseMode,
    Disconnect,
    UnnumberedAcknowledge,
    DisconnectMode,
    FrameReject,
    UnnumberedInformation,
    InvalidType,
}

impl FrameType {
    /// Get frame type from control byte
    pub fn from_control_byte(control_byte: u8) -> Self {
        match control_byte {
            x if (x & 0x01) == 0x00 => FrameType::Information,
            x if (x & 0x0F) == 0x01 => FrameType::ReceiveReady,
            x if (x & 0x0F) == 0x05 => FrameType::ReceiveNotReady,
            x if (x & 0xEF) == 0x83 => FrameType::SetNormalResponseMode,
            x if (x & 0xEF) == 0x43 => FrameType::Disconnect,
            x if (x & 0xEF) == 0x63 => FrameType::UnnumberedAcknowledge,
            x if (x & 0xEF) == 0x0F => FrameType::DisconnectMode,
            x if (x & 0xEF) == 0x87 => FrameType::FrameReject,
            x if (x & 0xEF) == 0x03 => FrameType::UnnumberedInformation,
            _ => FrameType::InvalidType,
        }
    }
}

/// HDLC frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdlcFrame {
    address_pair: HdlcAddressPair,
    control: u8,
    information: Vec<u8>,
    segmented: bool,
}

impl HdlcFrame {
    /// Frame without information field
    pub fn new(address_pair: HdlcAddressPair, control: u8) -> Self {
        Self {
            address_pair,
            control,
            information: Vec::new(),
            segmented: false,
        }
    }

    /// Frame carrying `information`
    pub fn with_information(
        address_pair: HdlcAddressPair,
        control: u8,
        information: Vec<u8>,
    ) -> Self {
        Self {
            address_pair,
            control,
            information,
            segmented: false,
        }
    }

    /// Encode frame to bytes, flags included
    ///
    /// The information field must fit the 11-bit length field; callers only
    /// build frames of a few dozen bytes.
    pub fn encode(&self) -> Vec<u8> {
        let destination = self.address_pair.destination();
        let source = self.address_pair.source();
        let header_length = 2 + destination.byte_length() + source.byte_length() + 1;
        let length = if self.information.is_empty() {
            header_length + 2
        } else {
            header_length + 2 + self.information.len() + 2
        };
        debug_assert!(length <= MAX_FRAME_LENGTH, "frame too long: {}", length);

        let mut out = Vec::with_capacity(length + 2);
        out.push(FLAG);
        let mut format = FORMAT_TYPE_3 | ((length >> 8) as u8 & 0x07);
        if self.segmented {
            format |= SEGMENTATION_BIT;
        }
        out.push(format);
        out.push((length & 0xFF) as u8);
        destination.encode_into(&mut out);
        source.encode_into(&mut out);
        out.push(self.control);

        if !self.information.is_empty() {
            let hcs = FcsCalc::checksum(&out[1..]);
            out.extend_from_slice(&hcs.to_le_bytes());
            out.extend_from_slice(&self.information);
        }
        let fcs = FcsCalc::checksum(&out[1..]);
        out.extend_from_slice(&fcs.to_le_bytes());
        out.push(FLAG);
        out
    }

    /// Decode one complete frame, flags included
    ///
    /// Checks delimiters, format, the declared length and both check
    /// sequences. Never panics, whatever the input.
    pub fn decode(frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() < MIN_FRAME_LENGTH {
            return Err(FrameError::Truncated {
                actual: frame.len(),
                minimum: MIN_FRAME_LENGTH,
            });
        }
        if frame[0] != FLAG {
            return Err(FrameError::InvalidDelimiter(frame[0]));
        }
        let last = frame[frame.len() - 1];
        if last != FLAG {
            return Err(FrameError::InvalidDelimiter(last));
        }

        let body = &frame[1..frame.len() - 1];
        let format = body[0];
        if format & 0xF0 != FORMAT_TYPE_3 {
            return Err(FrameError::InvalidFormat(format));
        }
        let declared = (((format & 0x07) as usize) << 8) | body[1] as usize;
        if declared != body.len() {
            return Err(FrameError::MalformedLength {
                declared,
                actual: body.len(),
            });
        }
        let segmented = format & SEGMENTATION_BIT != 0;

        let mut pos = 2;
        let (destination, len) = HdlcAddress::decode(&body[pos..])?;
        pos += len;
        let (source, len) = HdlcAddress::decode(&body[pos..])?;
        pos += len;
        let control = *body.get(pos).ok_or(FrameError::Truncated {
            actual: frame.len(),
            minimum: frame.len() + 1,
        })?;
        pos += 1;

        let fcs_pos = body.len() - 2;
        let information = match fcs_pos.checked_sub(pos) {
            None | Some(1) => {
                return Err(FrameError::Truncated {
                    actual: frame.len(),
                    minimum: frame.len() + 1,
                });
            }
            Some(0) => Vec::new(),
            Some(_) => {
                verify(ChecksumField::Header, &body[..pos], &body[pos..pos + 2])?;
                body[pos + 2..fcs_pos].to_vec()
            }
        };
        verify(ChecksumField::Frame, &body[..fcs_pos], &body[fcs_pos..])?;

        Ok(Self {
            address_pair: HdlcAddressPair::new(source, destination),
            control,
            information,
            segmented,
        })
    }

    pub fn frame_type(&self) -> FrameType {
        FrameType::from_control_byte(self.control)
    }

    pub fn control(&self) -> u8 {
        self.control
    }

    pub fn information(&self) -> &[u8] {
        &self.information
    }

    pub fn is_segmented(&self) -> bool {
        self.segmented
    }

    pub fn address_pair(&self) -> HdlcAddressPair {
        self.address_pair
    }

    /// Send sequence number of an information frame
    pub fn send_sequence(&self) -> Option<u8> {
        (self.frame_type() == FrameType::Information).then_some((self.control >> 1) & 0x07)
    }

    /// Receive sequence number of an information or supervisory frame
    pub fn receive_sequence(&self) -> Option<u8> {
        match self.frame_type() {
            FrameType::Information | FrameType::ReceiveReady | FrameType::ReceiveNotReady => {
                Some(self.control >> 5)
            }
            _ => None,
        }
    }
}

fn verify(field: ChecksumField, covered: &[u8], received: &[u8]) -> Result<(), FrameError> {
    let computed = FcsCalc::checksum(covered);
    let received = u16::from_le_bytes([received[0], received[1]]);
    if computed != received {
        return Err(FrameError::ChecksumMismatch {
            field,
            computed,
            received,
        });
    }
    Ok(())
}

impl fmt::Display for HdlcFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HDLC Frame: type={:?}, ctrl=0x{:02X}, src={}, dst={}, info={} bytes",
            self.frame_type(),
            self.control,
            self.address_pair.source(),
            self.address_pair.destination(),
            self.information.len()
        )
    }
}
