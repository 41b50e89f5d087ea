//! Raw frames as they travel over the serial line

use std::fmt;
use std::ops::Deref;

/// Bytes of one request, ready to be written in a single call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame(Vec<u8>);

/// Bytes of one received frame, not yet validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame(Vec<u8>);

macro_rules! byte_frame {
    ($name:ident) => {
        impl $name {
            pub fn new(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn into_bytes(self) -> Vec<u8> {
                self.0
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(bytes: Vec<u8>) -> Self {
                Self(bytes)
            }
        }

        impl Deref for $name {
            type Target = [u8];

            fn deref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                HexBytes(&self.0).fmt(f)
            }
        }
    };
}

byte_frame!(RequestFrame);
byte_frame!(ResponseFrame);

/// Space separated hex dump for log lines
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump() {
        let frame = RequestFrame::new(vec![0x7E, 0xA0, 0x08]);
        assert_eq!(frame.to_string(), "7E A0 08");
        assert_eq!(HexBytes(&[]).to_string(), "");
        assert_eq!(frame.len(), 3);
    }
}
