use crate::datatypes::DataObjectType;
use crate::register::RegisterId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which check sequence of an HDLC frame failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumField {
    /// HCS, covering the frame header
    Header,
    /// FCS, covering the whole frame
    Frame,
}

impl fmt::Display for ChecksumField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumField::Header => write!(f, "HCS"),
            ChecksumField::Frame => write!(f, "FCS"),
        }
    }
}

/// Malformed or unexpected bytes on the wire
///
/// Raised by the frame codec. Decoding arbitrary input always resolves to one
/// of these variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame truncated: {actual} bytes, need at least {minimum}")]
    Truncated { actual: usize, minimum: usize },

    #[error("{field} mismatch: computed 0x{computed:04X}, received 0x{received:04X}")]
    ChecksumMismatch {
        field: ChecksumField,
        computed: u16,
        received: u16,
    },

    #[error("Response with invoke id {found} does not answer {expected}")]
    UnexpectedRegister { expected: RegisterId, found: u8 },

    #[error("Length field declares {declared} bytes, frame holds {actual}")]
    MalformedLength { declared: usize, actual: usize },

    #[error("Expected HDLC flag 0x7E, found 0x{0:02X}")]
    InvalidDelimiter(u8),

    #[error("Illegal frame format 0x{0:02X}")]
    InvalidFormat(u8),

    #[error("Unexpected address: {0}")]
    UnexpectedAddress(String),

    #[error("Unexpected control field 0x{0:02X}")]
    UnexpectedControl(u8),

    #[error("Unexpected APDU tag 0x{0:02X}")]
    UnexpectedApdu(u8),

    #[error("Meter denied access, data-access-result {0}")]
    DataAccess(u8),

    #[error("Association rejected, result {0}")]
    AssociationRejected(u8),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// A well-formed payload that cannot be turned into a reading
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Data type {tag:?} is not supported for {register}")]
    UnsupportedType {
        register: RegisterId,
        tag: DataObjectType,
    },

    #[error("Scaler 10^{scaler} out of range for raw value {raw}")]
    ScalerOutOfRange { scaler: i8, raw: i128 },

    #[error("Payload answers {found}, expected {expected}")]
    RegisterMismatch {
        expected: RegisterId,
        found: RegisterId,
    },
}

/// Channel-level failures of one request/response exchange
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("No complete frame within {0:?}")]
    Timeout(Duration),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Why a register has no reading in a poll cycle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Association failed: {0}")]
    Association(Box<PollError>),
}

impl PollError {
    /// Short label used for statistics and log lines
    pub fn kind(&self) -> &'static str {
        match self {
            PollError::Transport(TransportError::Timeout(_)) => "timeout",
            PollError::Transport(_) => "transport",
            PollError::Frame(_) => "frame",
            PollError::Decode(_) => "decode",
            PollError::Association(_) => "association",
        }
    }
}

/// Rejected configuration, raised once at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Polling interval {interval:?} is below the minimum of {minimum:?}")]
    IntervalTooShort { interval: Duration, minimum: Duration },

    #[error("Baud rate {0} is not supported, the meter talks at 9600")]
    BaudRate(u32),

    #[error("Serial {0} line is required for request/response")]
    MissingLine(&'static str),

    #[error("Serial port name is empty")]
    MissingPort,

    #[error("{0} must be non-zero")]
    ZeroTimeout(&'static str),

    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Password is {length} bytes long, at most {maximum} are allowed")]
    InvalidPassword { length: usize, maximum: usize },

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("Config read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Main error type of the driver crates
#[derive(Error, Debug)]
pub enum ZivError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias for driver operations
pub type ZivResult<T> = Result<T, ZivError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_error_kind() {
        let timeout = PollError::from(TransportError::Timeout(Duration::from_secs(2)));
        assert_eq!(timeout.kind(), "timeout");
        assert_eq!(PollError::from(TransportError::ChannelClosed).kind(), "transport");
        let assoc = PollError::Association(Box::new(timeout));
        assert_eq!(assoc.kind(), "association");
    }

    #[test]
    fn test_checksum_display() {
        let err = FrameError::ChecksumMismatch {
            field: ChecksumField::Header,
            computed: 0x1234,
            received: 0xABCD,
        };
        assert_eq!(err.to_string(), "HCS mismatch: computed 0x1234, received 0xABCD");
    }
}
