//! Send/receive sequence numbers of an open HDLC link

use crate::hdlc::frame::{FrameType, POLL_FINAL};
use ziv_core::FrameError;

/// Sequence state of the client side of a link
///
/// Both counters are modulo 8 and reset whenever the link is set up again
/// with SNRM. The state only moves forward through [`acknowledge`], i.e.
/// after a valid response.
///
/// [`acknowledge`]: HdlcSequence::acknowledge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HdlcSequence {
    send: u8,
    receive: u8,
}

impl HdlcSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to zero after a fresh SNRM/UA
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn send(&self) -> u8 {
        self.send
    }

    pub fn receive(&self) -> u8 {
        self.receive
    }

    /// Control byte of the next information frame, poll bit set
    pub fn information_control(&self) -> u8 {
        (self.receive << 5) | POLL_FINAL | (self.send << 1)
    }

    /// Accept the control byte of the meter's answer and move forward
    ///
    /// The answer must be an information frame that acknowledges our last
    /// frame and carries the send number we expect next.
    pub fn acknowledge(&mut self, control: u8) -> Result<(), FrameError> {
        if FrameType::from_control_byte(control) != FrameType::Information {
            return Err(FrameError::UnexpectedControl(control));
        }
        let their_send = (control >> 1) & 0x07;
        let their_receive = control >> 5;
        let next_send = (self.send + 1) % 8;
        if their_send != self.receive || their_receive != next_send {
            log::debug!(
                "Sequence mismatch: got N(S)={} N(R)={}, expected N(S)={} N(R)={}",
                their_send,
                their_receive,
                self.receive,
                next_send
            );
            return Err(FrameError::UnexpectedControl(control));
        }
        self.send = next_send;
        self.receive = (self.receive + 1) % 8;
        Ok(())
    }

    /// Control byte the meter sends when answering our next frame
    pub fn expected_response_control(&self) -> u8 {
        (((self.send + 1) % 8) << 5) | POLL_FINAL | (self.receive << 1)
    }
}
