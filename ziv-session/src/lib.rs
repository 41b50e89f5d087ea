//! Session layer for the Ziv meter driver
//!
//! HDLC framing as used on the meter's optical/UART port: check sequences,
//! addresses, frame encoding and decoding, and the send/receive sequence
//! numbers of an open link.

pub mod hdlc;

pub use hdlc::*;
