//! Transport layer for the Ziv meter driver
//!
//! A [`ByteChannel`] is the byte pipe to the meter; [`TransportSession`] runs
//! one request/response exchange over it under a deadline.

pub mod channel;
pub mod serial;
pub mod session;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use channel::{ByteChannel, StreamChannel};
pub use serial::{SerialChannel, SerialSettings};
pub use session::TransportSession;
