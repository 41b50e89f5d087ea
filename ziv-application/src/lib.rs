//! Application layer for the Ziv meter driver
//!
//! This crate turns register reads into wire frames and back:
//!
//! - [`pdu`]: the handful of xDLMS APDUs the driver exchanges (AARQ/AARE,
//!   GET-Request/Response)
//! - [`codec`]: [`FrameCodec`], wrapping APDUs in HDLC frames for one link
//! - [`register_decoder`]: [`RegisterDecoder`], turning a GET result into a
//!   value in Wh or W

pub mod codec;
#[cfg(any(test, feature = "test-util"))]
pub mod fixtures;
pub mod pdu;
pub mod register_decoder;

pub use codec::{DecodedPayload, FrameCodec, InformationFrame};
pub use pdu::{
    AareApdu, AarqApdu, GetRequestNormal, GetResponseNormal, GetResult, InitiateRequest,
    InitiateResponse, InvokeIdAndPriority,
};
pub use register_decoder::RegisterDecoder;
