//! HDLC session layer module

pub mod address;
pub mod fcs;
pub mod frame;
pub mod sequence;

pub use address::{HdlcAddress, HdlcAddressPair};
pub use fcs::FcsCalc;
pub use frame::{
    FLAG, FrameType, HdlcFrame, LLC_REQUEST, LLC_RESPONSE, MIN_FRAME_LENGTH, POLL_FINAL,
    SNRM_CONTROL,
};
pub use sequence::HdlcSequence;
