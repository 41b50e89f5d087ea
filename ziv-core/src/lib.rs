//! Core types for the Ziv 5CTM meter driver
//!
//! This crate provides the types shared by every layer of the driver: the
//! closed set of meter registers, readings and poll outcomes, the error
//! taxonomy, the validated meter configuration, and the small subset of
//! DLMS/COSEM data types needed to read numeric registers.

pub mod config;
pub mod datatypes;
pub mod error;
pub mod obis_code;
pub mod reading;
pub mod register;
pub mod wire;

pub use config::{
    DEFAULT_INTER_BYTE_TIMEOUT, DEFAULT_RESPONSE_TIMEOUT, LinkConfig, MAX_PASSWORD_LEN,
    MIN_POLL_INTERVAL, MeterConfig, MeterConfigBuilder, PollInterval, REQUIRED_BAUD_RATE,
    SerialConfig,
};
pub use datatypes::{AxdrDecoder, AxdrTag, DataObject, DataObjectType};
pub use error::{
    ChecksumField, ConfigError, DecodeError, FrameError, PollError, TransportError, ZivError,
    ZivResult,
};
pub use obis_code::ObisCode;
pub use reading::{PollEntry, PollOutcome, Reading};
pub use register::{Quantity, RegisterId, RegisterSet, RegisterSpec, Unit};
pub use wire::{HexBytes, RequestFrame, ResponseFrame};
