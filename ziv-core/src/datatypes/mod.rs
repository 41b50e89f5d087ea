//! Data types used in DLMS/COSEM protocol

pub mod axdr;
pub mod data_object;

pub use axdr::{AxdrDecoder, AxdrTag};
pub use data_object::{DataObject, DataObjectType};
