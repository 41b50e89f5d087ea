//! Register decoder: GET result to a value in Wh or W

use crate::codec::DecodedPayload;
use ziv_core::{DataObject, DataObjectType, DecodeError, Quantity, RegisterId};

/// Largest |scaler| accepted; 10^9 times any i64 still fits in i128
const MAX_SCALER: i8 = 9;

/// Turns a decoded payload into the integral reading of its register
///
/// Energy registers are counters and must come as unsigned integers. Power
/// registers may be signed; the 5CTM reports export on the import register as
/// a negative value, so a negative import reads 0 and a negative export reads
/// its magnitude.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisterDecoder;

impl RegisterDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, payload: &DecodedPayload, expected: RegisterId) -> Result<i64, DecodeError> {
        if payload.register != expected {
            return Err(DecodeError::RegisterMismatch {
                expected,
                found: payload.register,
            });
        }

        let raw = Self::raw_value(&payload.data, expected)?;
        let raw = match expected {
            RegisterId::ImportActivePower if raw < 0 => 0,
            RegisterId::ExportActivePower => raw.abs(),
            _ => raw,
        };

        let value = scale(raw, payload.scaler)?;
        log::trace!(
            "{}: raw {} scaler {} -> {} {}",
            expected,
            raw,
            payload.scaler,
            value,
            expected.unit()
        );
        Ok(value)
    }

    fn raw_value(data: &DataObject, register: RegisterId) -> Result<i128, DecodeError> {
        let accepted = match register.quantity() {
            Quantity::Energy => matches!(
                data,
                DataObject::Unsigned8(_)
                    | DataObject::Unsigned16(_)
                    | DataObject::Unsigned32(_)
                    | DataObject::Unsigned64(_)
            ),
            Quantity::Power => matches!(
                data,
                DataObject::Integer8(_)
                    | DataObject::Integer16(_)
                    | DataObject::Integer32(_)
                    | DataObject::Integer64(_)
                    | DataObject::Unsigned8(_)
                    | DataObject::Unsigned16(_)
                    | DataObject::Unsigned32(_)
            ),
        };
        match data.as_integer() {
            Some(raw) if accepted => Ok(raw),
            _ => Err(unsupported(register, data.get_type())),
        }
    }
}

fn unsupported(register: RegisterId, tag: DataObjectType) -> DecodeError {
    DecodeError::UnsupportedType { register, tag }
}

/// raw × 10^scaler, rounded half up, in i64
fn scale(raw: i128, scaler: i8) -> Result<i64, DecodeError> {
    let out_of_range = || DecodeError::ScalerOutOfRange { scaler, raw };
    if scaler.unsigned_abs() > MAX_SCALER.unsigned_abs() {
        return Err(out_of_range());
    }

    let factor = 10i128.pow(u32::from(scaler.unsigned_abs()));
    let scaled = if scaler >= 0 {
        raw.checked_mul(factor).ok_or_else(out_of_range)?
    } else {
        let quotient = raw.div_euclid(factor);
        let remainder = raw.rem_euclid(factor);
        if 2 * remainder >= factor {
            quotient + 1
        } else {
            quotient
        }
    };
    i64::try_from(scaled).map_err(|_| out_of_range())
}
