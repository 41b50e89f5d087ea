//! xDLMS APDUs exchanged with the meter
//!
//! Only what a logical-name client with LOW authentication needs to read
//! Register values: the association request/response and GET-Normal.

use ziv_core::{AxdrDecoder, DataObject, FrameError, ObisCode};

/// APDU tags
pub mod tags {
    pub const AARQ: u8 = 0x60;
    pub const AARE: u8 = 0x61;
    pub const GET_REQUEST: u8 = 0xC0;
    pub const GET_RESPONSE: u8 = 0xC4;
    pub const INITIATE_REQUEST: u8 = 0x01;
    pub const INITIATE_RESPONSE: u8 = 0x08;
    pub const CONFIRMED_SERVICE_ERROR: u8 = 0x0E;
}

/// Application context name: logical name referencing, no ciphering
const LN_CONTEXT: [u8; 7] = [0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01];

/// Mechanism name: LOW level security
const LOW_MECHANISM: [u8; 7] = [0x60, 0x85, 0x74, 0x05, 0x08, 0x02, 0x01];

/// DLMS version proposed in the InitiateRequest
pub const DLMS_VERSION: u8 = 6;

/// GET, SET, ACTION, selective access, multiple references and block transfer
pub const DEFAULT_CONFORMANCE: u32 = 0x00_7E1F;

/// Largest APDU the client accepts
pub const DEFAULT_MAX_PDU_SIZE: u16 = 0x04B0;

const GET_REQUEST_NORMAL: u8 = 0x01;
const GET_RESPONSE_NORMAL: u8 = 0x01;
const GET_RESPONSE_WITH_DATABLOCK: u8 = 0x02;

/// Invoke-Id-And-Priority byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeIdAndPriority {
    invoke_id: u8,
    high_priority: bool,
}

impl InvokeIdAndPriority {
    /// Confirmed service with `invoke_id` in 0..=15
    pub fn new(invoke_id: u8, high_priority: bool) -> Result<Self, FrameError> {
        if invoke_id > 0x0F {
            return Err(FrameError::InvalidData(format!(
                "Invoke id {} does not fit in 4 bits",
                invoke_id
            )));
        }
        Ok(Self {
            invoke_id,
            high_priority,
        })
    }

    pub fn from_byte(byte: u8) -> Self {
        Self {
            invoke_id: byte & 0x0F,
            high_priority: byte & 0x80 != 0,
        }
    }

    pub fn invoke_id(&self) -> u8 {
        self.invoke_id
    }

    pub fn to_byte(&self) -> u8 {
        let priority = if self.high_priority { 0x80 } else { 0x00 };
        priority | 0x40 | self.invoke_id
    }
}

/// xDLMS InitiateRequest, carried in the AARQ user-information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitiateRequest {
    pub conformance: u32,
    pub max_pdu_size: u16,
}

impl Default for InitiateRequest {
    fn default() -> Self {
        Self {
            conformance: DEFAULT_CONFORMANCE,
            max_pdu_size: DEFAULT_MAX_PDU_SIZE,
        }
    }
}

impl InitiateRequest {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(tags::INITIATE_REQUEST);
        out.push(0x00); // dedicated-key absent
        out.push(0x00); // response-allowed, default
        out.push(0x00); // proposed-quality-of-service absent
        out.push(DLMS_VERSION);
        // conformance, [APPLICATION 31] BIT STRING of 24 bits
        out.extend_from_slice(&[0x5F, 0x1F, 0x04, 0x00]);
        out.extend_from_slice(&self.conformance.to_be_bytes()[1..]);
        out.extend_from_slice(&self.max_pdu_size.to_be_bytes());
    }
}

/// xDLMS InitiateResponse, carried in the AARE user-information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitiateResponse {
    pub version: u8,
    pub conformance: u32,
    pub max_pdu_size: u16,
    pub vaa_name: u16,
}

impl InitiateResponse {
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let mut reader = AxdrDecoder::new(data);
        let tag = reader.read_byte()?;
        if tag != tags::INITIATE_RESPONSE {
            return Err(FrameError::UnexpectedApdu(tag));
        }
        // negotiated-quality-of-service, optional
        if reader.read_byte()? != 0x00 {
            reader.read_byte()?;
        }
        let version = reader.read_byte()?;
        let header = reader.decode_fixed_bytes(4)?;
        if header[..3] != [0x5F, 0x1F, 0x04] {
            return Err(FrameError::InvalidData(
                "InitiateResponse without conformance block".to_string(),
            ));
        }
        let bits = reader.decode_fixed_bytes(3)?;
        let conformance = u32::from_be_bytes([0, bits[0], bits[1], bits[2]]);
        let pdu = reader.decode_fixed_bytes(2)?;
        let vaa = reader.decode_fixed_bytes(2)?;

        Ok(Self {
            version,
            conformance,
            max_pdu_size: u16::from_be_bytes([pdu[0], pdu[1]]),
            vaa_name: u16::from_be_bytes([vaa[0], vaa[1]]),
        })
    }
}

/// Association request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AarqApdu {
    /// LOW authentication secret, empty for no authentication
    pub password: Vec<u8>,
    pub initiate: InitiateRequest,
}

impl AarqApdu {
    pub fn new(password: impl Into<Vec<u8>>) -> Self {
        Self {
            password: password.into(),
            initiate: InitiateRequest::default(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();

        push_tlv(&mut body, 0xA1, &tlv(0x06, &LN_CONTEXT));
        if !self.password.is_empty() {
            // sender-acse-requirements: authentication
            body.extend_from_slice(&[0x8A, 0x02, 0x07, 0x80]);
            push_tlv(&mut body, 0x8B, &LOW_MECHANISM);
            push_tlv(&mut body, 0xAC, &tlv(0x80, &self.password));
        }
        let mut initiate = Vec::new();
        self.initiate.encode(&mut initiate);
        push_tlv(&mut body, 0xBE, &tlv(0x04, &initiate));

        tlv(tags::AARQ, &body)
    }
}

/// Association response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AareApdu {
    /// 0 accepted, 1 rejected-permanent, 2 rejected-transient
    pub result: u8,
    pub diagnostic: Option<u8>,
    pub initiate: Option<InitiateResponse>,
    /// Confirmed-service-error carried instead of an InitiateResponse
    pub service_error: Option<Vec<u8>>,
}

impl AareApdu {
    pub fn is_accepted(&self) -> bool {
        self.result == 0
    }

    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let mut reader = AxdrDecoder::new(data);
        let tag = reader.read_byte()?;
        if tag != tags::AARE {
            return Err(FrameError::UnexpectedApdu(tag));
        }
        let len = reader.decode_length()?;
        let body = reader.decode_fixed_bytes(len)?;

        let mut result = None;
        let mut diagnostic = None;
        let mut initiate = None;
        let mut service_error = None;

        let mut reader = AxdrDecoder::new(&body);
        while reader.remaining() > 0 {
            let tag = reader.read_byte()?;
            let len = reader.decode_length()?;
            let value = reader.decode_fixed_bytes(len)?;
            match tag {
                // result: INTEGER
                0xA2 => result = Some(last_integer(&value)?),
                // result-source-diagnostic: CHOICE { acse-service-user, -provider }
                0xA3 => diagnostic = Some(last_integer(&value)?),
                0xBE => {
                    let mut inner = AxdrDecoder::new(&value);
                    if inner.read_byte()? != 0x04 {
                        return Err(FrameError::InvalidData(
                            "user-information is not an OCTET STRING".to_string(),
                        ));
                    }
                    let len = inner.decode_length()?;
                    let apdu = inner.decode_fixed_bytes(len)?;
                    match apdu.first() {
                        Some(&tags::INITIATE_RESPONSE) => {
                            initiate = Some(InitiateResponse::decode(&apdu)?)
                        }
                        Some(&tags::CONFIRMED_SERVICE_ERROR) => service_error = Some(apdu),
                        Some(&other) => return Err(FrameError::UnexpectedApdu(other)),
                        None => {}
                    }
                }
                _ => {}
            }
        }

        let result = result
            .ok_or_else(|| FrameError::InvalidData("AARE without result".to_string()))?;
        Ok(Self {
            result,
            diagnostic,
            initiate,
            service_error,
        })
    }
}

/// GET-Request-Normal for one attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetRequestNormal {
    pub invoke: InvokeIdAndPriority,
    pub class_id: u16,
    pub obis: ObisCode,
    pub attribute: u8,
}

impl GetRequestNormal {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(tags::GET_REQUEST);
        out.push(GET_REQUEST_NORMAL);
        out.push(self.invoke.to_byte());
        out.extend_from_slice(&self.class_id.to_be_bytes());
        out.extend_from_slice(self.obis.as_bytes());
        out.push(self.attribute);
        out.push(0x00); // no selective access
    }
}

/// Get-Data-Result
#[derive(Debug, Clone, PartialEq)]
pub enum GetResult {
    Data(DataObject),
    /// Data-Access-Result code
    DataAccessError(u8),
}

/// GET-Response-Normal
#[derive(Debug, Clone, PartialEq)]
pub struct GetResponseNormal {
    pub invoke: InvokeIdAndPriority,
    pub result: GetResult,
}

impl GetResponseNormal {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(tags::GET_RESPONSE);
        out.push(GET_RESPONSE_NORMAL);
        out.push(self.invoke.to_byte());
        match &self.result {
            GetResult::Data(data) => {
                out.push(0x00);
                data.encode(out);
            }
            GetResult::DataAccessError(code) => {
                out.push(0x01);
                out.push(*code);
            }
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let mut reader = AxdrDecoder::new(data);
        let tag = reader.read_byte()?;
        if tag != tags::GET_RESPONSE {
            return Err(FrameError::UnexpectedApdu(tag));
        }
        match reader.read_byte()? {
            GET_RESPONSE_NORMAL => {}
            GET_RESPONSE_WITH_DATABLOCK => {
                return Err(FrameError::InvalidData(
                    "Block transfer is not supported".to_string(),
                ));
            }
            other => {
                return Err(FrameError::InvalidData(format!(
                    "Unknown GET-Response choice {}",
                    other
                )));
            }
        }
        let invoke = InvokeIdAndPriority::from_byte(reader.read_byte()?);
        let result = match reader.read_byte()? {
            0x00 => GetResult::Data(reader.decode_data_object()?),
            0x01 => GetResult::DataAccessError(reader.read_byte()?),
            other => {
                return Err(FrameError::InvalidData(format!(
                    "Unknown Get-Data-Result choice {}",
                    other
                )));
            }
        };
        Ok(Self { invoke, result })
    }
}

fn tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 4);
    push_tlv(&mut out, tag, value);
    out
}

fn push_tlv(out: &mut Vec<u8>, tag: u8, value: &[u8]) {
    out.push(tag);
    let len = value.len();
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xFF {
        out.extend_from_slice(&[0x81, len as u8]);
    } else {
        out.push(0x82);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    }
    out.extend_from_slice(value);
}

/// Value of the innermost INTEGER, e.g. `02 01 00` or `A1 03 02 01 00`
fn last_integer(value: &[u8]) -> Result<u8, FrameError> {
    match value {
        [.., 0x02, 0x01, v] => Ok(*v),
        _ => Err(FrameError::InvalidData(
            "Expected a one byte INTEGER".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aarq_low_authentication() {
        let aarq = AarqApdu::new(b"00000001".to_vec()).encode();
        let expected = vec![
            0x60, 0x36, 0xA1, 0x09, 0x06, 0x07, 0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01, 0x8A,
            0x02, 0x07, 0x80, 0x8B, 0x07, 0x60, 0x85, 0x74, 0x05, 0x08, 0x02, 0x01, 0xAC, 0x0A,
            0x80, 0x08, 0x30, 0x30, 0x30, 0x30, 0x30, 0x30, 0x30, 0x31, 0xBE, 0x10, 0x04, 0x0E,
            0x01, 0x00, 0x00, 0x00, 0x06, 0x5F, 0x1F, 0x04, 0x00, 0x00, 0x7E, 0x1F, 0x04, 0xB0,
        ];
        assert_eq!(aarq, expected);
    }

    #[test]
    fn test_aarq_without_password() {
        let aarq = AarqApdu::new(Vec::new()).encode();
        assert_eq!(aarq[0], tags::AARQ);
        assert!(!aarq.contains(&0xAC));
    }

    #[test]
    fn test_aare_accepted() {
        let aare = [
            0x61, 0x29, 0xA1, 0x09, 0x06, 0x07, 0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01, 0xA2,
            0x03, 0x02, 0x01, 0x00, 0xA3, 0x05, 0xA1, 0x03, 0x02, 0x01, 0x00, 0xBE, 0x10, 0x04,
            0x0E, 0x08, 0x00, 0x06, 0x5F, 0x1F, 0x04, 0x00, 0x00, 0x10, 0x1D, 0x00, 0xEF, 0x00,
            0x07,
        ];
        let apdu = AareApdu::decode(&aare).unwrap();
        assert!(apdu.is_accepted());
        assert_eq!(apdu.diagnostic, Some(0));
        let initiate = apdu.initiate.unwrap();
        assert_eq!(initiate.version, 6);
        assert_eq!(initiate.conformance, 0x00_101D);
        assert_eq!(initiate.max_pdu_size, 0x00EF);
        assert_eq!(initiate.vaa_name, 0x0007);
    }

    #[test]
    fn test_aare_rejected() {
        let aare = [
            0x61, 0x10, 0xA2, 0x03, 0x02, 0x01, 0x01, 0xA3, 0x05, 0xA1, 0x03, 0x02, 0x01, 0x0D,
            0x88, 0x02, 0x07, 0x80,
        ];
        let apdu = AareApdu::decode(&aare).unwrap();
        assert!(!apdu.is_accepted());
        assert_eq!(apdu.result, 1);
        assert_eq!(apdu.diagnostic, Some(13));
    }

    #[test]
    fn test_aare_truncated() {
        let err = AareApdu::decode(&[0x61, 0x20, 0xA2, 0x03]).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { .. }));
        assert_eq!(
            AareApdu::decode(&[0x62, 0x00]).unwrap_err(),
            FrameError::UnexpectedApdu(0x62)
        );
    }

    #[test]
    fn test_get_request_normal() {
        let request = GetRequestNormal {
            invoke: InvokeIdAndPriority::new(1, true).unwrap(),
            class_id: 3,
            obis: ObisCode::new(1, 0, 1, 8, 0, 255),
            attribute: 2,
        };
        let mut out = Vec::new();
        request.encode(&mut out);
        assert_eq!(
            out,
            vec![0xC0, 0x01, 0xC1, 0x00, 0x03, 0x01, 0x00, 0x01, 0x08, 0x00, 0xFF, 0x02, 0x00]
        );
    }

    #[test]
    fn test_get_response_decode() {
        let data = [0xC4, 0x01, 0xC2, 0x00, 0x06, 0x00, 0x00, 0x30, 0x39];
        let response = GetResponseNormal::decode(&data).unwrap();
        assert_eq!(response.invoke.invoke_id(), 2);
        assert_eq!(response.result, GetResult::Data(DataObject::Unsigned32(12345)));

        let error = GetResponseNormal::decode(&[0xC4, 0x01, 0xC1, 0x01, 0x04]).unwrap();
        assert_eq!(error.result, GetResult::DataAccessError(4));
    }

    #[test]
    fn test_get_response_rejects_block_transfer() {
        let err = GetResponseNormal::decode(&[0xC4, 0x02, 0xC1, 0x00]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidData(_)));
        assert_eq!(
            GetResponseNormal::decode(&[0xD8, 0x01, 0x02]).unwrap_err(),
            FrameError::UnexpectedApdu(0xD8)
        );
    }

    #[test]
    fn test_invoke_id_range() {
        assert!(InvokeIdAndPriority::new(16, true).is_err());
        assert_eq!(InvokeIdAndPriority::new(4, true).unwrap().to_byte(), 0xC4);
        assert_eq!(InvokeIdAndPriority::new(4, false).unwrap().to_byte(), 0x44);
    }
}
