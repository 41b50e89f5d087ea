//! Frame codec: register reads to HDLC frames and back
//!
//! The codec knows the link addresses and the password, nothing else. It
//! holds no mutable state; the HDLC sequence numbers are passed in by the
//! caller, so encoding the same register with the same sequence state always
//! yields the same bytes.

use crate::pdu::{
    AareApdu, AarqApdu, GetRequestNormal, GetResponseNormal, GetResult, InvokeIdAndPriority,
};
use ziv_core::register::{REGISTER_CLASS_ID, VALUE_ATTRIBUTE};
use ziv_core::{DataObject, FrameError, HexBytes, LinkConfig, RegisterId, RequestFrame};
use ziv_session::{
    FrameType, HdlcAddress, HdlcAddressPair, HdlcFrame, HdlcSequence, LLC_REQUEST, LLC_RESPONSE,
    SNRM_CONTROL,
};

/// Result of one register read, before scaling
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload {
    /// Register the response answers
    pub register: RegisterId,
    pub invoke_id: u8,
    /// HDLC control byte, for advancing the sequence state
    pub control: u8,
    pub data: DataObject,
    /// Power of ten to apply to `data`
    pub scaler: i8,
}

/// Information frame from the meter, HDLC layer checked
///
/// The control byte is valid even when the APDU inside turns out to be an
/// error, so the caller can keep its sequence state in step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InformationFrame {
    pub control: u8,
    apdu: Vec<u8>,
}

impl InformationFrame {
    /// APDU without the LLC header
    pub fn apdu(&self) -> &[u8] {
        &self.apdu
    }
}

/// Encoder/decoder for the frames of one client/meter link
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Client to meter
    addresses: HdlcAddressPair,
    password: Vec<u8>,
}

impl FrameCodec {
    /// Build the codec for `link`, checked with [`LinkConfig::validate`]
    pub fn new(link: &LinkConfig) -> Result<Self, FrameError> {
        link.validate().map_err(|e| FrameError::InvalidData(e.to_string()))?;
        let client = HdlcAddress::new(link.client_address)?;
        let server = HdlcAddress::new_with_physical(link.server_logical, link.server_physical)?;
        Ok(Self {
            addresses: HdlcAddressPair::new(client, server),
            password: link.password.as_bytes().to_vec(),
        })
    }

    /// Client to meter
    pub fn addresses(&self) -> HdlcAddressPair {
        self.addresses
    }

    /// SNRM opening the HDLC link
    pub fn snrm_request(&self) -> RequestFrame {
        RequestFrame::new(HdlcFrame::new(self.addresses, SNRM_CONTROL).encode())
    }

    /// Check the meter's UA
    pub fn decode_ua(&self, response: &[u8]) -> Result<(), FrameError> {
        let frame = self.open_frame(response)?;
        if frame.frame_type() != FrameType::UnnumberedAcknowledge {
            return Err(FrameError::UnexpectedControl(frame.control()));
        }
        if !frame.information().is_empty() {
            log::debug!("UA parameters: {}", HexBytes(frame.information()));
        }
        Ok(())
    }

    /// AARQ, sent as the first information frame after the UA
    pub fn aarq_request(&self, sequence: &HdlcSequence) -> RequestFrame {
        let apdu = AarqApdu::new(self.password.clone()).encode();
        self.information_frame(sequence, &apdu)
    }

    /// Check the AARE; anything but "accepted" is an error
    pub fn decode_aare(&self, frame: &InformationFrame) -> Result<AareApdu, FrameError> {
        let aare = AareApdu::decode(frame.apdu())?;
        if !aare.is_accepted() {
            log::error!(
                "Association rejected: result {}, diagnostic {:?}",
                aare.result,
                aare.diagnostic
            );
            return Err(FrameError::AssociationRejected(aare.result));
        }
        if let Some(initiate) = &aare.initiate {
            log::debug!(
                "Associated: conformance 0x{:06X}, max PDU {}",
                initiate.conformance,
                initiate.max_pdu_size
            );
        }
        Ok(aare)
    }

    /// GET request for the value attribute of `register`
    pub fn encode_request(&self, register: RegisterId, sequence: &HdlcSequence) -> RequestFrame {
        let request = GetRequestNormal {
            invoke: InvokeIdAndPriority::from_byte(0x80 | register.invoke_id()),
            class_id: REGISTER_CLASS_ID,
            obis: register.obis(),
            attribute: VALUE_ATTRIBUTE,
        };
        let mut apdu = Vec::with_capacity(13);
        request.encode(&mut apdu);
        self.information_frame(sequence, &apdu)
    }

    /// Validate a GET response and match it to the register it answers
    ///
    /// Never panics on arbitrary input.
    pub fn decode_response(
        &self,
        response: &[u8],
        expected: RegisterId,
    ) -> Result<DecodedPayload, FrameError> {
        let frame = self.open_information(response)?;
        self.decode_get(&frame, expected)
    }

    /// HDLC half of [`decode_response`](Self::decode_response)
    pub fn open_information(&self, response: &[u8]) -> Result<InformationFrame, FrameError> {
        let frame = self.open_frame(response)?;
        if frame.frame_type() != FrameType::Information {
            return Err(FrameError::UnexpectedControl(frame.control()));
        }
        let apdu = frame
            .information()
            .strip_prefix(&LLC_RESPONSE[..])
            .ok_or_else(|| FrameError::InvalidData("Missing LLC response header".to_string()))?;
        Ok(InformationFrame {
            control: frame.control(),
            apdu: apdu.to_vec(),
        })
    }

    /// APDU half of [`decode_response`](Self::decode_response)
    pub fn decode_get(
        &self,
        frame: &InformationFrame,
        expected: RegisterId,
    ) -> Result<DecodedPayload, FrameError> {
        let get = GetResponseNormal::decode(frame.apdu())?;

        let invoke_id = get.invoke.invoke_id();
        if invoke_id != expected.invoke_id() {
            return Err(FrameError::UnexpectedRegister {
                expected,
                found: invoke_id,
            });
        }
        match get.result {
            GetResult::Data(data) => Ok(DecodedPayload {
                register: expected,
                invoke_id,
                control: frame.control,
                data,
                scaler: expected.scaler(),
            }),
            GetResult::DataAccessError(code) => Err(FrameError::DataAccess(code)),
        }
    }

    fn information_frame(&self, sequence: &HdlcSequence, apdu: &[u8]) -> RequestFrame {
        let mut info = Vec::with_capacity(LLC_REQUEST.len() + apdu.len());
        info.extend_from_slice(&LLC_REQUEST);
        info.extend_from_slice(apdu);
        let frame =
            HdlcFrame::with_information(self.addresses, sequence.information_control(), info);
        RequestFrame::new(frame.encode())
    }

    /// Decode the HDLC layer and check it comes from our meter to us
    fn open_frame(&self, response: &[u8]) -> Result<HdlcFrame, FrameError> {
        let frame = HdlcFrame::decode(response)?;
        let pair = frame.address_pair();
        if pair != self.addresses.reversed() {
            return Err(FrameError::UnexpectedAddress(format!(
                "{} -> {}",
                pair.source(),
                pair.destination()
            )));
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, MeterScript};
    use ziv_core::ChecksumField;

    fn codec() -> FrameCodec {
        FrameCodec::new(&LinkConfig::default()).unwrap()
    }

    #[test]
    fn test_snrm_request() {
        assert_eq!(
            codec().snrm_request().as_bytes(),
            &[0x7E, 0xA0, 0x08, 0x02, 0x21, 0x05, 0x93, 0x56, 0x95, 0x7E]
        );
    }

    #[test]
    fn test_rejects_link_the_config_rejects() {
        let link = LinkConfig {
            password: "1".repeat(ziv_core::MAX_PASSWORD_LEN + 1),
            ..LinkConfig::default()
        };
        assert!(link.validate().is_err());
        assert!(matches!(
            FrameCodec::new(&link),
            Err(FrameError::InvalidData(msg)) if msg.contains("128")
        ));

        let link = LinkConfig {
            password: "1".repeat(ziv_core::MAX_PASSWORD_LEN),
            ..LinkConfig::default()
        };
        assert!(FrameCodec::new(&link).is_ok());
    }

    #[test]
    fn test_encode_request_layout() {
        let request = codec().encode_request(RegisterId::ImportActivePower, &HdlcSequence::new());
        let bytes = request.as_bytes();
        assert_eq!(bytes[0], 0x7E);
        assert_eq!(bytes[bytes.len() - 1], 0x7E);
        assert_eq!(bytes[6], 0x10);
        assert_eq!(&bytes[9..12], &LLC_REQUEST);
        assert_eq!(
            &bytes[12..25],
            &[0xC0, 0x01, 0xC3, 0x00, 0x03, 0x01, 0x00, 0x01, 0x07, 0x00, 0xFF, 0x02, 0x00]
        );
        assert_eq!(bytes.len(), 1 + 2 + 2 + 1 + 1 + 2 + 3 + 13 + 2 + 1);
    }

    #[test]
    fn test_encode_request_is_deterministic() {
        let codec = codec();
        let sequence = HdlcSequence::new();
        for register in RegisterId::ALL {
            assert_eq!(
                codec.encode_request(register, &sequence),
                codec.encode_request(register, &sequence)
            );
        }
        assert_ne!(
            codec.encode_request(RegisterId::ImportActiveEnergy, &sequence),
            codec.encode_request(RegisterId::ExportActiveEnergy, &sequence)
        );
    }

    #[test]
    fn test_response_identifies_register() {
        let codec = codec();
        for register in RegisterId::ALL {
            let sequence = HdlcSequence::new();
            let response = fixtures::get_response(
                register,
                &DataObject::Unsigned32(42),
                sequence.expected_response_control(),
            );
            let payload = codec.decode_response(&response, register).unwrap();
            assert_eq!(payload.register, register);
            assert_eq!(payload.invoke_id, register.invoke_id());
            assert_eq!(payload.data, DataObject::Unsigned32(42));
            assert_eq!(payload.scaler, register.scaler());
        }
    }

    #[test]
    fn test_response_for_other_register() {
        let response = fixtures::get_response(
            RegisterId::ExportActiveEnergy,
            &DataObject::Unsigned32(1),
            0x30,
        );
        let err = codec()
            .decode_response(&response, RegisterId::ImportActiveEnergy)
            .unwrap_err();
        assert_eq!(
            err,
            FrameError::UnexpectedRegister {
                expected: RegisterId::ImportActiveEnergy,
                found: 2
            }
        );
    }

    #[test]
    fn test_malformed_responses() {
        let codec = codec();
        let good = fixtures::get_response(
            RegisterId::ImportActiveEnergy,
            &DataObject::Unsigned32(12345),
            0x30,
        );

        for end in 0..good.len() {
            assert!(codec
                .decode_response(&good[..end], RegisterId::ImportActiveEnergy)
                .is_err());
        }

        let mut bad_fcs = good.clone();
        let n = bad_fcs.len();
        bad_fcs[n - 2] ^= 0x55;
        assert!(matches!(
            codec.decode_response(&bad_fcs, RegisterId::ImportActiveEnergy),
            Err(FrameError::ChecksumMismatch {
                field: ChecksumField::Frame,
                ..
            })
        ));

        let mut bad_length = good.clone();
        bad_length[2] += 1;
        assert!(matches!(
            codec.decode_response(&bad_length, RegisterId::ImportActiveEnergy),
            Err(FrameError::MalformedLength { .. })
        ));

        assert!(matches!(
            codec.decode_response(&good[..8], RegisterId::ImportActiveEnergy),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn test_garbage_never_panics() {
        let codec = codec();
        let mut seed: u32 = 0x1234_5678;
        for len in 0..200 {
            let mut bytes = Vec::with_capacity(len);
            for _ in 0..len {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                bytes.push((seed >> 16) as u8);
            }
            if len > 2 {
                bytes[0] = 0x7E;
                bytes[len - 1] = 0x7E;
            }
            let _ = codec.decode_response(&bytes, RegisterId::ExportActivePower);
            let _ = codec.decode_ua(&bytes);
            if let Ok(frame) = codec.open_information(&bytes) {
                let _ = codec.decode_aare(&frame);
            }
        }
    }

    #[test]
    fn test_data_access_error_keeps_control() {
        let codec = codec();
        let response = fixtures::get_error(RegisterId::ExportActivePower, 4, 0x30);
        assert_eq!(
            codec.decode_response(&response, RegisterId::ExportActivePower),
            Err(FrameError::DataAccess(4))
        );
        let frame = codec.open_information(&response).unwrap();
        assert_eq!(frame.control, 0x30);
    }

    #[test]
    fn test_response_from_other_meter() {
        let other = LinkConfig {
            server_physical: 0x11,
            ..LinkConfig::default()
        };
        let response = fixtures::MeterScript::with_link(&other)
            .associate()
            .build()
            .remove(0);
        let err = codec().decode_ua(response.as_deref().unwrap_or_default()).unwrap_err();
        assert!(matches!(err, FrameError::UnexpectedAddress(_)));
    }

    #[test]
    fn test_association_frames() {
        let codec = codec();
        let replies = MeterScript::new().associate().build();
        codec.decode_ua(replies[0].as_deref().unwrap_or_default()).unwrap();
        let frame = codec
            .open_information(replies[1].as_deref().unwrap_or_default())
            .unwrap();
        assert_eq!(frame.control, 0x30);
        assert!(codec.decode_aare(&frame).unwrap().is_accepted());

        let rejected = MeterScript::new().reject_association(1).build();
        let frame = codec
            .open_information(rejected[1].as_deref().unwrap_or_default())
            .unwrap();
        assert_eq!(
            codec.decode_aare(&frame),
            Err(FrameError::AssociationRejected(1))
        );
        assert!(matches!(
            codec.decode_ua(rejected[1].as_deref().unwrap_or_default()),
            Err(FrameError::UnexpectedControl(_))
        ));
    }

    #[test]
    fn test_aarq_request_uses_sequence() {
        let codec = codec();
        let aarq = codec.aarq_request(&HdlcSequence::new());
        let frame = HdlcFrame::decode(aarq.as_bytes()).unwrap();
        assert_eq!(frame.control(), 0x10);
        assert_eq!(&frame.information()[..4], &[0xE6, 0xE6, 0x00, 0x60]);
    }
}
