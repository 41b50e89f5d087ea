//! Meter responses for tests
//!
//! Frames are built the way the meter sends them, from the meter's address to
//! the client's, with sequence numbers that follow the client's requests.

use crate::pdu::{GetResponseNormal, GetResult, InvokeIdAndPriority};
use ziv_core::{DataObject, LinkConfig, RegisterId};
use ziv_session::{HdlcAddress, HdlcAddressPair, HdlcFrame, HdlcSequence, LLC_RESPONSE};

const UA_CONTROL: u8 = 0x73;

/// Accepted AARE with an InitiateResponse
const AARE_ACCEPTED: [u8; 43] = [
    0x61, 0x29, 0xA1, 0x09, 0x06, 0x07, 0x60, 0x85, 0x74, 0x05, 0x08, 0x01, 0x01, 0xA2, 0x03, 0x02,
    0x01, 0x00, 0xA3, 0x05, 0xA1, 0x03, 0x02, 0x01, 0x00, 0xBE, 0x10, 0x04, 0x0E, 0x08, 0x00, 0x06,
    0x5F, 0x1F, 0x04, 0x00, 0x00, 0x10, 0x1D, 0x00, 0xEF, 0x00, 0x07,
];

fn meter_to_client(link: &LinkConfig) -> HdlcAddressPair {
    let client = HdlcAddress::new(link.client_address).expect("client address");
    let server = HdlcAddress::new_with_physical(link.server_logical, link.server_physical)
        .expect("server address");
    HdlcAddressPair::new(server, client)
}

fn information(link: &LinkConfig, control: u8, apdu: &[u8]) -> Vec<u8> {
    let mut info = LLC_RESPONSE.to_vec();
    info.extend_from_slice(apdu);
    HdlcFrame::with_information(meter_to_client(link), control, info).encode()
}

/// UA answering an SNRM
pub fn ua() -> Vec<u8> {
    HdlcFrame::new(meter_to_client(&LinkConfig::default()), UA_CONTROL).encode()
}

/// AARE with `result` (0 accepted)
pub fn aare(result: u8, control: u8) -> Vec<u8> {
    let mut apdu = AARE_ACCEPTED.to_vec();
    apdu[17] = result;
    information(&LinkConfig::default(), control, &apdu)
}

/// GET response carrying `data` for `register`
pub fn get_response(register: RegisterId, data: &DataObject, control: u8) -> Vec<u8> {
    get_response_with_invoke(register.invoke_id(), data, control)
}

/// GET response with an arbitrary invoke id
pub fn get_response_with_invoke(invoke_id: u8, data: &DataObject, control: u8) -> Vec<u8> {
    get_apdu(
        &LinkConfig::default(),
        invoke_id,
        GetResult::Data(data.clone()),
        control,
    )
}

/// GET response refusing access to `register`
pub fn get_error(register: RegisterId, data_access_result: u8, control: u8) -> Vec<u8> {
    get_apdu(
        &LinkConfig::default(),
        register.invoke_id(),
        GetResult::DataAccessError(data_access_result),
        control,
    )
}

fn get_apdu(link: &LinkConfig, invoke_id: u8, result: GetResult, control: u8) -> Vec<u8> {
    let response = GetResponseNormal {
        invoke: InvokeIdAndPriority::from_byte(0xC0 | invoke_id),
        result,
    };
    let mut apdu = Vec::new();
    response.encode(&mut apdu);
    information(link, control, &apdu)
}

/// Answers of a meter over one or more poll cycles
///
/// Each call appends the answer to the next request; `None` stands for a
/// request the meter never answers. Sequence numbers advance only on
/// answered information frames, as they do on the client side.
#[derive(Debug, Clone)]
pub struct MeterScript {
    link: LinkConfig,
    sequence: HdlcSequence,
    replies: Vec<Option<Vec<u8>>>,
}

impl Default for MeterScript {
    fn default() -> Self {
        Self::new()
    }
}

impl MeterScript {
    pub fn new() -> Self {
        Self::with_link(&LinkConfig::default())
    }

    pub fn with_link(link: &LinkConfig) -> Self {
        Self {
            link: link.clone(),
            sequence: HdlcSequence::new(),
            replies: Vec::new(),
        }
    }

    /// UA and accepted AARE
    pub fn associate(self) -> Self {
        self.open_link().aare_result(0)
    }

    /// UA and an AARE with `result`
    pub fn reject_association(self, result: u8) -> Self {
        self.open_link().aare_result(result)
    }

    /// UA only; the AARQ goes unanswered
    pub fn open_link(mut self) -> Self {
        self.sequence.reset();
        let frame = HdlcFrame::new(meter_to_client(&self.link), UA_CONTROL).encode();
        self.replies.push(Some(frame));
        self
    }

    fn aare_result(mut self, result: u8) -> Self {
        let mut apdu = AARE_ACCEPTED.to_vec();
        apdu[17] = result;
        let frame = information(&self.link, self.sequence.expected_response_control(), &apdu);
        self.advance();
        self.replies.push(Some(frame));
        self
    }

    /// Value for `register`
    pub fn value(mut self, register: RegisterId, data: DataObject) -> Self {
        let frame = get_apdu(
            &self.link,
            register.invoke_id(),
            GetResult::Data(data),
            self.sequence.expected_response_control(),
        );
        self.advance();
        self.replies.push(Some(frame));
        self
    }

    /// Data-access error for `register`
    pub fn access_error(mut self, register: RegisterId, data_access_result: u8) -> Self {
        let frame = get_apdu(
            &self.link,
            register.invoke_id(),
            GetResult::DataAccessError(data_access_result),
            self.sequence.expected_response_control(),
        );
        self.advance();
        self.replies.push(Some(frame));
        self
    }

    /// Raw bytes instead of a proper answer; the sequence does not move
    pub fn raw(mut self, bytes: Vec<u8>) -> Self {
        self.replies.push(Some(bytes));
        self
    }

    /// No answer at all
    pub fn silence(mut self) -> Self {
        self.replies.push(None);
        self
    }

    pub fn build(self) -> Vec<Option<Vec<u8>>> {
        self.replies
    }

    fn advance(&mut self) {
        let control = self.sequence.expected_response_control();
        self.sequence
            .acknowledge(control)
            .expect("expected_response_control is always accepted");
    }
}
