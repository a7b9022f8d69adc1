//! Requests and the reports the network hands back about them.

use getset::Getters;
use sha2::{Digest, Sha256};

use crate::error::SubmissionError;
use crate::signer::Signer;

/// Leading byte of an external body that carries a signature.
pub const SIGNED_FLAG: u8 = 1;
/// Leading byte of an external body without a signature.
pub const UNSIGNED_FLAG: u8 = 0;

/// An already encoded payload plus the label used to correlate it in logs and results.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Request {
    /// caller assigned, e.g. derived from a filename
    label: String,
    /// application encoded call, without framing or signature
    payload: Vec<u8>,
    /// `time` header in unix millis, written ahead of the payload when set
    time: Option<u64>,
}

impl Request {
    /// Create a new request.
    pub fn new(label: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Request {
            label: label.into(),
            payload: payload.into(),
            time: None,
        }
    }

    /// Stamps the body with a `time` header, so equal payloads sent at different times
    /// get different message ids.
    pub fn with_time(mut self, unix_millis: u64) -> Self {
        self.time = Some(unix_millis);
        self
    }

    /// The bytes that get signed: the `time` header, if any, then the payload.
    pub fn stamped_payload(&self) -> Vec<u8> {
        match self.time {
            Some(time) => [&time.to_be_bytes()[..], &self.payload[..]].concat(),
            None => self.payload.clone(),
        }
    }
}

/// A request in the form the network accepts.
#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct WireMessage {
    /// hex sha256 of the body bytes
    id: String,
    /// base64 body
    body: String,
}

impl WireMessage {
    /// Frames `payload` as an external message body, signed if a signer is given.
    ///
    /// Layout: `[flag][64 byte signature if flag is set][payload]`.
    pub fn encode(payload: &[u8], signer: Option<&dyn Signer>) -> Result<Self, SubmissionError> {
        let mut body = Vec::with_capacity(1 + crate::signer::SIGNATURE_LEN + payload.len());
        match signer {
            Some(signer) => {
                body.push(SIGNED_FLAG);
                body.extend_from_slice(&signer.sign(payload)?);
            }
            None => body.push(UNSIGNED_FLAG),
        }
        body.extend_from_slice(payload);
        Ok(Self::from_body_bytes(&body))
    }

    /// Wraps raw body bytes, deriving the id from them.
    pub fn from_body_bytes(body: &[u8]) -> Self {
        WireMessage {
            id: hex::encode(Sha256::digest(body)),
            body: base64::encode(body),
        }
    }
}

/// What the network returns when it accepts a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionHandle {
    /// id to correlate the message with later, also out of band
    pub message_id: String,
    /// endpoints that accepted the message
    pub accepted_by: usize,
}

/// The message was executed in a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InclusionReport {
    /// block that holds the transaction
    pub block_id: String,
    /// transaction produced by the message
    pub transaction_id: String,
}

/// The message's block is final.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizationReport {
    /// transaction produced by the message
    pub transaction_id: String,
    /// ledger time of the transaction, unix seconds
    pub finalized_at: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{KeyPairSigner, SIGNATURE_LEN};

    #[test]
    fn unsigned_body_is_flag_and_payload() {
        let message = WireMessage::encode(b"call", None).unwrap();
        let body = base64::decode(message.body()).unwrap();
        assert_eq!(body, [&[UNSIGNED_FLAG][..], &b"call"[..]].concat());
        assert_eq!(message.id(), &hex::encode(Sha256::digest(&body)));
    }

    #[test]
    fn signed_body_carries_signature() {
        let signer = KeyPairSigner::from_hex_secret(
            "a8c7a1a7789c7e2b1356854217f4c202f2cd6d1037bbe2a2343d606d01350804",
        )
        .unwrap();
        let message = WireMessage::encode(b"call", Some(&signer as &dyn Signer)).unwrap();
        let body = base64::decode(message.body()).unwrap();
        assert_eq!(body[0], SIGNED_FLAG);
        assert_eq!(&body[1..1 + SIGNATURE_LEN], &signer.sign(b"call").unwrap()[..]);
        assert_eq!(&body[1 + SIGNATURE_LEN..], b"call");
    }

    #[test]
    fn time_header_changes_the_id() {
        let plain = Request::new("a", b"call".to_vec());
        let stamped = plain.clone().with_time(1_700_000_000_000);
        assert_eq!(plain.stamped_payload(), b"call");
        assert_eq!(
            stamped.stamped_payload(),
            [&1_700_000_000_000u64.to_be_bytes()[..], &b"call"[..]].concat()
        );

        let later = plain.with_time(1_700_000_000_001);
        let first = WireMessage::encode(&stamped.stamped_payload(), None).unwrap();
        let second = WireMessage::encode(&later.stamped_payload(), None).unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn id_depends_on_body() {
        let a = WireMessage::from_body_bytes(b"a");
        let b = WireMessage::from_body_bytes(b"b");
        assert_ne!(a.id(), b.id());
    }
}
