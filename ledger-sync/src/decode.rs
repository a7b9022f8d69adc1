//! Best effort interpretation of message bodies.
//!
//! Bodies are base64. An internal body is `[function id: u32 BE][arguments]`. An external
//! body is `[signature flag][64 byte signature if flagged]`, then the header fields the ABI
//! declares (`pubkey`: flag plus 32 bytes, `time`: u64 BE, `expire`: u32 BE), then the
//! function id and arguments. Arguments are kept as raw hex.
//!
//! [`decode`] never fails: anything that does not match the schema is `None`.

use ledger_netutils::feed::MSG_TYPE_INTERNAL;
use serde::{Deserialize, Serialize};

use crate::abi::{AbiSchema, EntryKind};

const SIGNATURE_LEN: usize = 64;
const PUBKEY_LEN: usize = 32;

/// Which encoding convention a body follows, chosen by the message type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    /// sent by a contract, no signature or header
    Internal,
    /// sent from outside the network, signed and with a header
    External,
}

impl Framing {
    /// 0 is internal, everything else external.
    pub fn from_msg_type(msg_type: u8) -> Self {
        if msg_type == MSG_TYPE_INTERNAL {
            Framing::Internal
        } else {
            Framing::External
        }
    }
}

/// Why a body did not decode. Never leaves [`decode`].
#[allow(missing_docs)] // error types document themselves
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("body is not base64")]
    NotBase64,
    #[error("body ends after {available} bytes, {needed} more needed")]
    Truncated { available: usize, needed: usize },
    #[error("invalid flag byte {0}")]
    InvalidFlag(u8),
    #[error("header field {0:?} is not supported")]
    UnsupportedHeader(String),
    #[error("no function or event with id {0:#010x}")]
    UnknownId(u32),
}

/// Header of an external body.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedHeader {
    pub signed: bool,
    pub pubkey: Option<String>,
    pub time: Option<u64>,
    pub expire: Option<u32>,
}

/// A body recognised by the schema.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedBody {
    pub name: String,
    pub function_id: u32,
    pub kind: EntryKind,
    pub header: Option<DecodedHeader>,
    /// argument bytes, hex
    pub args: String,
}

/// Schema directed interpretation of a body.
pub trait BodyDecoder: Send + Sync {
    /// Interprets `body` under `framing`.
    fn decode_body(&self, body: &str, framing: Framing) -> Result<DecodedBody, DecodeError>;
}

/// Decodes `body`, or gives `None` when there is no body or it does not match the schema.
pub fn decode(decoder: &dyn BodyDecoder, body: Option<&str>, msg_type: u8) -> Option<DecodedBody> {
    let body = body?;
    match decoder.decode_body(body, Framing::from_msg_type(msg_type)) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::trace!("Body not decoded: {}", e);
            None
        }
    }
}

struct BodyReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> BodyReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        BodyReader { bytes, position: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.bytes.len() - self.position;
        if available < len {
            return Err(DecodeError::Truncated {
                available,
                needed: len - available,
            });
        }
        let slice = &self.bytes[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    fn flag(&mut self) -> Result<bool, DecodeError> {
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidFlag(other)),
        }
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(buf))
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.position..];
        self.position = self.bytes.len();
        rest
    }
}

impl AbiSchema {
    fn read_header(&self, reader: &mut BodyReader) -> Result<DecodedHeader, DecodeError> {
        let mut header = DecodedHeader {
            signed: reader.flag()?,
            ..Default::default()
        };
        if header.signed {
            reader.take(SIGNATURE_LEN)?;
        }
        for field in &self.abi().header {
            match field.as_str() {
                "pubkey" => {
                    if reader.flag()? {
                        header.pubkey = Some(hex::encode(reader.take(PUBKEY_LEN)?));
                    }
                }
                "time" => header.time = Some(reader.u64()?),
                "expire" => header.expire = Some(reader.u32()?),
                other => return Err(DecodeError::UnsupportedHeader(other.to_string())),
            }
        }
        Ok(header)
    }
}

impl BodyDecoder for AbiSchema {
    fn decode_body(&self, body: &str, framing: Framing) -> Result<DecodedBody, DecodeError> {
        let bytes = base64::decode(body.trim()).map_err(|_| DecodeError::NotBase64)?;
        let mut reader = BodyReader::new(&bytes);
        let header = match framing {
            Framing::Internal => None,
            Framing::External => Some(self.read_header(&mut reader)?),
        };
        let function_id = reader.u32()?;
        let (name, kind) = self
            .lookup(function_id)
            .ok_or(DecodeError::UnknownId(function_id))?;
        Ok(DecodedBody {
            name: name.to_string(),
            function_id,
            kind,
            header,
            args: hex::encode(reader.rest()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{tests::COMMIT_ABI, Abi};
    use ledger_netutils::feed::MSG_TYPE_EXTERNAL_IN;
    use test_case::test_case;

    fn schema() -> AbiSchema {
        AbiSchema::new(Abi::from_json(COMMIT_ABI).unwrap()).unwrap()
    }

    fn internal_body(id: u32, args: &[u8]) -> String {
        base64::encode([&id.to_be_bytes()[..], args].concat())
    }

    fn external_body(id: u32, signed: bool) -> String {
        let mut bytes = vec![u8::from(signed)];
        if signed {
            bytes.extend_from_slice(&[7u8; SIGNATURE_LEN]);
        }
        bytes.push(1);
        bytes.extend_from_slice(&[9u8; PUBKEY_LEN]);
        bytes.extend_from_slice(&1_700_000_000_000u64.to_be_bytes());
        bytes.extend_from_slice(&1_700_000_120u32.to_be_bytes());
        bytes.extend_from_slice(&id.to_be_bytes());
        base64::encode(bytes)
    }

    #[test]
    fn internal_call_decodes() {
        let schema = schema();
        let id = schema.call_id("abortDiff").unwrap();
        let decoded = decode(&schema, Some(&internal_body(id, &[0xab, 0xcd])), MSG_TYPE_INTERNAL)
            .unwrap();
        assert_eq!(decoded.name, "abortDiff");
        assert_eq!(decoded.kind, EntryKind::Call);
        assert_eq!(decoded.header, None);
        assert_eq!(decoded.args, "abcd");
    }

    #[test_case(true ; "signed")]
    #[test_case(false ; "unsigned")]
    fn external_call_reads_header(signed: bool) {
        let schema = schema();
        let id = schema.call_id("deployNewSnapshot").unwrap();
        let decoded = decode(&schema, Some(&external_body(id, signed)), MSG_TYPE_EXTERNAL_IN)
            .unwrap();
        assert_eq!(decoded.name, "deployNewSnapshot");
        let header = decoded.header.unwrap();
        assert_eq!(header.signed, signed);
        assert_eq!(header.pubkey, Some(hex::encode([9u8; PUBKEY_LEN])));
        assert_eq!(header.time, Some(1_700_000_000_000));
        assert_eq!(header.expire, Some(1_700_000_120));
    }

    #[test]
    fn framing_follows_message_type() {
        let schema = schema();
        let id = schema.call_id("abortDiff").unwrap();
        // an internal body read with external framing is garbage
        assert_eq!(
            decode(&schema, Some(&internal_body(id, &[])), MSG_TYPE_EXTERNAL_IN),
            None
        );
    }

    #[test_case(None ; "no body")]
    #[test_case(Some("!!not base64!!") ; "not base64")]
    #[test_case(Some("AAE=") ; "truncated")]
    #[test_case(Some("3q2+7w==") ; "unknown id")]
    fn malformed_bodies_are_none(body: Option<&str>) {
        assert_eq!(decode(&schema(), body, MSG_TYPE_INTERNAL), None);
    }

    #[test]
    fn unknown_id_is_reported_by_decode_body() {
        assert_eq!(
            schema().decode_body("3q2+7w==", Framing::Internal),
            Err(DecodeError::UnknownId(0xdead_beef))
        );
    }
}
