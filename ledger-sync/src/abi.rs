//! JSON ABI descriptions and the function ids derived from them.
//!
//! A function id is the first four bytes of `sha256("name(inputs)(outputs)v2")`, with the
//! high bit cleared for calls and set for responses. Events hash `"name(inputs)v2"` and
//! always have the high bit cleared. An explicit `id` in the ABI wins over the hash.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Errors raised while loading an ABI.
#[allow(missing_docs)] // error types document themselves
#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    #[error("could not read abi: {0}")]
    Io(#[from] std::io::Error),
    #[error("abi is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("function {name} has an invalid id {id:?}")]
    InvalidId { name: String, id: String },
}

/// A typed parameter.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub components: Vec<AbiParam>,
}

/// A callable function.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiFunction {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub outputs: Vec<AbiParam>,
    #[serde(default)]
    pub id: Option<String>,
}

/// An event the contract emits.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiEvent {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub id: Option<String>,
}

/// The parts of a contract ABI needed to recognise message bodies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abi {
    /// major ABI version
    #[serde(rename = "ABI version", default = "default_abi_version")]
    pub abi_version: u8,
    /// full version string, e.g. "2.3"
    #[serde(default)]
    pub version: Option<String>,
    /// header fields of external messages, in order
    #[serde(default)]
    pub header: Vec<String>,
    /// contract functions
    #[serde(default)]
    pub functions: Vec<AbiFunction>,
    /// contract events
    #[serde(default)]
    pub events: Vec<AbiEvent>,
}

fn default_abi_version() -> u8 {
    2
}

impl Abi {
    /// Parse an ABI from its JSON text.
    pub fn from_json(json: &str) -> Result<Self, AbiError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse an ABI file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AbiError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Whether an id identifies a call, the answer to a call, or an event.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Call,
    Response,
    Event,
}

/// An [`Abi`] with its function and event ids resolved, ready for decoding.
#[derive(Clone, Debug)]
pub struct AbiSchema {
    abi: Abi,
    entries: HashMap<u32, (String, EntryKind)>,
}

impl AbiSchema {
    /// Resolves every id in `abi`.
    pub fn new(abi: Abi) -> Result<Self, AbiError> {
        let mut entries = HashMap::new();
        for function in &abi.functions {
            let id = match &function.id {
                Some(id) => parse_id(&function.name, id)?,
                None => signature_id(&function_signature(function, abi.abi_version)),
            };
            entries.insert(id & 0x7FFF_FFFF, (function.name.clone(), EntryKind::Call));
            entries.insert(id | 0x8000_0000, (function.name.clone(), EntryKind::Response));
        }
        for event in &abi.events {
            let id = match &event.id {
                Some(id) => parse_id(&event.name, id)?,
                None => signature_id(&event_signature(event, abi.abi_version)),
            };
            entries
                .entry(id & 0x7FFF_FFFF)
                .or_insert_with(|| (event.name.clone(), EntryKind::Event));
        }
        Ok(AbiSchema { abi, entries })
    }

    /// Load and resolve an ABI file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AbiError> {
        Self::new(Abi::from_path(path)?)
    }

    /// The underlying ABI.
    pub fn abi(&self) -> &Abi {
        &self.abi
    }

    /// Name and kind behind an id.
    pub fn lookup(&self, id: u32) -> Option<(&str, EntryKind)> {
        self.entries
            .get(&id)
            .map(|(name, kind)| (name.as_str(), *kind))
    }

    /// Call id of the named function.
    pub fn call_id(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|(_, (entry, kind))| entry == name && *kind == EntryKind::Call)
            .map(|(id, _)| *id)
    }
}

fn parse_id(name: &str, id: &str) -> Result<u32, AbiError> {
    let hex = id.trim().trim_start_matches("0x");
    u32::from_str_radix(hex, 16).map_err(|_| AbiError::InvalidId {
        name: name.to_string(),
        id: id.to_string(),
    })
}

/// First four bytes of the sha256 of `signature`, big endian.
pub fn signature_id(signature: &str) -> u32 {
    let hash = Sha256::digest(signature.as_bytes());
    u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]])
}

fn type_signature(param: &AbiParam) -> String {
    if param.kind.contains("tuple") {
        let inner = param
            .components
            .iter()
            .map(type_signature)
            .collect::<Vec<_>>()
            .join(",");
        param.kind.replacen("tuple", &format!("({inner})"), 1)
    } else {
        param.kind.clone()
    }
}

fn params_signature(params: &[AbiParam]) -> String {
    params.iter().map(type_signature).collect::<Vec<_>>().join(",")
}

/// `name(inputs)(outputs)vN`
pub fn function_signature(function: &AbiFunction, abi_version: u8) -> String {
    format!(
        "{}({})({})v{}",
        function.name,
        params_signature(&function.inputs),
        params_signature(&function.outputs),
        abi_version
    )
}

/// `name(inputs)vN`
pub fn event_signature(event: &AbiEvent, abi_version: u8) -> String {
    format!(
        "{}({})v{}",
        event.name,
        params_signature(&event.inputs),
        abi_version
    )
}
