#![warn(missing_docs)]
//! Ledger history scanning
//!
//! Entrypoint: [`crate::scan::Scanner::scan`]. Pages through an account's message feed
//! newest first, decoding each body against an ABI when one is supplied.

pub mod abi;
pub mod decode;
pub mod scan;

pub use abi::{Abi, AbiError, AbiSchema};
pub use decode::{decode, BodyDecoder, DecodeError, DecodedBody, Framing};
pub use scan::{filter_by_function, ScanResult, ScannedRecord, Scanner};
