#![forbid(unsafe_code)]
//! Ledgerlib
//!
//! Submits batches of requests to a ledger network and follows every message until it is
//! final, expired or rejected. [`dispatcher::dispatch`] is the entrypoint; the resulting
//! [`outcome::BatchReport`] renders the per message log and the summary line.

pub mod dispatcher;
pub mod outcome;
pub mod replay;
pub mod request;
pub mod tracker;

pub use dispatcher::{dispatch, dispatch_chunks, DispatchConfigError, DispatchSettings};
pub use outcome::{BatchReport, BatchStatistics, DispatchOutcome, LabeledOutcome};
pub use replay::{replay, ReplaySettings};
pub use request::{chunk_requests, labelled_batch, requests_from_dir, ReplayBatches};
pub use tracker::ConfirmationTracker;
