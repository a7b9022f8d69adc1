#![warn(missing_docs)]
//! Lifecycle of one submitted message, and the events emitted as it moves through it.

pub mod confirmation_status;
pub mod progress;
