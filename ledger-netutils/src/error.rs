//! Error taxonomy of the network boundary.

use crate::signer::SigningError;

/// The request never made it onto the network. Fatal to that message only.
#[allow(missing_docs)] // error types document themselves
#[derive(Clone, Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("encoding failed: {0}")]
    Encode(String),
    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),
    #[error("refused by the network: {0}")]
    Refused(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

/// The network explicitly rejected the message after it was submitted.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("rejected: {reason}{}", .exit_code.map(|code| format!(" (exit code {code})")).unwrap_or_default())]
pub struct RejectionError {
    /// what the network said
    pub reason: String,
    /// compute phase exit code, when the message was executed and aborted
    pub exit_code: Option<i32>,
}

/// No confirmation within the deadline. The message may still land later.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("message {message_id} was not finalized before the deadline")]
pub struct TimeoutError {
    /// id of the message that is still unaccounted for
    pub message_id: String,
}

/// Why waiting on a submitted message stopped.
#[allow(missing_docs)] // error types document themselves
#[derive(Clone, Debug, thiserror::Error)]
pub enum AwaitError {
    #[error("{0}")]
    Rejected(#[from] RejectionError),
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
    #[error("lost connection while waiting: {0}")]
    Connection(String),
}

/// A feed page could not be retrieved. Fatal to the scan that asked for it.
#[allow(missing_docs)] // error types document themselves
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("query failed: {0}")]
    Graphql(String),
    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Malformed(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

impl From<FetchError> for SubmissionError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Graphql(message) => SubmissionError::Refused(message),
            other => SubmissionError::Transport(other.to_string()),
        }
    }
}
