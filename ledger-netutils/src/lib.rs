//! Ledger-Netutils
//!
//! This crate provides the [`LedgerBoundary`] trait, the seam between the dispatch and scan
//! machinery and a ledger network, along with the wire types that cross it and
//! [`graphql::GraphqlConnector`], the implementation that talks to a node's GraphQL endpoint.

#![warn(missing_docs)]
use std::future::Future;

use tokio::time::Instant;

pub mod error;
pub mod feed;
pub mod graphql;
pub mod message;
pub mod signer;

pub use error::{AwaitError, FetchError, RejectionError, SubmissionError, TimeoutError};
pub use feed::{Cursor, FeedPage, MessageTypeFilter, PageQuery, Record};
pub use graphql::GraphqlConnector;
pub use message::{FinalizationReport, InclusionReport, Request, SubmissionHandle, WireMessage};

/// Everything the dispatcher and the scanner need from the network.
///
/// One handle is built at startup and shared by reference between every concurrent
/// tracker and scan. Implementations must not retry submissions on their own: a message
/// that is sent twice may be executed twice.
pub trait LedgerBoundary: Send + Sync {
    /// Turns a request into a signed wire message.
    fn encode(&self, request: &Request) -> Result<WireMessage, SubmissionError>;

    /// Hands a wire message to the network.
    fn submit(
        &self,
        message: WireMessage,
    ) -> impl Future<Output = Result<SubmissionHandle, SubmissionError>> + Send;

    /// Resolves once the message is seen in a block.
    fn await_inclusion(
        &self,
        handle: &SubmissionHandle,
        deadline: Instant,
    ) -> impl Future<Output = Result<InclusionReport, AwaitError>> + Send;

    /// Resolves once the block holding the message is final.
    fn await_finalization(
        &self,
        handle: &SubmissionHandle,
        inclusion: &InclusionReport,
        deadline: Instant,
    ) -> impl Future<Output = Result<FinalizationReport, AwaitError>> + Send;

    /// Fetches the page of the account's history that ends just before `cursor`,
    /// or the newest page when there is no cursor.
    fn fetch_page(
        &self,
        query: &PageQuery,
        cursor: Option<&Cursor>,
    ) -> impl Future<Output = Result<FeedPage, FetchError>> + Send;
}
