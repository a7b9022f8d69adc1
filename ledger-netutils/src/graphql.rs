//! [`LedgerBoundary`] over a node's GraphQL endpoint.
//!
//! Every request is a POST of `{query, variables}` to `{endpoint}/graphql`. Feed pages and
//! status polls go to the first endpoint; submissions go to the first
//! `sending_endpoint_count` endpoints at once.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::error::{AwaitError, FetchError, RejectionError, SubmissionError, TimeoutError};
use crate::feed::{Cursor, FeedPage, PageQuery, Record};
use crate::message::{FinalizationReport, InclusionReport, Request, SubmissionHandle, WireMessage};
use crate::signer::Signer;
use crate::LedgerBoundary;

/// How often a submitted message's status is polled.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Poll failures in a row after which waiting gives up.
pub const MAX_CONSECUTIVE_POLL_FAILURES: usize = 3;

const MESSAGES_QUERY: &str = r#"query MessagesQuery(
    $address: String!,
    $msgType: [BlockchainMessageTypeFilterEnum!],
    $cursor: String,
    $limit: Int
    $allow_latest_inconsistent_data: Boolean
) {
    blockchain {
        account(address: $address) {
            messages(
                msg_type: $msgType,
                last: $limit,
                before: $cursor,
                allow_latest_inconsistent_data: $allow_latest_inconsistent_data
            ) {
                edges {
                    node { id msg_type created_lt body }
                }
                pageInfo {
                    startCursor
                    hasPreviousPage
                }
            }
        }
    }
}"#;

const POST_REQUESTS_MUTATION: &str = r#"mutation PostRequests($requests: [Request]) {
    postRequests(requests: $requests)
}"#;

const MESSAGE_STATUS_QUERY: &str = r#"query MessageStatus($hash: String!) {
    blockchain {
        message(hash: $hash) {
            status_name
            dst_transaction { hash block_id now aborted compute { exit_code } }
        }
    }
}"#;

/// The connector, containing the endpoints to talk to and the optional signer.
#[derive(Clone)]
pub struct GraphqlConnector {
    client: reqwest::Client,
    endpoints: Vec<http::Uri>,
    sending_endpoint_count: usize,
    poll_interval: Duration,
    signer: Option<Arc<dyn Signer>>,
}

impl GraphqlConnector {
    /// Takes the endpoint list and wraps it in a connector.
    pub fn new(endpoints: Vec<http::Uri>) -> Self {
        let sending_endpoint_count = endpoints.len();
        Self {
            client: reqwest::Client::new(),
            endpoints,
            sending_endpoint_count,
            poll_interval: DEFAULT_POLL_INTERVAL,
            signer: None,
        }
    }

    /// Send each message to this many endpoints.
    pub fn with_sending_endpoint_count(mut self, count: usize) -> Self {
        self.sending_endpoint_count = count.max(1);
        self
    }

    /// Sign external messages with this key.
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Poll message status this often.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// The endpoints queried, in order.
    pub fn endpoints(&self) -> &[http::Uri] {
        &self.endpoints
    }

    fn query_endpoint(&self) -> Result<&http::Uri, FetchError> {
        self.endpoints
            .first()
            .ok_or_else(|| FetchError::Transport("no endpoints configured".to_string()))
    }

    async fn query<T: DeserializeOwned>(
        &self,
        endpoint: &http::Uri,
        query: &str,
        variables: Value,
    ) -> Result<T, FetchError> {
        let response = self
            .client
            .post(graphql_url(endpoint))
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let response: GraphqlResponse<T> = response.json().await?;
        response.into_data()
    }

    async fn poll_message(&self, message_id: &str) -> Result<Option<MessageState>, FetchError> {
        let endpoint = self.query_endpoint()?;
        let data: MessageStatusData = self
            .query(endpoint, MESSAGE_STATUS_QUERY, json!({ "hash": message_id }))
            .await?;
        Ok(data.blockchain.message)
    }

    /// Polls until `done` turns a message state into a result, or the deadline passes.
    async fn poll_until<T>(
        &self,
        message_id: &str,
        deadline: Instant,
        done: impl Fn(&MessageState) -> Option<Result<T, RejectionError>>,
    ) -> Result<T, AwaitError> {
        let mut failures = 0;
        loop {
            match self.poll_message(message_id).await {
                Ok(Some(state)) => {
                    failures = 0;
                    if let Some(result) = done(&state) {
                        return result.map_err(AwaitError::from);
                    }
                }
                Ok(None) => failures = 0,
                Err(e) => {
                    failures += 1;
                    log::warn!("Polling message {message_id} failed ({failures}): {e}");
                    if failures >= MAX_CONSECUTIVE_POLL_FAILURES {
                        return Err(AwaitError::Connection(e.to_string()));
                    }
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TimeoutError {
                    message_id: message_id.to_string(),
                }
                .into());
            }
            tokio::time::sleep_until(std::cmp::min(now + self.poll_interval, deadline)).await;
        }
    }
}

impl std::fmt::Debug for GraphqlConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphqlConnector")
            .field("endpoints", &self.endpoints)
            .field("sending_endpoint_count", &self.sending_endpoint_count)
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

impl LedgerBoundary for GraphqlConnector {
    fn encode(&self, request: &Request) -> Result<WireMessage, SubmissionError> {
        WireMessage::encode(&request.stamped_payload(), self.signer.as_deref())
    }

    async fn submit(&self, message: WireMessage) -> Result<SubmissionHandle, SubmissionError> {
        let count = self.sending_endpoint_count.clamp(1, self.endpoints.len().max(1));
        let variables = json!({
            "requests": [{ "id": message.id(), "body": message.body() }]
        });
        let results = join_all(self.endpoints.iter().take(count).map(|endpoint| {
            self.query::<Value>(endpoint, POST_REQUESTS_MUTATION, variables.clone())
        }))
        .await;

        let accepted_by = results.iter().filter(|result| result.is_ok()).count();
        if accepted_by > 0 {
            return Ok(SubmissionHandle {
                message_id: message.id().clone(),
                accepted_by,
            });
        }
        match results.into_iter().find_map(Result::err) {
            Some(e) => Err(e.into()),
            None => Err(SubmissionError::Transport(
                "no endpoints configured".to_string(),
            )),
        }
    }

    async fn await_inclusion(
        &self,
        handle: &SubmissionHandle,
        deadline: Instant,
    ) -> Result<InclusionReport, AwaitError> {
        self.poll_until(&handle.message_id, deadline, |state| {
            if let Some(rejection) = state.rejection() {
                return Some(Err(rejection));
            }
            state.dst_transaction.as_ref().map(|transaction| {
                Ok(InclusionReport {
                    block_id: transaction.block_id.clone().unwrap_or_default(),
                    transaction_id: transaction.hash.clone(),
                })
            })
        })
        .await
    }

    async fn await_finalization(
        &self,
        handle: &SubmissionHandle,
        _inclusion: &InclusionReport,
        deadline: Instant,
    ) -> Result<FinalizationReport, AwaitError> {
        self.poll_until(&handle.message_id, deadline, |state| {
            if let Some(rejection) = state.rejection() {
                return Some(Err(rejection));
            }
            match (&state.status_name, &state.dst_transaction) {
                (Some(status), Some(transaction)) if status == "Finalized" => {
                    Some(Ok(FinalizationReport {
                        transaction_id: transaction.hash.clone(),
                        finalized_at: transaction.now.unwrap_or_default(),
                    }))
                }
                _ => None,
            }
        })
        .await
    }

    async fn fetch_page(
        &self,
        query: &PageQuery,
        cursor: Option<&Cursor>,
    ) -> Result<FeedPage, FetchError> {
        let endpoint = self.query_endpoint()?;
        let msg_types = if query.msg_types.is_empty() {
            Value::Null
        } else {
            json!(query.msg_types)
        };
        let variables = json!({
            "address": query.address,
            "msgType": msg_types,
            "limit": query.page_size,
            "cursor": cursor.map(|c| c.0.clone()),
            "allow_latest_inconsistent_data": query.allow_latest_inconsistent_data,
        });
        let data: MessagesData = self.query(endpoint, MESSAGES_QUERY, variables).await?;
        Ok(data.into_page())
    }
}

/// `{endpoint}/graphql`, whatever trailing slash the endpoint has.
pub fn graphql_url(endpoint: &http::Uri) -> String {
    format!("{}/graphql", endpoint.to_string().trim_end_matches('/'))
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorMessage {
    message: String,
}

impl<T> GraphqlResponse<T> {
    fn into_data(self) -> Result<T, FetchError> {
        if !self.errors.is_empty() {
            let messages: Vec<String> = self.errors.into_iter().map(|e| e.message).collect();
            return Err(FetchError::Graphql(messages.join("; ")));
        }
        self.data
            .ok_or_else(|| FetchError::Malformed("response has neither data nor errors".into()))
    }
}

#[derive(Debug, Deserialize)]
struct MessagesData {
    blockchain: MessagesBlockchain,
}

#[derive(Debug, Deserialize)]
struct MessagesBlockchain {
    account: Option<MessagesAccount>,
}

#[derive(Debug, Deserialize)]
struct MessagesAccount {
    messages: MessagesConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagesConnection {
    edges: Vec<MessageEdge>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct MessageEdge {
    node: Record,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    start_cursor: Option<String>,
    has_previous_page: bool,
}

impl MessagesData {
    // an unknown account has no history
    fn into_page(self) -> FeedPage {
        match self.blockchain.account {
            Some(account) => FeedPage {
                records: account
                    .messages
                    .edges
                    .into_iter()
                    .map(|edge| edge.node)
                    .collect(),
                start_cursor: account.messages.page_info.start_cursor.map(Cursor),
                has_more: account.messages.page_info.has_previous_page,
            },
            None => FeedPage {
                records: Vec::new(),
                start_cursor: None,
                has_more: false,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageStatusData {
    blockchain: MessageStatusBlockchain,
}

#[derive(Debug, Deserialize)]
struct MessageStatusBlockchain {
    message: Option<MessageState>,
}

#[derive(Debug, Deserialize)]
struct MessageState {
    status_name: Option<String>,
    dst_transaction: Option<DstTransaction>,
}

#[derive(Debug, Deserialize)]
struct DstTransaction {
    hash: String,
    block_id: Option<String>,
    now: Option<u32>,
    #[serde(default)]
    aborted: bool,
    compute: Option<ComputePhase>,
}

#[derive(Debug, Deserialize)]
struct ComputePhase {
    exit_code: Option<i32>,
}

impl MessageState {
    fn rejection(&self) -> Option<RejectionError> {
        if self.status_name.as_deref() == Some("Refused") {
            return Some(RejectionError {
                reason: "message refused by the network".to_string(),
                exit_code: None,
            });
        }
        match &self.dst_transaction {
            Some(transaction) if transaction.aborted => Some(RejectionError {
                reason: format!("transaction {} aborted", transaction.hash),
                exit_code: transaction.compute.as_ref().and_then(|c| c.exit_code),
            }),
            _ => None,
        }
    }
}
