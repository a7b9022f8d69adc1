//! A scripted [`LedgerBoundary`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use ledger_netutils::{
    AwaitError, Cursor, FeedPage, FetchError, FinalizationReport, InclusionReport,
    LedgerBoundary, PageQuery, RejectionError, Request, SubmissionError, SubmissionHandle,
    TimeoutError, WireMessage,
};
use tokio::time::Instant;

use crate::feed::MockFeed;
use crate::FINALIZED_AT;

/// How the mock network treats the message of one label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Behaviour {
    /// included after `inclusion`, final `finalization` later
    Confirm {
        inclusion: Duration,
        finalization: Duration,
    },
    /// refused at submission
    RejectAtSubmit(String),
    /// included, then aborted
    RejectAfterInclusion(String),
    /// included, never final; only the caller's timeout ends the wait
    NeverFinalize,
    /// included, then the node reports the deadline passed
    ReportTimeout,
}

impl Default for Behaviour {
    fn default() -> Self {
        Behaviour::Confirm {
            inclusion: Duration::from_secs(1),
            finalization: Duration::from_secs(1),
        }
    }
}

/// In-memory network. Labels without a scripted [`Behaviour`] confirm after two seconds.
#[derive(Debug, Default)]
pub struct MockBoundary {
    behaviours: HashMap<String, Behaviour>,
    feed: Option<MockFeed>,
    submit_delay: Duration,
    labels_by_id: Mutex<HashMap<String, String>>,
    submissions: Mutex<Vec<String>>,
}

impl MockBoundary {
    /// Scripts the message of `label`.
    pub fn with_behaviour(mut self, label: impl Into<String>, behaviour: Behaviour) -> Self {
        self.behaviours.insert(label.into(), behaviour);
        self
    }

    /// Every `submit` takes this long before it answers.
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    /// History served by `fetch_page`. Without one every fetch fails.
    pub fn with_feed(mut self, feed: MockFeed) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Labels in submission order, one entry per `submit` call.
    pub fn submissions(&self) -> Vec<String> {
        lock(&self.submissions).clone()
    }

    /// How often the message of `label` was submitted.
    pub fn submit_count(&self, label: &str) -> usize {
        lock(&self.submissions)
            .iter()
            .filter(|submitted| *submitted == label)
            .count()
    }

    /// Fetches served by the feed.
    pub fn fetch_count(&self) -> usize {
        self.feed.as_ref().map_or(0, MockFeed::fetch_count)
    }

    fn behaviour_of(&self, message_id: &str) -> (String, Behaviour) {
        let label = lock(&self.labels_by_id)
            .get(message_id)
            .cloned()
            .unwrap_or_default();
        let behaviour = self
            .behaviours
            .get(&label)
            .cloned()
            .unwrap_or_default();
        (label, behaviour)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn inclusion_report(message_id: &str) -> InclusionReport {
    InclusionReport {
        block_id: format!("block-{message_id}"),
        transaction_id: format!("tx-{message_id}"),
    }
}

impl LedgerBoundary for MockBoundary {
    fn encode(&self, request: &Request) -> Result<WireMessage, SubmissionError> {
        // the label is part of the body so equal payloads still get distinct ids
        let payload = request.stamped_payload();
        let body = [request.label().as_bytes(), &b":"[..], &payload[..]].concat();
        let message = WireMessage::from_body_bytes(&body);
        lock(&self.labels_by_id).insert(message.id().clone(), request.label().clone());
        Ok(message)
    }

    async fn submit(&self, message: WireMessage) -> Result<SubmissionHandle, SubmissionError> {
        tokio::time::sleep(self.submit_delay).await;
        let (label, behaviour) = self.behaviour_of(message.id());
        lock(&self.submissions).push(label);
        match behaviour {
            Behaviour::RejectAtSubmit(reason) => Err(SubmissionError::Refused(reason)),
            _ => Ok(SubmissionHandle {
                message_id: message.id().clone(),
                accepted_by: 1,
            }),
        }
    }

    async fn await_inclusion(
        &self,
        handle: &SubmissionHandle,
        _deadline: Instant,
    ) -> Result<InclusionReport, AwaitError> {
        let (_, behaviour) = self.behaviour_of(&handle.message_id);
        if let Behaviour::Confirm { inclusion, .. } = behaviour {
            tokio::time::sleep(inclusion).await;
        }
        Ok(inclusion_report(&handle.message_id))
    }

    async fn await_finalization(
        &self,
        handle: &SubmissionHandle,
        inclusion: &InclusionReport,
        deadline: Instant,
    ) -> Result<FinalizationReport, AwaitError> {
        let (_, behaviour) = self.behaviour_of(&handle.message_id);
        match behaviour {
            Behaviour::Confirm { finalization, .. } => {
                tokio::time::sleep(finalization).await;
                Ok(FinalizationReport {
                    transaction_id: inclusion.transaction_id.clone(),
                    finalized_at: FINALIZED_AT,
                })
            }
            Behaviour::RejectAfterInclusion(reason) => Err(RejectionError {
                reason,
                exit_code: Some(101),
            }
            .into()),
            Behaviour::ReportTimeout => {
                tokio::time::sleep_until(deadline).await;
                Err(TimeoutError {
                    message_id: handle.message_id.clone(),
                }
                .into())
            }
            Behaviour::NeverFinalize | Behaviour::RejectAtSubmit(_) => {
                std::future::pending().await
            }
        }
    }

    async fn fetch_page(
        &self,
        query: &PageQuery,
        cursor: Option<&Cursor>,
    ) -> Result<FeedPage, FetchError> {
        match &self.feed {
            Some(feed) => feed.page(query, cursor),
            None => Err(FetchError::Transport("no feed".to_string())),
        }
    }
}
