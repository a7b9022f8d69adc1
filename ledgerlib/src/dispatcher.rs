//! Runs a batch of trackers under one concurrency budget.

use std::time::Duration;

use chrono::Local;
use futures::{future::join_all, stream, StreamExt};
use ledger_netutils::{LedgerBoundary, Request};
use ledger_status::progress::ProgressObserver;
use ledgerconfig::LedgerConfig;

use crate::outcome::BatchReport;
use crate::tracker::ConfirmationTracker;

/// Settings that would make a dispatch meaningless.
#[allow(missing_docs)] // error types document themselves
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DispatchConfigError {
    #[error("concurrency limit must be at least 1")]
    ZeroConcurrency,
    #[error("message timeout must be longer than zero")]
    ZeroTimeout,
}

/// Validated knobs of a dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchSettings {
    concurrency_limit: usize,
    message_timeout: Duration,
}

impl DispatchSettings {
    /// Rejects a zero limit or a zero timeout.
    pub fn new(
        concurrency_limit: usize,
        message_timeout: Duration,
    ) -> Result<Self, DispatchConfigError> {
        if concurrency_limit == 0 {
            return Err(DispatchConfigError::ZeroConcurrency);
        }
        if message_timeout.is_zero() {
            return Err(DispatchConfigError::ZeroTimeout);
        }
        Ok(DispatchSettings {
            concurrency_limit,
            message_timeout,
        })
    }

    /// Takes the limit and timeout from the config.
    pub fn from_config(config: &LedgerConfig) -> Result<Self, DispatchConfigError> {
        Self::new(config.concurrency_limit, config.message_timeout)
    }

    /// Most trackers alive at once.
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// How long one tracker waits for finalization.
    pub fn message_timeout(&self) -> Duration {
        self.message_timeout
    }
}

/// Tracks every request to a terminal outcome, at most `concurrency_limit` at a time.
///
/// One failing message never affects the others, and there is exactly one outcome per
/// request. Outcomes are in completion order; use [`BatchReport::sort_by_label`] for a
/// stable order.
pub async fn dispatch<B, O>(
    boundary: &B,
    requests: Vec<Request>,
    settings: DispatchSettings,
    observer: &O,
) -> BatchReport
where
    B: LedgerBoundary,
    O: ProgressObserver + ?Sized,
{
    let started_at = Local::now();
    log::info!(
        "Dispatching {} requests, {} at a time",
        requests.len(),
        settings.concurrency_limit
    );
    let outcomes = stream::iter(requests)
        .map(|request| {
            ConfirmationTracker::new(boundary, observer, request).track(settings.message_timeout)
        })
        .buffer_unordered(settings.concurrency_limit)
        .inspect(|labeled| log::debug!("{labeled}"))
        .collect::<Vec<_>>()
        .await;
    let report = BatchReport::new(outcomes, started_at, Local::now());
    log::info!("{}", report.stats);
    report
}

/// Dispatches every chunk at once, each under its own `settings`, one report per chunk in
/// chunk order.
pub async fn dispatch_chunks<B, O>(
    boundary: &B,
    chunks: Vec<Vec<Request>>,
    settings: DispatchSettings,
    observer: &O,
) -> Vec<BatchReport>
where
    B: LedgerBoundary,
    O: ProgressObserver + ?Sized,
{
    join_all(
        chunks
            .into_iter()
            .map(|chunk| dispatch(boundary, chunk, settings, observer)),
    )
    .await
}
