//! Repeated dispatch of fresh batches on a fixed interval.

use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use ledger_netutils::{LedgerBoundary, Request};
use ledger_status::progress::ProgressObserver;
use tokio::time::MissedTickBehavior;

use crate::dispatcher::{dispatch, DispatchSettings};
use crate::outcome::BatchReport;

/// How often to start a batch and how many to start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplaySettings {
    /// time between two batch starts
    pub interval: Duration,
    /// `None` replays forever
    pub max_invocations: Option<usize>,
}

/// Starts a dispatch of `generate(n)` every `interval`, without waiting for earlier ones,
/// and hands each report to `emit` as it completes. Reports are never merged.
///
/// Returns the number of invocations once `max_invocations` have all finished.
pub async fn replay<B, O, G, E>(
    boundary: &B,
    dispatch_settings: DispatchSettings,
    settings: ReplaySettings,
    observer: &O,
    mut generate: G,
    mut emit: E,
) -> usize
where
    B: LedgerBoundary,
    O: ProgressObserver + ?Sized,
    G: FnMut(usize) -> Vec<Request>,
    E: FnMut(usize, BatchReport),
{
    let mut ticks = tokio::time::interval(settings.interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight = FuturesUnordered::new();
    let mut started = 0;

    loop {
        let may_start = settings
            .max_invocations
            .map_or(true, |max_invocations| started < max_invocations);
        if !may_start && in_flight.is_empty() {
            return started;
        }
        tokio::select! {
            _ = ticks.tick(), if may_start => {
                let invocation = started;
                let batch = generate(invocation);
                log::info!("Replay {} starts with {} requests", invocation, batch.len());
                in_flight.push(async move {
                    (invocation, dispatch(boundary, batch, dispatch_settings, observer).await)
                });
                started += 1;
            }
            Some((invocation, report)) = in_flight.next(), if !in_flight.is_empty() => {
                emit(invocation, report);
            }
        }
    }
}
