//! Follows one message from submission to a terminal state.

use std::time::Duration;

use chrono::Local;
use ledger_netutils::{
    AwaitError, FinalizationReport, LedgerBoundary, Request, SubmissionError, SubmissionHandle,
};
use ledger_status::confirmation_status::ConfirmationStatus;
use ledger_status::progress::{ProgressEvent, ProgressObserver};
use tokio::time::Instant;

use crate::outcome::{DispatchOutcome, LabeledOutcome};

/// Drives exactly one [`Request`] through
/// `Prepared -> Submitted -> IncludedInBlock -> Finalized`, or out through `Expired` or
/// `Rejected`, telling the observer about every step.
///
/// Consumed by the wait, so a tracker can produce only one outcome.
pub struct ConfirmationTracker<'a, B, O: ?Sized> {
    boundary: &'a B,
    observer: &'a O,
    request: Request,
    status: ConfirmationStatus,
    submitted_at: Option<Instant>,
}

impl<'a, B, O> ConfirmationTracker<'a, B, O>
where
    B: LedgerBoundary,
    O: ProgressObserver + ?Sized,
{
    /// A tracker in `Prepared`.
    pub fn new(boundary: &'a B, observer: &'a O, request: Request) -> Self {
        ConfirmationTracker {
            boundary,
            observer,
            request,
            status: ConfirmationStatus::Prepared,
            submitted_at: None,
        }
    }

    /// Current state.
    pub fn status(&self) -> ConfirmationStatus {
        self.status
    }

    /// Label of the tracked request.
    pub fn label(&self) -> &str {
        self.request.label()
    }

    fn transition(&mut self, event: ProgressEvent) {
        match self.status.advance(event.to) {
            Ok(next) => {
                self.status = next;
                self.observer.on_transition(&event);
            }
            Err(e) => log::error!("{}: {}", self.request.label(), e),
        }
    }

    fn event(&self, to: ConfirmationStatus) -> ProgressEvent {
        ProgressEvent::new(self.request.label().clone(), self.status, to)
    }

    /// Encodes and submits the request. On failure the tracker is `Rejected`.
    pub async fn submit(&mut self) -> Result<SubmissionHandle, SubmissionError> {
        self.submitted_at = Some(Instant::now());
        let submitted = match self.boundary.encode(&self.request) {
            Ok(message) => self.boundary.submit(message).await,
            Err(e) => Err(e),
        };
        match &submitted {
            Ok(handle) => {
                let event = self
                    .event(ConfirmationStatus::Submitted)
                    .with_message_id(handle.message_id.clone());
                self.transition(event);
            }
            Err(e) => {
                let event = self
                    .event(ConfirmationStatus::Rejected)
                    .with_detail(e.to_string());
                self.transition(event);
            }
        }
        submitted
    }

    async fn await_final(
        &mut self,
        handle: &SubmissionHandle,
        deadline: Instant,
    ) -> Result<FinalizationReport, AwaitError> {
        let inclusion = self.boundary.await_inclusion(handle, deadline).await?;
        let event = self
            .event(ConfirmationStatus::IncludedInBlock)
            .with_message_id(handle.message_id.clone())
            .with_block_id(inclusion.block_id.clone());
        self.transition(event);
        self.boundary
            .await_finalization(handle, &inclusion, deadline)
            .await
    }

    /// Waits until the message is final, rejected, or `timeout` has passed since this call.
    /// The confirmed duration counts from the start of [`Self::submit`].
    ///
    /// A timeout only stops the wait. The message itself stays on the network and may
    /// still be executed.
    pub async fn await_confirmation(
        mut self,
        handle: &SubmissionHandle,
        timeout: Duration,
    ) -> DispatchOutcome {
        let waiting_since = Instant::now();
        let deadline = waiting_since + timeout;
        let started = self.submitted_at.unwrap_or(waiting_since);
        let waited = tokio::time::timeout_at(deadline, self.await_final(handle, deadline)).await;

        let (to, outcome) = match waited {
            Ok(Ok(report)) => (
                ConfirmationStatus::Finalized,
                DispatchOutcome::Confirmed {
                    finalized_at: report.finalized_at,
                    duration: started.elapsed(),
                },
            ),
            Ok(Err(AwaitError::Rejected(e))) => (
                ConfirmationStatus::Rejected,
                DispatchOutcome::Rejected {
                    detail: e.to_string(),
                },
            ),
            Ok(Err(e)) => (
                ConfirmationStatus::Expired,
                DispatchOutcome::Expired {
                    message_id: handle.message_id.clone(),
                    detail: e.to_string(),
                },
            ),
            Err(_) => (
                ConfirmationStatus::Expired,
                DispatchOutcome::Expired {
                    message_id: handle.message_id.clone(),
                    detail: format!("not finalized within {}s", timeout.as_secs()),
                },
            ),
        };
        let mut event = self.event(to).with_message_id(handle.message_id.clone());
        match &outcome {
            DispatchOutcome::Expired { detail, .. } | DispatchOutcome::Rejected { detail } => {
                event = event.with_detail(detail.clone());
            }
            DispatchOutcome::Confirmed { .. } => {}
        }
        self.transition(event);
        outcome
    }

    /// Submits, then waits up to `timeout` for confirmation.
    pub async fn track(mut self, timeout: Duration) -> LabeledOutcome {
        let requested_at = Local::now();
        let label = self.request.label().clone();
        let outcome = match self.submit().await {
            Ok(handle) => self.await_confirmation(&handle, timeout).await,
            Err(e) => DispatchOutcome::Rejected {
                detail: e.to_string(),
            },
        };
        LabeledOutcome {
            label,
            requested_at,
            responded_at: Local::now(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_status::progress::NoopObserver;
    use ledger_status::confirmation_status::ConfirmationStatus::*;
    use ledger_testutils::{Behaviour, MockBoundary, RecordingObserver, FINALIZED_AT};

    const TIMEOUT: Duration = Duration::from_secs(60);

    async fn track(boundary: &MockBoundary, observer: &RecordingObserver) -> DispatchOutcome {
        ConfirmationTracker::new(boundary, observer, Request::new("a", b"call".to_vec()))
            .track(TIMEOUT)
            .await
            .outcome
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_message_walks_every_phase() {
        let boundary = MockBoundary::default();
        let observer = RecordingObserver::default();

        let outcome = track(&boundary, &observer).await;

        match outcome {
            DispatchOutcome::Confirmed {
                finalized_at,
                duration,
            } => {
                assert_eq!(finalized_at, FINALIZED_AT);
                assert_eq!(duration.as_secs(), 2);
            }
            other => panic!("expected confirmation, got {other:?}"),
        }
        assert_eq!(
            observer.path_of("a"),
            [Prepared, Submitted, IncludedInBlock, Finalized]
        );
        let events = observer.events();
        assert!(events[1].block_id.as_deref().unwrap().starts_with("block-"));
    }

    #[tokio::test(start_paused = true)]
    async fn duration_includes_submission_time() {
        let boundary = MockBoundary::default().with_submit_delay(Duration::from_secs(10));
        let started = Instant::now();

        let outcome = track(&boundary, &RecordingObserver::default()).await;

        assert_eq!(started.elapsed().as_secs(), 12);
        match outcome {
            DispatchOutcome::Confirmed { duration, .. } => assert_eq!(duration.as_secs(), 12),
            other => panic!("expected confirmation, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn submission_failure_is_rejected() {
        let boundary = MockBoundary::default()
            .with_behaviour("a", Behaviour::RejectAtSubmit("insufficient balance".to_string()));
        let observer = RecordingObserver::default();

        let outcome = track(&boundary, &observer).await;

        assert!(
            matches!(&outcome, DispatchOutcome::Rejected { detail } if detail.contains("insufficient balance"))
        );
        assert_eq!(observer.path_of("a"), [Prepared, Rejected]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_after_inclusion_is_not_retried() {
        let boundary = MockBoundary::default()
            .with_behaviour("a", Behaviour::RejectAfterInclusion("aborted".to_string()));
        let observer = RecordingObserver::default();

        let outcome = track(&boundary, &observer).await;

        assert!(matches!(outcome, DispatchOutcome::Rejected { .. }));
        assert_eq!(boundary.submit_count("a"), 1);
        assert_eq!(
            observer.path_of("a"),
            [Prepared, Submitted, IncludedInBlock, Rejected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_expires_with_message_id() {
        let boundary = MockBoundary::default().with_behaviour("a", Behaviour::NeverFinalize);
        let observer = RecordingObserver::default();
        let started = Instant::now();

        let outcome = track(&boundary, &observer).await;

        assert!(started.elapsed() >= TIMEOUT);
        match outcome {
            DispatchOutcome::Expired { message_id, .. } => {
                assert_eq!(Some(message_id), observer.events()[0].message_id)
            }
            other => panic!("expected expiry, got {other:?}"),
        }
        assert_eq!(boundary.submit_count("a"), 1);
        assert_eq!(
            observer.path_of("a"),
            [Prepared, Submitted, IncludedInBlock, Expired]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn boundary_timeout_expires() {
        let boundary = MockBoundary::default().with_behaviour("a", Behaviour::ReportTimeout);
        let outcome = track(&boundary, &RecordingObserver::default()).await;
        assert!(matches!(outcome, DispatchOutcome::Expired { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn submit_then_await_separately() {
        let boundary = MockBoundary::default();
        let mut tracker =
            ConfirmationTracker::new(&boundary, &NoopObserver, Request::new("x", Vec::new()));

        let handle = tracker.submit().await.unwrap();
        assert_eq!(tracker.status(), Submitted);
        assert_eq!(tracker.label(), "x");

        let outcome = tracker.await_confirmation(&handle, TIMEOUT).await;
        assert!(outcome.is_success());
    }
}
