//! Per message outcomes and their aggregation into a batch report.

use std::time::Duration;

use chrono::{DateTime, Local};

/// Local time format of the report lines.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// How tracking one message ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The message is final.
    Confirmed {
        /// ledger time of the transaction, unix seconds
        finalized_at: u32,
        /// from submission to finalization
        duration: Duration,
    },
    /// No confirmation in time. The message may still land; reconcile by `message_id`.
    Expired {
        /// id the network knows the message by
        message_id: String,
        /// what ended the wait
        detail: String,
    },
    /// The network refused or aborted the message.
    Rejected {
        /// what the network said
        detail: String,
    },
}

impl DispatchOutcome {
    /// Only `Confirmed` counts as success.
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Confirmed { .. })
    }
}

/// An outcome with the label of its request and when the request was made and answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabeledOutcome {
    /// label of the request
    pub label: String,
    /// when tracking started
    pub requested_at: DateTime<Local>,
    /// when the outcome was known
    pub responded_at: DateTime<Local>,
    /// the outcome
    pub outcome: DispatchOutcome,
}

impl std::fmt::Display for LabeledOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let requested = self.requested_at.format(TIME_FORMAT);
        match &self.outcome {
            DispatchOutcome::Confirmed {
                finalized_at,
                duration,
            } => write!(
                f,
                "[OK]\t{}\tRqTime: {}\tRsTime: {}\tTxTime: {}\tDuration: {}s",
                self.label,
                requested,
                self.responded_at.format(TIME_FORMAT),
                finalized_at,
                duration.as_secs()
            ),
            DispatchOutcome::Expired { message_id, detail } => write!(
                f,
                "[ERR]\t{}\tRqTime: {}\tRsTime: EXPIRED\tMsgID: {}\tError: {}",
                self.label, requested, message_id, detail
            ),
            DispatchOutcome::Rejected { detail } => write!(
                f,
                "[ERR]\t{}\tRqTime: {}\tRsTime: REJECTED\tError: {}",
                self.label, requested, detail
            ),
        }
    }
}

/// Counters derived from a list of outcomes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchStatistics {
    /// confirmed messages
    pub success_count: usize,
    /// expired and rejected messages
    pub failure_count: usize,
    /// when the dispatch call started
    pub started_at: DateTime<Local>,
    /// when the last tracker finished
    pub finished_at: DateTime<Local>,
}

impl BatchStatistics {
    /// Counts `outcomes`.
    pub fn from_outcomes(
        outcomes: &[LabeledOutcome],
        started_at: DateTime<Local>,
        finished_at: DateTime<Local>,
    ) -> Self {
        let success_count = outcomes
            .iter()
            .filter(|labeled| labeled.outcome.is_success())
            .count();
        BatchStatistics {
            success_count,
            failure_count: outcomes.len() - success_count,
            started_at,
            finished_at,
        }
    }

    /// Number of outcomes counted.
    pub fn total(&self) -> usize {
        self.success_count + self.failure_count
    }

    /// Wall clock span of the dispatch.
    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

impl std::fmt::Display for BatchStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[SUMMARY]\tSuccess: {}\tFailure: {}\tTotal time: {}s",
            self.success_count,
            self.failure_count,
            self.elapsed().as_secs()
        )
    }
}

/// Everything one dispatch call produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchReport {
    /// one per request, in completion order
    pub outcomes: Vec<LabeledOutcome>,
    /// derived from `outcomes`
    pub stats: BatchStatistics,
}

impl BatchReport {
    /// Builds the report, deriving the statistics.
    pub fn new(
        outcomes: Vec<LabeledOutcome>,
        started_at: DateTime<Local>,
        finished_at: DateTime<Local>,
    ) -> Self {
        let stats = BatchStatistics::from_outcomes(&outcomes, started_at, finished_at);
        BatchReport { outcomes, stats }
    }

    /// Outcome of the request labelled `label`.
    pub fn outcome_for(&self, label: &str) -> Option<&DispatchOutcome> {
        self.outcomes
            .iter()
            .find(|labeled| labeled.label == label)
            .map(|labeled| &labeled.outcome)
    }

    /// Outcomes sorted by label.
    pub fn sort_by_label(&mut self) {
        self.outcomes.sort_by(|a, b| a.label.cmp(&b.label));
    }

    /// One line per outcome, then the summary.
    pub fn lines(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .map(ToString::to_string)
            .chain(std::iter::once(self.stats.to_string()))
            .collect()
    }

    /// Writes [`BatchReport::lines`] to the log.
    pub fn log(&self) {
        for labeled in &self.outcomes {
            if labeled.outcome.is_success() {
                log::info!("{labeled}");
            } else {
                log::warn!("{labeled}");
            }
        }
        log::info!("{}", self.stats);
    }

    /// Merges reports of concurrent dispatches into one summary.
    pub fn combined_stats(reports: &[BatchReport]) -> Option<BatchStatistics> {
        let started_at = reports.iter().map(|report| report.stats.started_at).min()?;
        let finished_at = reports.iter().map(|report| report.stats.finished_at).max()?;
        Some(BatchStatistics {
            success_count: reports.iter().map(|report| report.stats.success_count).sum(),
            failure_count: reports.iter().map(|report| report.stats.failure_count).sum(),
            started_at,
            finished_at,
        })
    }
}
