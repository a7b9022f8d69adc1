//! Progress events emitted at every phase transition of a tracked message.
//!
//! Observers are notified synchronously and must not block. Nothing they do can
//! change the outcome of the message.

use crate::confirmation_status::ConfirmationStatus;

/// One phase transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Label of the request being tracked.
    pub label: String,
    /// State before the transition.
    pub from: ConfirmationStatus,
    /// State after the transition.
    pub to: ConfirmationStatus,
    /// Message id, once the boundary assigned one.
    pub message_id: Option<String>,
    /// Block the message was included in, if known.
    pub block_id: Option<String>,
    /// Error text for failed transitions.
    pub detail: Option<String>,
}

impl ProgressEvent {
    /// Event without any of the optional fields set.
    pub fn new(label: impl Into<String>, from: ConfirmationStatus, to: ConfirmationStatus) -> Self {
        ProgressEvent {
            label: label.into(),
            from,
            to,
            message_id: None,
            block_id: None,
            detail: None,
        }
    }

    /// Set the message id.
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Set the block id.
    pub fn with_block_id(mut self, block_id: impl Into<String>) -> Self {
        self.block_id = Some(block_id.into());
        self
    }

    /// Set the detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let items = [
            Some(format!("[{}]", self.to)),
            Some(self.label.clone()),
            self.message_id.as_ref().map(|id| format!("MsgID: {id}")),
            self.block_id.as_ref().map(|id| format!("BlockID: {id}")),
            self.detail.as_ref().map(|detail| format!("Error: {detail}")),
        ];
        let line = items.into_iter().flatten().collect::<Vec<_>>().join("\t");
        write!(f, "{line}")
    }
}

/// Receives progress events from trackers.
pub trait ProgressObserver: Send + Sync {
    /// Called once per transition, in transition order for a given message.
    fn on_transition(&self, event: &ProgressEvent);
}

/// Ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_transition(&self, _event: &ProgressEvent) {}
}

/// Writes every event to the debug log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_transition(&self, event: &ProgressEvent) {
        log::debug!("{event}");
    }
}

impl<O: ProgressObserver + ?Sized> ProgressObserver for &O {
    fn on_transition(&self, event: &ProgressEvent) {
        (**self).on_transition(event)
    }
}
