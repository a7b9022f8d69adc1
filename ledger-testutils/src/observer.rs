//! Observer that keeps every event for later assertions.

use std::sync::Mutex;

use ledger_status::confirmation_status::ConfirmationStatus;
use ledger_status::progress::{ProgressEvent, ProgressObserver};

/// Records progress events in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingObserver {
    /// Every event so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The states the message of `label` moved through, starting with `Prepared`.
    pub fn path_of(&self, label: &str) -> Vec<ConfirmationStatus> {
        let events = self.events();
        let mut path = events
            .iter()
            .find(|event| event.label == label)
            .map(|event| vec![event.from])
            .unwrap_or_default();
        path.extend(
            events
                .iter()
                .filter(|event| event.label == label)
                .map(|event| event.to),
        );
        path
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_transition(&self, event: &ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
