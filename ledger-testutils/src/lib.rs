//! In-memory stand-ins for the network used by the tests of every ledger crate.

pub mod boundary;
pub mod feed;
pub mod observer;

pub use boundary::{Behaviour, MockBoundary};
pub use feed::MockFeed;
pub use observer::RecordingObserver;

/// Ledger time reported by [`MockBoundary`] for every finalized message.
pub const FINALIZED_AT: u32 = 1_700_000_000;
