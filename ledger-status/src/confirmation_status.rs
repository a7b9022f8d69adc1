//! A message can be:
//!  Prepared === encoded and signed, known only to the client
//!  Submitted === accepted by the network boundary, not yet in a block
//!  IncludedInBlock === executed in a block that is not final yet
//!  Finalized === irreversibly committed
//!  Expired === no finalization seen before the deadline, the message may still land
//!  Rejected === refused by the boundary or by the network

/// Confirmation states. Every tracked message is in exactly one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfirmationStatus {
    /// Encoded and ready to send.
    Prepared,
    /// Handed to the network.
    Submitted,
    /// Seen in a block.
    IncludedInBlock,
    /// Committed by the network. Terminal.
    Finalized,
    /// Deadline passed without finalization. Terminal, but not necessarily a failure.
    Expired,
    /// Refused at submission or after it. Terminal.
    Rejected,
}

/// A transition that the lifecycle does not allow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cannot move from {from:?} to {to:?}")]
pub struct InvalidTransition {
    /// state the message was in
    pub from: ConfirmationStatus,
    /// state that was requested
    pub to: ConfirmationStatus,
}

impl ConfirmationStatus {
    /// True once no further transition is possible.
    /// # Examples
    ///
    /// ```
    /// use ledger_status::confirmation_status::ConfirmationStatus;
    ///
    /// assert!(!ConfirmationStatus::Submitted.is_terminal());
    /// assert!(ConfirmationStatus::Expired.is_terminal());
    /// ```
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Expired | Self::Rejected)
    }

    /// A wrapper matching the Finalized case.
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized)
    }

    /// Whether `next` is a legal successor of `self`.
    /// # Examples
    ///
    /// ```
    /// use ledger_status::confirmation_status::ConfirmationStatus::*;
    ///
    /// assert!(Submitted.can_transition_to(IncludedInBlock));
    /// assert!(IncludedInBlock.can_transition_to(Rejected));
    /// assert!(!Prepared.can_transition_to(Finalized));
    /// assert!(!Finalized.can_transition_to(Expired));
    /// ```
    pub fn can_transition_to(&self, next: ConfirmationStatus) -> bool {
        use ConfirmationStatus::*;
        matches!(
            (self, next),
            (Prepared, Submitted)
                | (Prepared, Rejected)
                | (Submitted, IncludedInBlock)
                | (Submitted, Expired)
                | (Submitted, Rejected)
                | (IncludedInBlock, Finalized)
                | (IncludedInBlock, Expired)
                | (IncludedInBlock, Rejected)
        )
    }

    /// Returns `next` if the move is legal.
    pub fn advance(self, next: ConfirmationStatus) -> Result<ConfirmationStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ConfirmationStatus::*;
        let name = match self {
            Prepared => "prepared",
            Submitted => "submitted",
            IncludedInBlock => "included in block",
            Finalized => "finalized",
            Expired => "expired",
            Rejected => "rejected",
        };
        write!(f, "{name}")
    }
}
