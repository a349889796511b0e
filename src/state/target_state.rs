//! Lifecycle states of a single crawl target
//!
//! ```text
//! Queued -> RobotsDenied
//! Queued -> Fetching -> {Success, NotModified, TerminalFailure, SizeRejected}
//!           Fetching -> RetryableFailure -> Fetching ... -> TerminalFailure
//! outcome -> Recorded | Skipped
//! ```
//!
//! Every outcome settles into exactly one of `Recorded` (a manifest write)
//! or `Skipped` (a log write, or nothing for a fresh record).

use crate::HarvestError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetState {
    // ===== Active States =====
    /// Accepted by the frontier, waiting to be dispatched
    Queued,

    /// A request is in flight
    Fetching,

    // ===== Outcome States =====
    /// The body was received
    Success,

    /// The server answered 304 to a conditional request
    NotModified,

    /// robots.txt refused the URL; it was never requested
    RobotsDenied,

    /// A 4xx response, or retries ran out
    TerminalFailure,

    /// A retryable failure; another attempt follows
    RetryableFailure,

    /// The byte or count budget would overflow
    SizeRejected,

    // ===== Settled States =====
    /// Exactly one manifest write happened
    Recorded,

    /// Nothing was written to the manifest
    Skipped,
}

impl TargetState {
    /// Returns true if the target still needs work
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Fetching | Self::RetryableFailure)
    }

    /// Returns true for states that settle directly into `Recorded` or `Skipped`
    pub fn is_outcome(&self) -> bool {
        matches!(
            self,
            Self::Success
                | Self::NotModified
                | Self::RobotsDenied
                | Self::TerminalFailure
                | Self::SizeRejected
        )
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Recorded | Self::Skipped)
    }

    /// The settled state an outcome leads to
    pub fn settles_as(&self) -> Option<Self> {
        match self {
            Self::Success | Self::NotModified => Some(Self::Recorded),
            Self::RobotsDenied | Self::TerminalFailure | Self::SizeRejected => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Returns true if the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: Self) -> bool {
        use TargetState::*;
        match (self, next) {
            // A fresh record is skipped straight from the queue.
            (Queued, Fetching | RobotsDenied | SizeRejected | Skipped) => true,
            (
                Fetching,
                Success | NotModified | TerminalFailure | RetryableFailure | SizeRejected,
            ) => true,
            (RetryableFailure, Fetching | TerminalFailure) => true,
            (outcome, settled) if outcome.is_outcome() => outcome.settles_as() == Some(settled),
            _ => false,
        }
    }

    /// Moves to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition(self, next: Self) -> Result<Self, HarvestError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(HarvestError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Moves an outcome state to the settled state it leads to
    pub fn settle(self) -> Result<Self, HarvestError> {
        match self.settles_as() {
            Some(settled) => self.transition(settled),
            None => Err(HarvestError::InvalidTransition {
                from: self,
                to: Self::Recorded,
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Success => "success",
            Self::NotModified => "not_modified",
            Self::RobotsDenied => "robots_denied",
            Self::TerminalFailure => "terminal_failure",
            Self::RetryableFailure => "retryable_failure",
            Self::SizeRejected => "size_rejected",
            Self::Recorded => "recorded",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
