//! Broadcast outcome

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    broadcast::FailureKind,
    recipients::{RecipientAddress, RecipientSet},
};

/// A recipient whose send attempt failed
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedRecipient {
    /// The recipient
    pub address: RecipientAddress,

    /// The classified reason
    pub kind: FailureKind,

    /// The transport's description of the error
    pub detail: String,
}

/// Summary of a finished broadcast.
///
/// `succeeded + failed.len() + skipped.len() == total`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DispatchOutcome {
    /// Identifies the broadcast in logs
    pub id: Uuid,

    /// Number of recipients in the broadcast
    pub total: usize,

    /// Number of recipients the server accepted the message for
    pub succeeded: usize,

    /// Failed recipients, in the order their attempts finished
    pub failed: Vec<FailedRecipient>,

    /// Recipients never attempted because the broadcast was cancelled, in input order
    pub skipped: Vec<RecipientAddress>,

    /// Whether the broadcast was cancelled before every recipient was admitted
    pub cancelled: bool,

    /// When the broadcast started
    pub started_at: DateTime<Utc>,

    /// When the last attempt finished
    pub finished_at: DateTime<Utc>,
}

impl DispatchOutcome {
    /// Every recipient received the message
    pub fn is_success(&self) -> bool {
        self.succeeded == self.total
    }

    /// Some, but not all, recipients received the message
    pub fn is_partial_failure(&self) -> bool {
        self.succeeded > 0 && self.succeeded < self.total
    }

    /// The failed recipients, for a follow-up broadcast
    pub fn failed_recipients(&self) -> RecipientSet {
        self.failed
            .iter()
            .map(|failure| failure.address.clone())
            .collect()
    }

    /// Number of failures of the given kind
    pub fn count_of(&self, kind: FailureKind) -> usize {
        self.failed
            .iter()
            .filter(|failure| failure.kind == kind)
            .count()
    }
}

/// Collects attempt results while a broadcast runs.
///
/// Owned by exactly one collector; attempts report to it over a channel.
#[derive(Debug)]
pub(super) struct OutcomeAccumulator {
    id: Uuid,
    total: usize,
    succeeded: usize,
    failed: Vec<FailedRecipient>,
    started_at: DateTime<Utc>,
}

impl OutcomeAccumulator {
    pub(super) fn new(id: Uuid, total: usize) -> Self {
        Self {
            id,
            total,
            succeeded: 0,
            failed: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub(super) fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub(super) fn record_failure(&mut self, failure: FailedRecipient) {
        self.failed.push(failure);
    }

    pub(super) fn finish(self, skipped: Vec<RecipientAddress>, cancelled: bool) -> DispatchOutcome {
        DispatchOutcome {
            id: self.id,
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped,
            cancelled,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(address: &str, kind: FailureKind) -> FailedRecipient {
        FailedRecipient {
            address: RecipientAddress::new_unchecked(address),
            kind,
            detail: String::new(),
        }
    }

    #[test]
    fn test_accumulator_builds_outcome() {
        let mut accumulator = OutcomeAccumulator::new(Uuid::now_v7(), 4);

        accumulator.record_success();
        accumulator.record_failure(failure("b@x.com", FailureKind::Timeout));
        accumulator.record_failure(failure("c@x.com", FailureKind::Timeout));

        let outcome = accumulator.finish(vec![RecipientAddress::new_unchecked("d@x.com")], true);

        assert_eq!(outcome.total, 4);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.count_of(FailureKind::Timeout), 2);
        assert!(outcome.cancelled);
        assert!(outcome.is_partial_failure());
        assert!(!outcome.is_success());
        assert!(outcome.finished_at >= outcome.started_at);
    }

    #[test]
    fn test_failed_recipients_keep_completion_order() {
        let mut accumulator = OutcomeAccumulator::new(Uuid::now_v7(), 2);

        accumulator.record_failure(failure("z@x.com", FailureKind::Unknown));
        accumulator.record_failure(failure("a@x.com", FailureKind::Unknown));

        let retry = accumulator.finish(Vec::new(), false).failed_recipients();

        let listed: Vec<&str> = retry.iter().map(RecipientAddress::as_str).collect();

        assert_eq!(listed, vec!["z@x.com", "a@x.com"]);
    }

    #[test]
    fn test_empty_broadcast_is_a_success() {
        let outcome = OutcomeAccumulator::new(Uuid::now_v7(), 0).finish(Vec::new(), false);

        assert!(outcome.is_success());
        assert!(!outcome.is_partial_failure());
    }
}
