//! Quorum evaluation.
//!
//! A pure function from vote counts to an outcome. Rejection is checked
//! before approval so that a single evaluation can never both delete and
//! publish a report.

use serde::{Deserialize, Serialize};

use crate::model::VoteTally;

/// Approvals needed to publish a report.
pub const DEFAULT_APPROVAL_THRESHOLD: u32 = 2;

/// Rejections needed to delete a report.
pub const DEFAULT_REJECTION_THRESHOLD: u32 = 3;

/// Result of evaluating a tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pending,
    Approved,
    Rejected,
}

/// Vote thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumPolicy {
    pub approval_threshold: u32,
    pub rejection_threshold: u32,
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self {
            approval_threshold: DEFAULT_APPROVAL_THRESHOLD,
            rejection_threshold: DEFAULT_REJECTION_THRESHOLD,
        }
    }
}

impl QuorumPolicy {
    /// Build a policy, refusing zero thresholds (they would finalize a report
    /// before anyone voted).
    pub fn new(approval_threshold: u32, rejection_threshold: u32) -> Result<Self, String> {
        if approval_threshold == 0 {
            return Err("approval threshold must be at least 1".to_string());
        }
        if rejection_threshold == 0 {
            return Err("rejection threshold must be at least 1".to_string());
        }
        Ok(Self {
            approval_threshold,
            rejection_threshold,
        })
    }

    pub fn evaluate(&self, tally: VoteTally) -> Outcome {
        if tally.rejections >= self.rejection_threshold {
            Outcome::Rejected
        } else if tally.approvals >= self.approval_threshold {
            Outcome::Approved
        } else {
            Outcome::Pending
        }
    }
}

/// Evaluate counts against the default thresholds.
pub fn evaluate(approvals: u32, rejections: u32) -> Outcome {
    QuorumPolicy::default().evaluate(VoteTally::new(approvals, rejections))
}
