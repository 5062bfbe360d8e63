// TIMELINE: METRIC ORDERING POLICY
// Versioned sequence of milestones whose adjacent pairs are compared for
// interval reporting. The sequence changes release to release, so it lives
// here as data rather than in the state machine.

use crate::milestone::Milestone;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("Unknown policy version: {0}")]
    UnknownVersion(String),

    #[error("Metric sequence is empty")]
    Empty,

    #[error("Milestone {0} appears more than once in the metric sequence")]
    Duplicate(Milestone),
}

/// Built-in metric sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyVersion {
    /// Minimum common set shared by every release.
    #[default]
    Baseline,
    /// Crosslink proposal ahead of commit sigs, 100% commit before grace end.
    CrosslinkFirst,
    /// Every milestone the classifier knows about.
    Extended,
    /// Operator supplied sequence.
    Custom,
}

impl PolicyVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyVersion::Baseline => "baseline",
            PolicyVersion::CrosslinkFirst => "crosslink-first",
            PolicyVersion::Extended => "extended",
            PolicyVersion::Custom => "custom",
        }
    }
}

impl fmt::Display for PolicyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyVersion {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(PolicyVersion::Baseline),
            "crosslink-first" => Ok(PolicyVersion::CrosslinkFirst),
            "extended" => Ok(PolicyVersion::Extended),
            "custom" => Ok(PolicyVersion::Custom),
            other => Err(PolicyError::UnknownVersion(other.to_string())),
        }
    }
}

const BASELINE: &[Milestone] = &[
    Milestone::Proposing,
    Milestone::ReceivedCommitSig,
    Milestone::CrosslinkProposal,
    Milestone::CommitSigReady,
    Milestone::NewBlockProposal,
    Milestone::StartingConsensus,
    Milestone::SentAnnounce,
    Milestone::FirstPrepare,
    Milestone::EnoughPrepared,
    Milestone::SentPrepare,
    Milestone::FirstCommit,
    Milestone::EnoughCommitted,
    Milestone::GracePeriodEnd,
    Milestone::ConsensusReached,
];

const CROSSLINK_FIRST: &[Milestone] = &[
    Milestone::Proposing,
    Milestone::CrosslinkProposal,
    Milestone::ReceivedCommitSig,
    Milestone::CommitSigReady,
    Milestone::NewBlockProposal,
    Milestone::StartingConsensus,
    Milestone::SentAnnounce,
    Milestone::FirstPrepare,
    Milestone::EnoughPrepared,
    Milestone::SentPrepare,
    Milestone::FirstCommit,
    Milestone::EnoughCommitted,
    Milestone::AllCommitted,
    Milestone::GracePeriodEnd,
    Milestone::ConsensusReached,
];

const EXTENDED: &[Milestone] = &[
    Milestone::Proposing,
    Milestone::VrfGenerated,
    Milestone::ReceivedCommitSig,
    Milestone::CrosslinkProposal,
    Milestone::CommitSigReady,
    Milestone::NewBlockProposal,
    Milestone::StartingConsensus,
    Milestone::SentAnnounce,
    Milestone::FirstPrepare,
    Milestone::EnoughPrepared,
    Milestone::SentPrepare,
    Milestone::FirstCommit,
    Milestone::EnoughCommitted,
    Milestone::GracePeriodStart,
    Milestone::NinetyFivePercentCommitted,
    Milestone::AllCommitted,
    Milestone::GracePeriodEnd,
    Milestone::SentCommitted,
    Milestone::InsertedNewBlock,
    Milestone::ConsensusReached,
];

/// An ordered, duplicate-free milestone sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricPolicy {
    version: PolicyVersion,
    sequence: Vec<Milestone>,
}

impl MetricPolicy {
    /// One of the built-in sequences. `Custom` falls back to the baseline list.
    pub fn builtin(version: PolicyVersion) -> Self {
        let sequence = match version {
            PolicyVersion::Baseline | PolicyVersion::Custom => BASELINE,
            PolicyVersion::CrosslinkFirst => CROSSLINK_FIRST,
            PolicyVersion::Extended => EXTENDED,
        };
        MetricPolicy {
            version,
            sequence: sequence.to_vec(),
        }
    }

    pub fn custom(sequence: Vec<Milestone>) -> Result<Self, PolicyError> {
        if sequence.is_empty() {
            return Err(PolicyError::Empty);
        }
        let mut seen = HashSet::new();
        for milestone in &sequence {
            if !seen.insert(*milestone) {
                return Err(PolicyError::Duplicate(*milestone));
            }
        }
        Ok(MetricPolicy {
            version: PolicyVersion::Custom,
            sequence,
        })
    }

    pub fn version(&self) -> PolicyVersion {
        self.version
    }

    pub fn sequence(&self) -> &[Milestone] {
        &self.sequence
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Adjacent (earlier, later) pairs in sequence order.
    pub fn pairs(&self) -> impl Iterator<Item = (Milestone, Milestone)> + '_ {
        self.sequence.windows(2).map(|w| (w[0], w[1]))
    }
}

impl Default for MetricPolicy {
    fn default() -> Self {
        MetricPolicy::builtin(PolicyVersion::Baseline)
    }
}
