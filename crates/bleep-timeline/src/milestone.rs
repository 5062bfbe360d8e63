// TIMELINE: MILESTONE VOCABULARY
// Named points in a block's consensus lifecycle.
//
// INVARIANTS:
// 1. Every milestone has exactly one kebab-case name, used for display, parsing and serde
// 2. Exactly two milestones are terminal (grace-period-end, consensus-reached)

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A named point in a block's consensus lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Milestone {
    Proposing,
    VrfGenerated,
    ReceivedCommitSig,
    CrosslinkProposal,
    CommitSigReady,
    NewBlockProposal,
    StartingConsensus,
    SentAnnounce,
    FirstPrepare,
    EnoughPrepared,
    SentPrepare,
    FirstCommit,
    EnoughCommitted,
    NinetyFivePercentCommitted,
    GracePeriodStart,
    AllCommitted,
    GracePeriodEnd,
    SentCommitted,
    InsertedNewBlock,
    ConsensusReached,
}

impl Milestone {
    pub const ALL: [Milestone; 20] = [
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
        Milestone::NinetyFivePercentCommitted,
        Milestone::GracePeriodStart,
        Milestone::AllCommitted,
        Milestone::GracePeriodEnd,
        Milestone::SentCommitted,
        Milestone::InsertedNewBlock,
        Milestone::ConsensusReached,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Milestone::Proposing => "proposing",
            Milestone::VrfGenerated => "vrf-generated",
            Milestone::ReceivedCommitSig => "received-commit-sig",
            Milestone::CrosslinkProposal => "crosslink-proposal",
            Milestone::CommitSigReady => "commit-sig-ready",
            Milestone::NewBlockProposal => "new-block-proposal",
            Milestone::StartingConsensus => "starting-consensus",
            Milestone::SentAnnounce => "sent-announce",
            Milestone::FirstPrepare => "first-prepare",
            Milestone::EnoughPrepared => "enough-prepared",
            Milestone::SentPrepare => "sent-prepare",
            Milestone::FirstCommit => "first-commit",
            Milestone::EnoughCommitted => "enough-committed",
            Milestone::NinetyFivePercentCommitted => "95%-committed",
            Milestone::GracePeriodStart => "grace-period-start",
            Milestone::AllCommitted => "100%-committed",
            Milestone::GracePeriodEnd => "grace-period-end",
            Milestone::SentCommitted => "sent-committed",
            Milestone::InsertedNewBlock => "inserted-new-block",
            Milestone::ConsensusReached => "consensus-reached",
        }
    }

    /// Terminal milestones finalize a block once both are present.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Milestone::GracePeriodEnd | Milestone::ConsensusReached)
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a milestone name is not part of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown milestone name: {0}")]
pub struct UnknownMilestone(pub String);

impl FromStr for Milestone {
    type Err = UnknownMilestone;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Milestone::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMilestone(s.to_string()))
    }
}

impl Serialize for Milestone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Milestone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
