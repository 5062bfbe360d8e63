// TIMELINE: EVENT CLASSIFIER
// Maps a decoded log event to the milestone(s) it evidences.
//
// RULES:
// 1. Exact, byte-for-byte message match is tried first
// 2. Substring match is a last-resort tier, used only for pending crosslinks
// 3. Vote-added events are gated on the round having reached the matching phase

use crate::config::TimelineConfig;
use crate::event::{LogEvent, Phase};
use crate::milestone::Milestone;
use log::warn;

pub const PROPOSING_MESSAGE: &str = "PROPOSING NEW BLOCK ------------------------------------------------";
pub const VRF_GENERATED_MESSAGE: &str = "[GenerateVrfAndProof] Leader generated a VRF";
pub const RECEIVED_COMMIT_SIGS_MESSAGE: &str = "[ProposeNewBlock] received commit sigs asynchronously";
pub const COMMIT_SIGS_READY_MESSAGE: &str = "Commit sigs are ready";
pub const NEW_BLOCK_PROPOSED_MESSAGE: &str = "=========Successfully Proposed New Block==========";
pub const STARTING_CONSENSUS_MESSAGE: &str = "[ConsensusMainLoop] STARTING CONSENSUS";
pub const SENT_ANNOUNCE_MESSAGE: &str = "[Announce] Sent Announce Message!!";
pub const QUORUM_DETAILS_MESSAGE: &str = "Quorum details";
pub const VOTE_ADDED_MESSAGE: &str = "[AddNewVote] New Vote Added!";
pub const ENOUGH_PREPARED_MESSAGE: &str = "[OnPrepare] Received Enough Prepare Signatures";
pub const SENT_PREPARED_MESSAGE: &str = "[OnPrepare] Sent Prepared Message!!";
pub const TWO_THIRDS_COMMITTED_MESSAGE: &str = "[OnCommit] 2/3 Enough commits received";
pub const GRACE_PERIOD_START_MESSAGE: &str = "[OnCommit] Starting Grace Period";
pub const INSERTED_NEW_BLOCK_MESSAGE: &str = "Inserted new block";
pub const SENT_COMMITTED_MESSAGE: &str = "[preCommitAndPropose] Sent Committed Message";
pub const ALL_COMMITTED_MESSAGE: &str = "[OnCommit] 100% Enough commits received";
pub const GRACE_PERIOD_END_MESSAGE: &str = "[OnCommit] Commit Grace Period Ended";
pub const CONSENSUS_REACHED_MESSAGE: &str = "HOORAY!!!!!!! CONSENSUS REACHED!!!!!!!";
/// Matched by containment: the full message is prefixed with a crosslink count.
pub const PENDING_CROSSLINKS_FRAGMENT: &str = " pending crosslinks";

/// Message identity of a recognised log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Proposing,
    VrfGenerated,
    ReceivedCommitSigs,
    CommitSigsReady,
    NewBlockProposed,
    StartingConsensus,
    SentAnnounce,
    QuorumDetails,
    VoteAdded,
    EnoughPrepared,
    SentPrepared,
    TwoThirdsCommitted,
    GracePeriodStart,
    InsertedNewBlock,
    SentCommitted,
    AllCommitted,
    GracePeriodEnd,
    ConsensusReached,
    PendingCrosslinks,
}

impl MessageKind {
    /// Resolve message identity: exact tier first, then the substring tier.
    pub fn from_message(message: &str) -> Option<Self> {
        Self::exact(message).or_else(|| {
            message
                .contains(PENDING_CROSSLINKS_FRAGMENT)
                .then_some(MessageKind::PendingCrosslinks)
        })
    }

    fn exact(message: &str) -> Option<Self> {
        let kind = match message {
            PROPOSING_MESSAGE => MessageKind::Proposing,
            VRF_GENERATED_MESSAGE => MessageKind::VrfGenerated,
            RECEIVED_COMMIT_SIGS_MESSAGE => MessageKind::ReceivedCommitSigs,
            COMMIT_SIGS_READY_MESSAGE => MessageKind::CommitSigsReady,
            NEW_BLOCK_PROPOSED_MESSAGE => MessageKind::NewBlockProposed,
            STARTING_CONSENSUS_MESSAGE => MessageKind::StartingConsensus,
            SENT_ANNOUNCE_MESSAGE => MessageKind::SentAnnounce,
            QUORUM_DETAILS_MESSAGE => MessageKind::QuorumDetails,
            VOTE_ADDED_MESSAGE => MessageKind::VoteAdded,
            ENOUGH_PREPARED_MESSAGE => MessageKind::EnoughPrepared,
            SENT_PREPARED_MESSAGE => MessageKind::SentPrepared,
            TWO_THIRDS_COMMITTED_MESSAGE => MessageKind::TwoThirdsCommitted,
            GRACE_PERIOD_START_MESSAGE => MessageKind::GracePeriodStart,
            INSERTED_NEW_BLOCK_MESSAGE => MessageKind::InsertedNewBlock,
            SENT_COMMITTED_MESSAGE => MessageKind::SentCommitted,
            ALL_COMMITTED_MESSAGE => MessageKind::AllCommitted,
            GRACE_PERIOD_END_MESSAGE => MessageKind::GracePeriodEnd,
            CONSENSUS_REACHED_MESSAGE => MessageKind::ConsensusReached,
            _ => return None,
        };
        Some(kind)
    }
}

/// One milestone an event evidences, plus the milestone that must already be
/// recorded on the target block for the observation to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub milestone: Milestone,
    pub prerequisite: Option<Milestone>,
}

impl Observation {
    fn direct(milestone: Milestone) -> Self {
        Observation { milestone, prerequisite: None }
    }

    fn gated(milestone: Milestone, prerequisite: Milestone) -> Self {
        Observation {
            milestone,
            prerequisite: Some(prerequisite),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventClassifier {
    signer_power_field: String,
    commit_power_threshold: f64,
}

impl EventClassifier {
    pub fn new(config: &TimelineConfig) -> Self {
        EventClassifier {
            signer_power_field: config.signer_power_field.clone(),
            commit_power_threshold: config.commit_power_threshold,
        }
    }

    /// Observations carried by `event`; empty when the event is not recognised.
    pub fn classify(&self, event: &LogEvent) -> Vec<Observation> {
        let Some(kind) = MessageKind::from_message(event.message()) else {
            return Vec::new();
        };

        let direct = |m| vec![Observation::direct(m)];
        match kind {
            MessageKind::Proposing => direct(Milestone::Proposing),
            MessageKind::VrfGenerated => direct(Milestone::VrfGenerated),
            MessageKind::ReceivedCommitSigs => direct(Milestone::ReceivedCommitSig),
            MessageKind::CommitSigsReady => direct(Milestone::CommitSigReady),
            MessageKind::NewBlockProposed => direct(Milestone::NewBlockProposal),
            MessageKind::StartingConsensus => direct(Milestone::StartingConsensus),
            MessageKind::SentAnnounce => direct(Milestone::SentAnnounce),
            MessageKind::QuorumDetails => match event.phase() {
                Some(Phase::Prepare) => direct(Milestone::FirstPrepare),
                Some(Phase::Commit) => direct(Milestone::FirstCommit),
                None => Vec::new(),
            },
            MessageKind::VoteAdded => self.classify_vote(event),
            MessageKind::EnoughPrepared => direct(Milestone::EnoughPrepared),
            MessageKind::SentPrepared => direct(Milestone::SentPrepare),
            MessageKind::TwoThirdsCommitted => direct(Milestone::EnoughCommitted),
            MessageKind::GracePeriodStart => direct(Milestone::GracePeriodStart),
            MessageKind::InsertedNewBlock => direct(Milestone::InsertedNewBlock),
            MessageKind::SentCommitted => direct(Milestone::SentCommitted),
            MessageKind::AllCommitted => direct(Milestone::AllCommitted),
            MessageKind::GracePeriodEnd => direct(Milestone::GracePeriodEnd),
            MessageKind::ConsensusReached => direct(Milestone::ConsensusReached),
            MessageKind::PendingCrosslinks => direct(Milestone::CrosslinkProposal),
        }
    }

    // Votes stream in continuously, so a prepare vote only counts after the
    // announce went out and a commit vote only after the prepared message.
    fn classify_vote(&self, event: &LogEvent) -> Vec<Observation> {
        match event.phase() {
            Some(Phase::Prepare) => vec![Observation::gated(Milestone::FirstPrepare, Milestone::SentAnnounce)],
            Some(Phase::Commit) => {
                let mut observations = vec![Observation::gated(Milestone::FirstCommit, Milestone::SentPrepare)];
                if self.crosses_commit_threshold(event) {
                    observations.push(Observation::gated(
                        Milestone::NinetyFivePercentCommitted,
                        Milestone::SentPrepare,
                    ));
                }
                observations
            }
            None => Vec::new(),
        }
    }

    fn crosses_commit_threshold(&self, event: &LogEvent) -> bool {
        match event.fraction(&self.signer_power_field) {
            Ok(Some(fraction)) => fraction > self.commit_power_threshold,
            Ok(None) => false,
            Err(err) => {
                warn!("Ignoring signer power on commit vote: {}", err);
                false
            }
        }
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        EventClassifier::new(&TimelineConfig::default())
    }
}
