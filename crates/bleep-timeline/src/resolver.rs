// TIMELINE: BLOCK INDEX RESOLVER
// Decides which ledger position an observation belongs to.
//
// POLICY:
// 1. position = height - offset, where offset comes from the first proposing
//    event with a usable height, less that block's position (1 when the event
//    carries no height, which degenerates to direct 1-indexed heights)
// 2. Events without a height target the current block (oldest still open)
// 3. Crosslink proposals target the current block, or the furthest block once
//    the current one already holds a crosslink proposal
// 4. Out-of-range positions are errors, never clamped

use crate::event::LogEvent;
use crate::ledger::MilestoneLedger;
use crate::milestone::Milestone;
use log::{debug, info, warn};
use thiserror::Error;

/// Offset used when the first proposing event carries no height.
pub const DIRECT_INDEX_OFFSET: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("No block has been opened yet")]
    NoOpenBlocks,

    #[error("Every opened block is already finalized")]
    NoCurrentBlock,

    #[error("Height {height} seen before any proposing event latched the block offset")]
    OffsetNotLatched { height: u64 },

    #[error("Block position {position} is out of range ({open} blocks opened)")]
    OutOfRange { position: i128, open: usize },

    #[error("Unparseable block height: {0}")]
    InvalidHeight(String),
}

/// Implicit target used when an event names no height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Current,
    CurrentThenFurthest,
}

/// How to place one milestone kind on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetRule {
    pub height_field: Option<&'static str>,
    pub fallback: Fallback,
}

impl TargetRule {
    const fn explicit(field: &'static str) -> Self {
        TargetRule {
            height_field: Some(field),
            fallback: Fallback::Current,
        }
    }

    const fn implicit(fallback: Fallback) -> Self {
        TargetRule {
            height_field: None,
            fallback,
        }
    }
}

/// Height field per milestone kind; subsystems disagree on the name.
pub fn target_rule(milestone: Milestone) -> TargetRule {
    match milestone {
        Milestone::Proposing => TargetRule::explicit("blockNum"),
        Milestone::VrfGenerated => TargetRule::explicit("BlockNum"),
        Milestone::NewBlockProposal => TargetRule::explicit("blockNum"),
        Milestone::StartingConsensus => TargetRule::explicit("myBlock"),
        Milestone::SentAnnounce => TargetRule::explicit("myBlock"),
        Milestone::SentPrepare => TargetRule::explicit("blockNum"),
        Milestone::EnoughCommitted => TargetRule::explicit("MsgBlockNum"),
        Milestone::GracePeriodStart => TargetRule::explicit("myBlock"),
        Milestone::AllCommitted => TargetRule::explicit("MsgBlockNum"),
        Milestone::GracePeriodEnd => TargetRule::explicit("MsgBlockNum"),
        Milestone::SentCommitted => TargetRule::explicit("blockNum"),
        Milestone::InsertedNewBlock => TargetRule::explicit("number"),
        Milestone::ConsensusReached => TargetRule::explicit("blockNum"),
        Milestone::CrosslinkProposal => TargetRule::implicit(Fallback::CurrentThenFurthest),
        Milestone::ReceivedCommitSig
        | Milestone::CommitSigReady
        | Milestone::FirstPrepare
        | Milestone::EnoughPrepared
        | Milestone::FirstCommit
        | Milestone::NinetyFivePercentCommitted => TargetRule::implicit(Fallback::Current),
    }
}

#[derive(Debug, Default, Clone)]
pub struct BlockIndexResolver {
    offset: Option<u64>,
}

impl BlockIndexResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Latch the offset from a proposing event opened at `position`.
    /// Later calls are no-ops once an offset is set.
    pub fn latch(&mut self, height: Option<u64>, position: usize) {
        if self.offset.is_some() {
            return;
        }
        let offset = match height {
            Some(height) => match height.checked_sub(position as u64) {
                Some(offset) => offset,
                None => {
                    warn!("Proposing height {} is below block position {}, offset left unlatched", height, position);
                    return;
                }
            },
            None => DIRECT_INDEX_OFFSET,
        };
        info!("Block offset latched at height {}", offset);
        self.offset = Some(offset);
    }

    /// Height the block at `position` is expected to carry. `None` when no
    /// offset is latched or the height would not fit in a `u64`.
    pub fn expected_height(&self, position: usize) -> Option<u64> {
        self.offset.and_then(|offset| offset.checked_add(position as u64))
    }

    /// Translate a protocol height into a ledger position.
    pub fn position_for(&self, height: u64, open: usize) -> Result<usize, ResolveError> {
        let offset = self.offset.ok_or(ResolveError::OffsetNotLatched { height })?;
        let position = height as i128 - offset as i128;
        if position < 0 || position >= open as i128 {
            return Err(ResolveError::OutOfRange { position, open });
        }
        Ok(position as usize)
    }

    /// Resolve the ledger position `milestone` from `event` should be recorded at.
    pub fn resolve(
        &self,
        milestone: Milestone,
        event: &LogEvent,
        ledger: &MilestoneLedger,
    ) -> Result<usize, ResolveError> {
        let rule = target_rule(milestone);

        if let Some(field) = rule.height_field {
            let height = event
                .height(field)
                .map_err(|err| ResolveError::InvalidHeight(err.to_string()))?;
            if let Some(height) = height {
                return self.position_for(height, ledger.len());
            }
            debug!("{} event carries no `{}`, using implicit target", milestone, field);
        }

        let current = ledger.current().ok_or(if ledger.is_empty() {
            ResolveError::NoOpenBlocks
        } else {
            ResolveError::NoCurrentBlock
        })?;

        match rule.fallback {
            Fallback::Current => Ok(current),
            Fallback::CurrentThenFurthest => {
                let taken = ledger
                    .get(current)
                    .map_or(false, |block| block.contains(milestone));
                match ledger.furthest() {
                    Some(furthest) if taken => Ok(furthest),
                    _ => Ok(current),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const T: &str = "2021-03-01T10:00:00Z";

    fn ledger_with(blocks: usize) -> MilestoneLedger {
        let mut ledger = MilestoneLedger::new();
        for _ in 0..blocks {
            ledger.open_block();
        }
        ledger
    }

    #[test]
    fn test_offset_translation() {
        let mut resolver = BlockIndexResolver::new();
        resolver.latch(Some(1000), 0);
        let ledger = ledger_with(6);
        let event = LogEvent::new("x", T).with_field("myBlock", 1005);
        assert_eq!(resolver.resolve(Milestone::SentAnnounce, &event, &ledger), Ok(5));
    }

    #[test]
    fn test_latch_only_once() {
        let mut resolver = BlockIndexResolver::new();
        resolver.latch(Some(40), 0);
        resolver.latch(Some(90), 0);
        assert_eq!(resolver.offset(), Some(40));
        assert_eq!(resolver.expected_height(2), Some(42));
    }

    #[test]
    fn test_late_latch_subtracts_position() {
        let mut resolver = BlockIndexResolver::new();
        resolver.latch(Some(1001), 1);
        assert_eq!(resolver.offset(), Some(1000));
        assert_eq!(resolver.position_for(1001, 2), Ok(1));

        let mut low = BlockIndexResolver::new();
        low.latch(Some(2), 5);
        assert_eq!(low.offset(), None);
    }

    #[test]
    fn test_expected_height_saturates_to_none() {
        let mut resolver = BlockIndexResolver::new();
        resolver.latch(Some(u64::MAX), 0);
        assert_eq!(resolver.expected_height(0), Some(u64::MAX));
        assert_eq!(resolver.expected_height(1), None);
    }

    #[test]
    fn test_missing_height_latches_direct_indexing() {
        let mut resolver = BlockIndexResolver::new();
        resolver.latch(None, 0);
        assert_eq!(resolver.position_for(1, 1), Ok(0));
    }

    #[test]
    fn test_rejects_out_of_range() {
        let mut resolver = BlockIndexResolver::new();
        resolver.latch(Some(100), 0);
        assert_eq!(
            resolver.position_for(99, 3),
            Err(ResolveError::OutOfRange { position: -1, open: 3 })
        );
        assert_eq!(
            resolver.position_for(103, 3),
            Err(ResolveError::OutOfRange { position: 3, open: 3 })
        );
    }

    #[test]
    fn test_height_before_latch() {
        let resolver = BlockIndexResolver::new();
        assert_eq!(
            resolver.position_for(7, 0),
            Err(ResolveError::OffsetNotLatched { height: 7 })
        );
    }

    #[test]
    fn test_implicit_targets_current() {
        let mut resolver = BlockIndexResolver::new();
        resolver.latch(Some(1), 0);
        let mut ledger = ledger_with(3);
        ledger.mark_finalized(0);
        let event = LogEvent::new("x", T);
        assert_eq!(resolver.resolve(Milestone::CommitSigReady, &event, &ledger), Ok(1));
    }

    #[test]
    fn test_explicit_kind_without_height_falls_back() {
        let mut resolver = BlockIndexResolver::new();
        resolver.latch(Some(1), 0);
        let ledger = ledger_with(2);
        let event = LogEvent::new("x", T);
        assert_eq!(resolver.resolve(Milestone::SentPrepare, &event, &ledger), Ok(0));
    }

    #[test]
    fn test_invalid_height_is_an_error() {
        let mut resolver = BlockIndexResolver::new();
        resolver.latch(Some(1), 0);
        let ledger = ledger_with(1);
        let event = LogEvent::new("x", T).with_field("blockNum", "abc");
        assert!(matches!(
            resolver.resolve(Milestone::SentPrepare, &event, &ledger),
            Err(ResolveError::InvalidHeight(_))
        ));
    }

    #[test]
    fn test_crosslink_moves_to_furthest_once_current_taken() {
        let mut resolver = BlockIndexResolver::new();
        resolver.latch(Some(1), 0);
        let mut ledger = ledger_with(2);
        let event = LogEvent::new("2 pending crosslinks", T);
        assert_eq!(resolver.resolve(Milestone::CrosslinkProposal, &event, &ledger), Ok(0));
        ledger.record(0, Milestone::CrosslinkProposal, Utc::now()).unwrap();
        assert_eq!(resolver.resolve(Milestone::CrosslinkProposal, &event, &ledger), Ok(1));
    }

    #[test]
    fn test_no_blocks() {
        let resolver = BlockIndexResolver::new();
        let ledger = MilestoneLedger::new();
        let event = LogEvent::new("x", T);
        assert_eq!(
            resolver.resolve(Milestone::CommitSigReady, &event, &ledger),
            Err(ResolveError::NoOpenBlocks)
        );
    }

    #[test]
    fn test_every_block_finalized() {
        let mut resolver = BlockIndexResolver::new();
        resolver.latch(Some(1), 0);
        let mut ledger = ledger_with(1);
        ledger.mark_finalized(0);
        let event = LogEvent::new("x", T);
        assert_eq!(
            resolver.resolve(Milestone::EnoughPrepared, &event, &ledger),
            Err(ResolveError::NoCurrentBlock)
        );
    }
}
