// TIMELINE: MILESTONE LEDGER
// Ordered per-block milestone records for one analysis run.
//
// INVARIANTS:
// 1. Records are only appended, never inserted out of order or removed
// 2. A milestone keeps its first-observed timestamp (first write wins)
// 3. Terminal milestones may be overwritten: the protocol re-emits them on re-proposal
// 4. `current` always points at the oldest record that is not finalized

use crate::milestone::Milestone;
use crate::resolver::ResolveError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Milestones observed for one block position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockRecord {
    milestones: BTreeMap<Milestone, DateTime<Utc>>,
    finalized: bool,
}

impl BlockRecord {
    pub fn get(&self, milestone: Milestone) -> Option<DateTime<Utc>> {
        self.milestones.get(&milestone).copied()
    }

    pub fn contains(&self, milestone: Milestone) -> bool {
        self.milestones.contains_key(&milestone)
    }

    pub fn len(&self) -> usize {
        self.milestones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.milestones.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Milestone, DateTime<Utc>)> + '_ {
        self.milestones.iter().map(|(m, t)| (*m, *t))
    }

    /// Both terminal milestones are present.
    pub fn has_terminals(&self) -> bool {
        self.contains(Milestone::GracePeriodEnd) && self.contains(Milestone::ConsensusReached)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    Overwritten,
    /// Milestone already present; first write wins.
    Ignored,
}

#[derive(Debug, Default)]
pub struct MilestoneLedger {
    blocks: Vec<BlockRecord>,
    current: usize,
}

impl MilestoneLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an empty record and return its position.
    pub fn open_block(&mut self) -> usize {
        self.blocks.push(BlockRecord::default());
        self.blocks.len() - 1
    }

    pub fn record(
        &mut self,
        position: usize,
        milestone: Milestone,
        timestamp: DateTime<Utc>,
    ) -> Result<RecordOutcome, ResolveError> {
        let open = self.blocks.len();
        let block = self
            .blocks
            .get_mut(position)
            .ok_or(ResolveError::OutOfRange { position: position as i128, open })?;

        match block.milestones.get(&milestone) {
            None => {
                block.milestones.insert(milestone, timestamp);
                Ok(RecordOutcome::Inserted)
            }
            Some(_) if milestone.is_terminal() => {
                block.milestones.insert(milestone, timestamp);
                Ok(RecordOutcome::Overwritten)
            }
            Some(_) => Ok(RecordOutcome::Ignored),
        }
    }

    pub fn get(&self, position: usize) -> Option<&BlockRecord> {
        self.blocks.get(position)
    }

    /// Oldest record that has not been finalized.
    pub fn current(&self) -> Option<usize> {
        (self.current < self.blocks.len()).then_some(self.current)
    }

    /// Most recently opened record.
    pub fn furthest(&self) -> Option<usize> {
        self.blocks.len().checked_sub(1)
    }

    /// Close a record and move the cursor past every finalized record.
    pub fn mark_finalized(&mut self, position: usize) {
        if let Some(block) = self.blocks.get_mut(position) {
            block.finalized = true;
        }
        while self.blocks.get(self.current).map_or(false, BlockRecord::is_finalized) {
            self.current += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Records never finalized, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = (usize, &BlockRecord)> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| !block.finalized)
    }
}
