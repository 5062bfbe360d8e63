// TIMELINE: ENGINE
// Owns every piece of per-run state and turns a stream of log events into
// finalized block reports.
//
// STATE MACHINE (per block position):
//   OPEN -> one terminal present -> both terminals present -> FINALIZED
//
// INVARIANTS:
// 1. Events are processed strictly in arrival order
// 2. A proposing event always appends a new block record
// 3. A block is reported exactly once, when its second terminal milestone lands
// 4. No per-event failure aborts the run

use crate::averages::{AverageReport, RunningAverages};
use crate::classifier::{EventClassifier, Observation};
use crate::config::{ConfigError, TimelineConfig};
use crate::error::TimelineError;
use crate::event::LogEvent;
use crate::ledger::{MilestoneLedger, RecordOutcome};
use crate::milestone::Milestone;
use crate::policy::MetricPolicy;
use crate::report::BlockReport;
use crate::resolver::{target_rule, BlockIndexResolver};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;

/// Counters describing one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub events: u64,
    pub unrecognized: u64,
    pub recorded: u64,
    pub duplicates: u64,
    pub gated: u64,
    pub failed: u64,
    pub finalized: u64,
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "events={} unrecognized={} recorded={} duplicates={} gated={} failed={} finalized={}",
            self.events,
            self.unrecognized,
            self.recorded,
            self.duplicates,
            self.gated,
            self.failed,
            self.finalized
        )
    }
}

/// A block still open at end of stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingBlock {
    pub block: usize,
    pub height: Option<u64>,
    pub milestones: usize,
    pub missing_terminals: Vec<Milestone>,
}

impl fmt::Display for PendingBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block {} never finalized ({} milestones", self.block, self.milestones)?;
        if !self.missing_terminals.is_empty() {
            let names: Vec<&str> = self.missing_terminals.iter().map(Milestone::as_str).collect();
            write!(f, ", missing {}", names.join(", "))?;
        }
        f.write_str(")")
    }
}

pub struct TimelineEngine {
    classifier: EventClassifier,
    resolver: BlockIndexResolver,
    ledger: MilestoneLedger,
    policy: MetricPolicy,
    averages: Option<RunningAverages>,
    stats: EngineStats,
}

impl TimelineEngine {
    pub fn new(config: TimelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = config.metric_policy()?;
        info!(
            "Timeline engine using {} metric policy ({} milestones), averages {}",
            policy.version(),
            policy.len(),
            if config.averages { "on" } else { "off" }
        );

        Ok(TimelineEngine {
            classifier: EventClassifier::new(&config),
            resolver: BlockIndexResolver::new(),
            ledger: MilestoneLedger::new(),
            policy,
            averages: config.averages.then(RunningAverages::new),
            stats: EngineStats::default(),
        })
    }

    /// Consume one event. Returns the report of the block this event
    /// finalized, if any.
    pub fn process(&mut self, event: &LogEvent) -> Result<Option<BlockReport>, TimelineError> {
        self.stats.events += 1;

        let observations = self.classifier.classify(event);
        if observations.is_empty() {
            self.stats.unrecognized += 1;
            return Ok(None);
        }

        let mut finalized = None;
        let mut first_error = None;
        for observation in observations {
            match self.apply(observation, event) {
                Ok(Some(report)) => finalized = Some(report),
                Ok(None) => {}
                Err(err) => {
                    self.stats.failed += 1;
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(finalized),
        }
    }

    fn apply(&mut self, observation: Observation, event: &LogEvent) -> Result<Option<BlockReport>, TimelineError> {
        let milestone = observation.milestone;
        let position = if milestone == Milestone::Proposing {
            self.open_block(event)
        } else {
            self.resolver
                .resolve(milestone, event, &self.ledger)
                .map_err(|source| TimelineError::Unresolved {
                    milestone,
                    message: event.message().to_string(),
                    source,
                })?
        };

        if let Some(prerequisite) = observation.prerequisite {
            let reached = self
                .ledger
                .get(position)
                .map_or(false, |block| block.contains(prerequisite));
            if !reached {
                debug!(
                    "Ignoring {} for block {}: {} not recorded yet",
                    milestone,
                    position + 1,
                    prerequisite
                );
                self.stats.gated += 1;
                return Ok(None);
            }
        }

        let timestamp = event
            .timestamp()
            .map_err(|source| TimelineError::Timestamp { milestone, source })?;

        let outcome = self
            .ledger
            .record(position, milestone, timestamp)
            .map_err(|source| TimelineError::Unresolved {
                milestone,
                message: event.message().to_string(),
                source,
            })?;

        match outcome {
            RecordOutcome::Inserted => self.stats.recorded += 1,
            RecordOutcome::Overwritten => {
                debug!("{} re-emitted for block {}, keeping latest", milestone, position + 1);
                self.stats.recorded += 1;
            }
            RecordOutcome::Ignored => {
                self.stats.duplicates += 1;
                return Ok(None);
            }
        }

        if milestone.is_terminal() {
            return Ok(self.try_finalize(position));
        }
        Ok(None)
    }

    fn open_block(&mut self, event: &LogEvent) -> usize {
        let field = target_rule(Milestone::Proposing).height_field;
        let position = self.ledger.open_block();

        // An unreadable height must not pin the offset; a later proposing
        // event with a usable height latches it instead.
        let height = match field.map(|f| event.height(f)) {
            Some(Ok(height)) => {
                self.resolver.latch(height, position);
                height
            }
            Some(Err(err)) => {
                warn!("Proposing event for block {} has an unusable height: {}", position + 1, err);
                None
            }
            None => {
                self.resolver.latch(None, position);
                None
            }
        };

        if let (Some(height), Some(expected)) = (height, self.resolver.expected_height(position)) {
            if height != expected {
                warn!(
                    "Proposing height {} does not match expected height {} for block {}; later events may resolve to the wrong block",
                    height,
                    expected,
                    position + 1
                );
            }
        }
        debug!("Opened block {} at position {}", position + 1, position);
        position
    }

    fn try_finalize(&mut self, position: usize) -> Option<BlockReport> {
        let record = self.ledger.get(position)?;
        if record.is_finalized() || !record.has_terminals() {
            return None;
        }

        let height = self.resolver.expected_height(position);
        let report = BlockReport::from_record(position, height, record, &self.policy);
        self.ledger.mark_finalized(position);
        self.stats.finalized += 1;

        if report.has_anomalies() {
            warn!("Block {} has negative intervals; check clock skew or block resolution", report.block);
        }
        if let Some(averages) = self.averages.as_mut() {
            averages.fold(&report);
        }
        info!("Block {} finalized with {} report lines", report.block, report.entries.len());
        Some(report)
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn policy(&self) -> &MetricPolicy {
        &self.policy
    }

    pub fn ledger(&self) -> &MilestoneLedger {
        &self.ledger
    }

    pub fn block_offset(&self) -> Option<u64> {
        self.resolver.offset()
    }

    pub fn averages(&self) -> Option<&RunningAverages> {
        self.averages.as_ref()
    }

    /// End-of-run averages; empty when averaging is disabled.
    pub fn average_reports(&self) -> Vec<AverageReport> {
        self.averages()
            .map(RunningAverages::reports)
            .unwrap_or_default()
    }

    /// Blocks opened but never finalized.
    pub fn pending_blocks(&self) -> Vec<PendingBlock> {
        self.ledger
            .pending()
            .map(|(position, record)| PendingBlock {
                block: position + 1,
                height: self.resolver.expected_height(position),
                milestones: record.len(),
                missing_terminals: [Milestone::GracePeriodEnd, Milestone::ConsensusReached]
                    .into_iter()
                    .filter(|m| !record.contains(*m))
                    .collect(),
            })
            .collect()
    }
}

impl Default for TimelineEngine {
    fn default() -> Self {
        TimelineEngine {
            classifier: EventClassifier::default(),
            resolver: BlockIndexResolver::new(),
            ledger: MilestoneLedger::new(),
            policy: MetricPolicy::default(),
            averages: None,
            stats: EngineStats::default(),
        }
    }
}
