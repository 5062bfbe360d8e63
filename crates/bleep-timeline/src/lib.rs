//! Consensus log timeline reconstruction.
//!
//! Feeds structured consensus log events through [`TimelineEngine`], which
//! rebuilds a per-block milestone timeline and reports the elapsed time
//! between consecutive milestones once a block is finalized.

pub mod averages;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod ledger;
pub mod milestone;
pub mod policy;
pub mod report;
pub mod resolver;

pub use averages::{AverageReport, RunningAverages};
pub use classifier::{EventClassifier, MessageKind, Observation};
pub use config::{ConfigError, TimelineConfig};
pub use engine::{EngineStats, PendingBlock, TimelineEngine};
pub use error::TimelineError;
pub use event::{EventError, LogEvent, Phase};
pub use ledger::{BlockRecord, MilestoneLedger, RecordOutcome};
pub use milestone::Milestone;
pub use policy::{MetricPolicy, PolicyError, PolicyVersion};
pub use report::{format_duration, BlockReport, ReportEntry};
pub use resolver::{BlockIndexResolver, ResolveError};
