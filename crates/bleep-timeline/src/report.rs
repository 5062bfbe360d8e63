// TIMELINE: BLOCK REPORTS
// Interval and missing-metric lines produced when a block is finalized.

use crate::ledger::BlockRecord;
use crate::milestone::Milestone;
use crate::policy::MetricPolicy;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SECOND: u128 = 1_000_000_000;
const NANOS_PER_MINUTE: u128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MINUTE;

/// Render a duration the way consensus operators read them: `1s`, `1.5s`,
/// `250ms`, `1m30s`, `-2s`.
pub fn format_duration(duration: Duration) -> String {
    format_nanos(duration_nanos(duration))
}

pub fn format_nanos(nanos: i64) -> String {
    if nanos == 0 {
        return "0s".to_string();
    }

    let sign = if nanos < 0 { "-" } else { "" };
    let u = nanos.unsigned_abs() as u128;

    let body = if u < NANOS_PER_MICRO {
        format!("{}ns", u)
    } else if u < NANOS_PER_MILLI {
        format!("{}µs", with_fraction(u / NANOS_PER_MICRO, u % NANOS_PER_MICRO, 3))
    } else if u < NANOS_PER_SECOND {
        format!("{}ms", with_fraction(u / NANOS_PER_MILLI, u % NANOS_PER_MILLI, 6))
    } else {
        let hours = u / NANOS_PER_HOUR;
        let minutes = (u % NANOS_PER_HOUR) / NANOS_PER_MINUTE;
        let rem = u % NANOS_PER_MINUTE;
        let seconds = with_fraction(rem / NANOS_PER_SECOND, rem % NANOS_PER_SECOND, 9);
        if hours > 0 {
            format!("{}h{}m{}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m{}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    };

    format!("{}{}", sign, body)
}

fn with_fraction(whole: u128, fraction: u128, digits: usize) -> String {
    if fraction == 0 {
        return whole.to_string();
    }
    let padded = format!("{:0width$}", fraction, width = digits);
    format!("{}.{}", whole, padded.trim_end_matches('0'))
}

pub(crate) fn duration_nanos(duration: Duration) -> i64 {
    duration.num_nanoseconds().unwrap_or(if duration < Duration::zero() {
        i64::MIN
    } else {
        i64::MAX
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ReportEntry {
    Interval {
        from: Milestone,
        to: Milestone,
        elapsed_ns: i64,
        /// The later milestone was stamped before the earlier one.
        anomalous: bool,
    },
    Missing {
        milestone: Milestone,
    },
}

impl ReportEntry {
    fn interval(from: Milestone, to: Milestone, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let elapsed_ns = duration_nanos(end.signed_duration_since(start));
        ReportEntry::Interval {
            from,
            to,
            elapsed_ns,
            anomalous: elapsed_ns < 0,
        }
    }

    pub fn is_anomalous(&self) -> bool {
        matches!(self, ReportEntry::Interval { anomalous: true, .. })
    }
}

/// Everything reported for one finalized block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockReport {
    /// 1-indexed block number, as shown to operators.
    pub block: usize,
    /// Protocol height, when the block offset is known.
    pub height: Option<u64>,
    pub entries: Vec<ReportEntry>,
}

impl BlockReport {
    /// Walk the policy sequence once: every absent milestone is reported as
    /// missing, every adjacent pair with both ends present as an interval.
    pub fn from_record(position: usize, height: Option<u64>, record: &BlockRecord, policy: &MetricPolicy) -> Self {
        let mut entries = Vec::with_capacity(policy.len());
        let mut pairs = policy.pairs();

        // The i-th pair starts at the i-th milestone; the last one has none.
        for &milestone in policy.sequence() {
            let pair = pairs.next();
            let Some(start) = record.get(milestone) else {
                entries.push(ReportEntry::Missing { milestone });
                continue;
            };
            if let Some((_, next)) = pair {
                if let Some(end) = record.get(next) {
                    entries.push(ReportEntry::interval(milestone, next, start, end));
                }
            }
        }

        BlockReport {
            block: position + 1,
            height,
            entries,
        }
    }

    pub fn intervals(&self) -> impl Iterator<Item = (Milestone, Milestone, i64)> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            ReportEntry::Interval { from, to, elapsed_ns, .. } => Some((*from, *to, *elapsed_ns)),
            ReportEntry::Missing { .. } => None,
        })
    }

    pub fn missing(&self) -> impl Iterator<Item = Milestone> + '_ {
        self.entries.iter().filter_map(|entry| match entry {
            ReportEntry::Missing { milestone } => Some(*milestone),
            ReportEntry::Interval { .. } => None,
        })
    }

    pub fn has_anomalies(&self) -> bool {
        self.entries.iter().any(ReportEntry::is_anomalous)
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(|entry| self.line(entry)).collect()
    }

    fn line(&self, entry: &ReportEntry) -> String {
        match entry {
            ReportEntry::Interval { from, to, elapsed_ns, anomalous } => {
                let mut line = format!(
                    "Time between {} and {} for block {} was {}",
                    from,
                    to,
                    self.block,
                    format_nanos(*elapsed_ns)
                );
                if *anomalous {
                    line.push_str(" (negative interval)");
                }
                line
            }
            ReportEntry::Missing { milestone } => {
                format!("There is no metric {} for block {}", milestone, self.block)
            }
        }
    }
}

impl fmt::Display for BlockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}
