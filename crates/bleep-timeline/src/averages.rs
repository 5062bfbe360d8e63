use crate::milestone::Milestone;
use crate::report::{format_nanos, BlockReport};
use serde::Serialize;
use std::fmt;

/// Incrementally updated mean of one milestone pair's interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningAverage {
    count: u64,
    mean_ns: f64,
}

impl RunningAverage {
    fn new() -> Self {
        RunningAverage { count: 0, mean_ns: 0.0 }
    }

    fn update(&mut self, sample_ns: i64) {
        self.count += 1;
        self.mean_ns += (sample_ns as f64 - self.mean_ns) / self.count as f64;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean_ns(&self) -> i64 {
        self.mean_ns.round() as i64
    }
}

/// Running means keyed by ordered milestone pair, in first-observed order.
#[derive(Debug, Clone, Default)]
pub struct RunningAverages {
    pairs: Vec<((Milestone, Milestone), RunningAverage)>,
}

impl RunningAverages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, from: Milestone, to: Milestone, sample_ns: i64) {
        let key = (from, to);
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, average)) => average.update(sample_ns),
            None => {
                let mut average = RunningAverage::new();
                average.update(sample_ns);
                self.pairs.push((key, average));
            }
        }
    }

    /// Fold every interval of a finalized block.
    pub fn fold(&mut self, report: &BlockReport) {
        for (from, to, elapsed_ns) in report.intervals() {
            self.record(from, to, elapsed_ns);
        }
    }

    pub fn get(&self, from: Milestone, to: Milestone) -> Option<&RunningAverage> {
        self.pairs
            .iter()
            .find(|(k, _)| *k == (from, to))
            .map(|(_, average)| average)
    }

    pub fn reports(&self) -> Vec<AverageReport> {
        self.pairs
            .iter()
            .map(|((from, to), average)| AverageReport {
                from: *from,
                to: *to,
                samples: average.count(),
                mean_ns: average.mean_ns(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AverageReport {
    pub from: Milestone,
    pub to: Milestone,
    pub samples: u64,
    pub mean_ns: i64,
}

impl fmt::Display for AverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Average Time between {} and {} was {}",
            self.from,
            self.to,
            format_nanos(self.mean_ns)
        )
    }
}
