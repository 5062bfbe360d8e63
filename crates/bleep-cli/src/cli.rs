use crate::output::OutputFormat;
use bleep_timeline::PolicyVersion;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "bleep-log-analysis")]
#[command(about = "Rebuild per-block consensus timelines from structured node logs", long_about = None)]
pub struct Cli {
    /// Consensus log file, one JSON event per line
    pub input: PathBuf,

    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Metric ordering policy: baseline, crosslink-first, extended or custom
    #[arg(long, value_parser = parse_policy)]
    pub policy: Option<PolicyVersion>,

    /// Print running averages once the whole log is consumed
    #[arg(long)]
    pub averages: bool,

    /// Report output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Echo every decoded message before it is analyzed
    #[arg(long)]
    pub echo: bool,
}

fn parse_policy(value: &str) -> Result<PolicyVersion, bleep_timeline::PolicyError> {
    value.parse()
}
