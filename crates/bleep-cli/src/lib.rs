//! Command-line front end for consensus log analysis.
//!
//! Reads a log file line by line, feeds each decoded event to the timeline
//! engine and streams finalized block reports to a background writer.

pub mod cli;
pub mod input;
pub mod output;
pub mod settings;

pub use cli::Cli;
pub use output::{OutputFormat, ReportOutput};

use anyhow::{anyhow, Context, Result};
use bleep_timeline::{EngineStats, PendingBlock, TimelineEngine};
use input::LineDecoder;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub format: OutputFormat,
    pub echo: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            format: OutputFormat::Text,
            echo: false,
        }
    }
}

/// What one run consumed and left behind.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub lines: u64,
    pub malformed: u64,
    pub stats: EngineStats,
    pub pending: Vec<PendingBlock>,
}

/// Analyze the file named on the command line, writing reports to stdout.
pub async fn run(cli: Cli) -> Result<RunSummary> {
    let settings = settings::load(&cli)?;
    let mut engine = TimelineEngine::new(settings)?;

    let file = File::open(&cli.input)
        .await
        .with_context(|| format!("Consensus log analysis error: cannot open {}", cli.input.display()))?;
    info!("Analyzing {}", cli.input.display());

    let options = AnalysisOptions {
        format: cli.format,
        echo: cli.echo,
    };
    let (summary, _) = analyze(BufReader::new(file), tokio::io::stdout(), &mut engine, options).await?;
    Ok(summary)
}

/// Drive `engine` over every line of `reader`, streaming output to `writer`.
/// Returns the run summary and the writer once everything is flushed.
pub async fn analyze<R, W>(
    reader: R,
    writer: W,
    engine: &mut TimelineEngine,
    options: AnalysisOptions,
) -> Result<(RunSummary, W)>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, handle) = output::spawn_writer(writer, options.format);
    let mut decoder = LineDecoder::new();

    let fed = feed(reader, &tx, engine, &mut decoder, options.echo).await;
    let averages = engine.average_reports();
    let closed = if fed.is_ok() && !averages.is_empty() {
        tx.send(ReportOutput::Averages(averages)).await.is_err()
    } else {
        false
    };
    drop(tx);

    let writer = handle
        .await
        .context("Report writer task panicked")?
        .context("Failed to write report")?;
    fed?;
    if closed {
        return Err(anyhow!("Report writer stopped early"));
    }

    let pending = engine.pending_blocks();
    for block in &pending {
        warn!("{}", block);
    }

    let summary = RunSummary {
        lines: decoder.lines(),
        malformed: decoder.malformed(),
        stats: engine.stats(),
        pending,
    };
    info!(
        lines = summary.lines,
        malformed = summary.malformed,
        "Analysis complete: {}",
        summary.stats
    );
    Ok((summary, writer))
}

async fn feed<R>(
    reader: R,
    tx: &mpsc::Sender<ReportOutput>,
    engine: &mut TimelineEngine,
    decoder: &mut LineDecoder,
    echo: bool,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read log input")? {
        let Some(event) = decoder.decode(&line) else {
            continue;
        };

        if echo {
            send(tx, ReportOutput::Echo(event.message().to_string())).await?;
        }

        match engine.process(&event) {
            Ok(Some(report)) => send(tx, ReportOutput::Block(report)).await?,
            Ok(None) => {}
            Err(err) => warn!(line = decoder.lines(), "{}", err),
        }
    }
    Ok(())
}

async fn send(tx: &mpsc::Sender<ReportOutput>, output: ReportOutput) -> Result<()> {
    tx.send(output)
        .await
        .map_err(|_| anyhow!("Report writer stopped early"))
}
