// Report writer: a background task that owns the output stream.
//
// The analysis loop hands it finalized snapshots over a channel and keeps
// going; the writer never touches engine state.

use bleep_timeline::{AverageReport, BlockReport};
use clap::ValueEnum;
use serde::Serialize;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const REPORT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable report lines
    Text,
    /// One JSON document per line
    Json,
}

#[derive(Debug, Clone)]
pub enum ReportOutput {
    Echo(String),
    Block(BlockReport),
    Averages(Vec<AverageReport>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum JsonRecord<'a> {
    Echo { message: &'a str },
    Block(&'a BlockReport),
    Average(&'a AverageReport),
}

pub fn render(output: &ReportOutput, format: OutputFormat) -> io::Result<Vec<String>> {
    let lines = match (format, output) {
        (OutputFormat::Text, ReportOutput::Echo(message)) => vec![message.clone()],
        (OutputFormat::Text, ReportOutput::Block(report)) => report.lines(),
        (OutputFormat::Text, ReportOutput::Averages(averages)) => {
            averages.iter().map(ToString::to_string).collect()
        }
        (OutputFormat::Json, ReportOutput::Echo(message)) => {
            vec![serde_json::to_string(&JsonRecord::Echo { message })?]
        }
        (OutputFormat::Json, ReportOutput::Block(report)) => {
            vec![serde_json::to_string(&JsonRecord::Block(report))?]
        }
        (OutputFormat::Json, ReportOutput::Averages(averages)) => averages
            .iter()
            .map(|average| serde_json::to_string(&JsonRecord::Average(average)))
            .collect::<Result<Vec<_>, serde_json::Error>>()?,
    };
    Ok(lines)
}

/// Spawn the writer task. It drains the channel until every sender is
/// dropped, flushes and hands the writer back.
pub fn spawn_writer<W>(mut writer: W, format: OutputFormat) -> (mpsc::Sender<ReportOutput>, JoinHandle<io::Result<W>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<ReportOutput>(REPORT_CHANNEL_CAPACITY);

    let handle = tokio::spawn(async move {
        while let Some(output) = rx.recv().await {
            for line in render(&output, format)? {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
        }
        writer.flush().await?;
        Ok::<W, io::Error>(writer)
    });

    (tx, handle)
}
