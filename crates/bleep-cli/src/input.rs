use bleep_timeline::LogEvent;
use tracing::warn;

/// Decodes input lines into events, counting what it had to skip.
#[derive(Debug, Default)]
pub struct LineDecoder {
    lines: u64,
    malformed: u64,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one raw line. Blank lines are skipped silently, malformed ones
    /// are logged and skipped.
    pub fn decode(&mut self, line: &str) -> Option<LogEvent> {
        self.lines += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        match LogEvent::from_json_line(trimmed) {
            Ok(event) => Some(event),
            Err(err) => {
                self.malformed += 1;
                warn!(line = self.lines, "Skipping log line: {}", err);
                None
            }
        }
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}
