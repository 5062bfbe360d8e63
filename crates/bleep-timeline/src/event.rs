// TIMELINE: LOG EVENT MODEL
// One decoded structured log line emitted by a consensus node.
//
// The protocol fields are ad hoc: the same block height shows up as
// "blockNum", "myBlock", "MsgBlockNum", "number" or "BlockNum" depending on
// which subsystem logged it, and as a number or a decimal string. Accessors
// here tolerate all of those encodings.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

pub const MESSAGE_FIELD: &str = "message";
pub const TIME_FIELD: &str = "time";
pub const PHASE_FIELD: &str = "phase";

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Malformed log line: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Log line is not a JSON object")]
    NotAnObject,

    #[error("Log line has no string `message` field")]
    MissingMessage,

    #[error("Event `{message}` has no `time` field")]
    MissingTime { message: String },

    #[error("Event `{message}` has unparseable time `{raw}`: {source}")]
    InvalidTime {
        message: String,
        raw: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Event `{message}` has unparseable field `{field}`: {value}")]
    InvalidField {
        message: String,
        field: String,
        value: String,
    },
}

/// Consensus phase carried by quorum and vote events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Prepare,
    Commit,
}

/// A decoded log event: the message text, its raw timestamp and every other field.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    message: String,
    time: Option<String>,
    fields: Map<String, Value>,
}

impl LogEvent {
    pub fn new(message: impl Into<String>, time: impl Into<String>) -> Self {
        LogEvent {
            message: message.into(),
            time: Some(time.into()),
            fields: Map::new(),
        }
    }

    /// Builder-style helper for attaching a protocol field.
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Decode one JSON log line.
    pub fn from_json_line(line: &str) -> Result<Self, EventError> {
        match serde_json::from_str::<Value>(line)? {
            Value::Object(fields) => Self::from_fields(fields),
            _ => Err(EventError::NotAnObject),
        }
    }

    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, EventError> {
        let message = fields
            .get(MESSAGE_FIELD)
            .and_then(Value::as_str)
            .ok_or(EventError::MissingMessage)?
            .to_string();
        let time = fields
            .get(TIME_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(LogEvent { message, time, fields })
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn raw_time(&self) -> Option<&str> {
        self.time.as_deref()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Parse the RFC 3339 timestamp, normalised to UTC.
    pub fn timestamp(&self) -> Result<DateTime<Utc>, EventError> {
        let raw = self.time.as_deref().ok_or_else(|| EventError::MissingTime {
            message: self.message.clone(),
        })?;

        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|source| EventError::InvalidTime {
                message: self.message.clone(),
                raw: raw.to_string(),
                source,
            })
    }

    /// Protocol block height stored under `field`.
    ///
    /// Returns `Ok(None)` when the field is absent. Accepts non-negative
    /// integers, integral floats and decimal strings.
    pub fn height(&self, field: &str) -> Result<Option<u64>, EventError> {
        let Some(value) = self.fields.get(field) else {
            return Ok(None);
        };

        let parsed = match value {
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            }),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };

        parsed
            .map(Some)
            .ok_or_else(|| self.invalid_field(field, value))
    }

    pub fn phase(&self) -> Option<Phase> {
        match self.fields.get(PHASE_FIELD).and_then(Value::as_str) {
            Some("Prepare") => Some(Phase::Prepare),
            Some("Commit") => Some(Phase::Commit),
            _ => None,
        }
    }

    /// Decimal fraction (string or number) stored under `field`.
    pub fn fraction(&self, field: &str) -> Result<Option<f64>, EventError> {
        let Some(value) = self.fields.get(field) else {
            return Ok(None);
        };

        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        parsed
            .filter(|f| f.is_finite())
            .map(Some)
            .ok_or_else(|| self.invalid_field(field, value))
    }

    fn invalid_field(&self, field: &str, value: &Value) -> EventError {
        EventError::InvalidField {
            message: self.message.clone(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}
