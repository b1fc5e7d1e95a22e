//! Error notices sent to the monitoring backend.
//!
//! A [`Notice`] carries the error chain of one failure, a string-keyed
//! context map and optional request parameters.

use crate::identifiers::NoticeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Component label attached to notices raised by the gRPC interceptors
pub const COMPONENT_GRPC: &str = "grpc";

/// Context key naming the reporting component
pub const CONTEXT_COMPONENT: &str = "component";

/// Context key naming the failed action
pub const CONTEXT_ACTION: &str = "action";

/// One frame of a captured backtrace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
    pub function: String,
}

/// One error of the chain reported by a notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub backtrace: Vec<StackFrame>,
}

impl NoticeError {
    fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self {
            kind: error_kind(err),
            message: err.to_string(),
            backtrace: Vec::new(),
        }
    }
}

/// Structured error report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub id: NoticeId,
    pub errors: Vec<NoticeError>,
    pub context: BTreeMap<String, String>,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    /// Frames skipped when the backtrace was captured
    #[serde(skip)]
    pub skip_frames: usize,
    pub time: DateTime<Utc>,
}

impl Notice {
    /// Build a notice from an error, walking its `source()` chain
    pub fn new(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut errors = vec![NoticeError::from_error(err)];
        let mut source = err.source();
        while let Some(cause) = source {
            errors.push(NoticeError::from_error(cause));
            source = cause.source();
        }

        Self {
            id: NoticeId::new(),
            errors,
            context: BTreeMap::new(),
            params: serde_json::Map::new(),
            skip_frames: 0,
            time: Utc::now(),
        }
    }

    /// Attach a backtrace to the outermost error
    pub fn with_backtrace(mut self, frames: Vec<StackFrame>, skip_frames: usize) -> Self {
        if let Some(first) = self.errors.first_mut() {
            first.backtrace = frames;
        }
        self.skip_frames = skip_frames;
        self
    }

    /// Attach request parameters
    pub fn with_params(mut self, params: serde_json::Map<String, serde_json::Value>) -> Self {
        self.params = params;
        self
    }

    pub fn set_context(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.context.insert(key.into(), value.into());
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    pub fn component(&self) -> Option<&str> {
        self.context_value(CONTEXT_COMPONENT)
    }

    pub fn action(&self) -> Option<&str> {
        self.context_value(CONTEXT_ACTION)
    }

    /// Message of the outermost error
    pub fn message(&self) -> &str {
        self.errors.first().map(|e| e.message.as_str()).unwrap_or("")
    }
}

/// Derive a short type label for an error from its `Debug` rendering.
///
/// `Status { code: .. }` yields `Status`, a unit-like `Timeout` yields
/// `Timeout`. Falls back to `error`.
pub fn error_kind(err: &dyn std::error::Error) -> String {
    let rendered = format!("{:?}", err);
    let kind: String = rendered
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    if kind.is_empty() {
        "error".to_string()
    } else {
        kind
    }
}

/// Parse the `Display` rendering of a `std::backtrace::Backtrace`.
///
/// Frame lines look like `  3: crate::module::function` and are optionally
/// followed by `at ./src/file.rs:12:5`.
pub fn parse_backtrace(rendered: &str) -> Vec<StackFrame> {
    let mut frames: Vec<StackFrame> = Vec::new();

    for line in rendered.lines().map(str::trim) {
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                let mut parts = location.rsplitn(3, ':');
                let _column = parts.next();
                let line_no = parts.next().and_then(|l| l.parse().ok());
                match (line_no, parts.next()) {
                    (Some(line_no), Some(file)) => {
                        frame.file = file.to_string();
                        frame.line = line_no;
                    }
                    _ => frame.file = location.to_string(),
                }
            }
            continue;
        }

        if let Some((index, function)) = line.split_once(": ") {
            if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                frames.push(StackFrame {
                    file: String::new(),
                    line: 0,
                    function: function.to_string(),
                });
            }
        }
    }

    frames
}
