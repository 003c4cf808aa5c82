//! Run-event log.
//!
//! Appends one JSON line `{timestamp, event_type, data}` per executor event,
//! plus run start and end records, so a research session can be replayed.
//!
//! The file is shared with the JSON tracing layer. Both sides hold the same
//! append-mode handle and emit each line with a single write, so records
//! interleave without overwriting each other.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use scout_agents::{ResearchRun, RunOutcome};
use scout_core::ProgressEvent;

/// Open a log file for appending, creating it if needed.
pub fn open_shared(path: &Path) -> std::io::Result<Arc<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Arc::new(file))
}

pub struct RunLog {
    file: Arc<File>,
}

impl RunLog {
    pub fn with_file(file: Arc<File>) -> Self {
        Self { file }
    }

    fn log<T: Serialize>(&self, event_type: &str, data: T) {
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            event_type: event_type.to_string(),
            data: serde_json::to_value(data).unwrap_or_default(),
        };

        if let Ok(mut line) = serde_json::to_vec(&entry) {
            line.push(b'\n');
            let _ = (&*self.file).write_all(&line);
        }
    }

    pub fn log_run_start(&self, query: &str, model: Option<&str>, tool_count: usize) {
        self.log(
            "run_start",
            RunStartEvent {
                query: query.to_string(),
                model: model.map(|m| m.to_string()),
                tool_count,
            },
        );
    }

    pub fn log_progress(&self, event: &ProgressEvent) {
        let (event_type, data) = split_event(event);
        self.log(&event_type, data);
    }

    pub fn log_run_end(&self, run: &ResearchRun) {
        let outcome = match &run.outcome {
            RunOutcome::Success(_) => "success",
            RunOutcome::ParseFailure { .. } => "parse_failure",
            RunOutcome::ExecutionFailure { .. } => "execution_failure",
        };
        let finish = run.finish.as_ref();
        self.log(
            "run_end",
            RunEndEvent {
                outcome: outcome.to_string(),
                stop_reason: finish.map(|f| f.stop_reason.to_string()),
                iterations: finish.map(|f| f.iterations),
                elapsed_secs: finish.map(|f| f.elapsed.as_secs_f64()),
                output_length: finish.map(|f| f.output.len()),
                error: run.outcome.error_record(),
            },
        );
    }
}

/// Separate the serde tag of a progress event from its fields.
fn split_event(event: &ProgressEvent) -> (String, Value) {
    let mut value = serde_json::to_value(event).unwrap_or_default();
    let event_type = value
        .as_object_mut()
        .and_then(|map| map.remove("event"))
        .and_then(|tag| tag.as_str().map(str::to_string))
        .unwrap_or_else(|| "progress".to_string());
    (event_type, value)
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    event_type: String,
    data: Value,
}

#[derive(Serialize)]
struct RunStartEvent {
    query: String,
    model: Option<String>,
    tool_count: usize,
}

#[derive(Serialize)]
struct RunEndEvent {
    outcome: String,
    stop_reason: Option<String>,
    iterations: Option<usize>,
    elapsed_secs: Option<f64>,
    output_length: Option<usize>,
    error: Option<Value>,
}
