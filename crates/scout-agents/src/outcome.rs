use serde_json::{json, Value};
use tracing::{info, warn};

use scout_core::{AgentExecutor, AgentFinish};

use crate::recovery::{recover, Recovery};
use crate::researcher::ResearcherAgent;
use crate::result::ResearchResult;

/// Error message recorded when the final answer holds no research result.
pub const PARSE_FAILURE_MESSAGE: &str = "Unable to parse JSON response";

/// Characters of raw output kept in a parse-failure record.
pub const RAW_OUTPUT_RECORD_CHARS: usize = 1_000;

/// Exactly one per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success(ResearchResult),
    ParseFailure { raw_text: String, reason: String },
    ExecutionFailure { error: String },
}

impl RunOutcome {
    pub fn from_output(text: &str) -> Self {
        match recover(text) {
            Recovery::Parsed(result) => {
                info!(topic = %result.topic, sources = result.sources.len(), "Research result recovered");
                RunOutcome::Success(result)
            }
            Recovery::Failed { raw_text, reason } => {
                warn!(reason = %reason, raw_len = raw_text.len(), "Could not recover a research result");
                RunOutcome::ParseFailure { raw_text, reason }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_))
    }

    pub fn result(&self) -> Option<&ResearchResult> {
        match self {
            RunOutcome::Success(result) => Some(result),
            _ => None,
        }
    }

    /// The record a failed run returns; `None` on success.
    pub fn error_record(&self) -> Option<Value> {
        match self {
            RunOutcome::Success(_) => None,
            RunOutcome::ParseFailure { raw_text, .. } => Some(json!({
                "error": PARSE_FAILURE_MESSAGE,
                "raw_output": raw_text.chars().take(RAW_OUTPUT_RECORD_CHARS).collect::<String>(),
            })),
            RunOutcome::ExecutionFailure { error } => Some(json!({ "error": error })),
        }
    }

    /// The result on success, otherwise the error record.
    pub fn to_json(&self) -> Value {
        match self {
            RunOutcome::Success(result) => serde_json::to_value(result).unwrap_or(Value::Null),
            _ => self.error_record().unwrap_or(Value::Null),
        }
    }
}

/// A finished research run.
#[derive(Debug, Clone)]
pub struct ResearchRun {
    pub outcome: RunOutcome,
    /// Loop metadata; absent when the loop itself failed.
    pub finish: Option<AgentFinish>,
}

/// Run the research agent on one query.
pub async fn run_research(executor: &AgentExecutor, query: &str) -> ResearchRun {
    ResearcherAgent::new().run(executor, query).await
}
