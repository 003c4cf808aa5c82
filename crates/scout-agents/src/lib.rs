//! Research agent for scout.
//!
//! This crate provides:
//! - `ResearcherAgent`: the research prompt and tool priority
//! - `ResearchResult`: the structured, cited summary of a run
//! - Output recovery from free-form model text
//! - `RunOutcome` and `run_research`, tying the loop and recovery together

mod outcome;
mod recovery;
mod researcher;
mod result;

pub use outcome::{
    run_research, ResearchRun, RunOutcome, PARSE_FAILURE_MESSAGE, RAW_OUTPUT_RECORD_CHARS,
};
pub use recovery::{balanced_spans, recover, Recovery};
pub use researcher::{ResearcherAgent, TOOL_PRIORITY};
pub use result::{ResearchResult, Source, DEFAULT_SUMMARY, DEFAULT_TOPIC, UNTITLED_SOURCE};
