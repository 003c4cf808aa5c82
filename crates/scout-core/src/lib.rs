//! scout-core: Core types and the orchestration loop for scout
//!
//! This crate provides the message and provider types, the tool contract
//! and registry, and the [`AgentExecutor`] that drives a model through
//! tool calls until it answers.

pub mod error;
pub mod executor;
pub mod message;
pub mod provider;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::Error;
pub use executor::{
    AgentExecutor, AgentFinish, EarlyStopping, ExecutorConfig, ProgressEvent, ProgressHandler,
    Scratchpad, ScratchpadEntry, StopReason, DEFAULT_FINAL_ANSWER_TIMEOUT,
    DEFAULT_MAX_EXECUTION_TIME, DEFAULT_MAX_ITERATIONS, FORCE_STOP_MESSAGE,
};
pub use message::{Message, Role, ToolCall, Usage};
pub use provider::{CompletionRequest, CompletionResponse, FinishReason, Provider, ToolChoice};
pub use tool::{PropertySchema, Tool, ToolDefinition, ToolOutput, ToolParameters, ToolRegistry};

pub type Result<T> = std::result::Result<T, Error>;
