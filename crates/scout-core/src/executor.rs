//! The orchestration loop.
//!
//! [`AgentExecutor`] alternates between consulting the model and running the
//! tools it asks for, until the model produces a final answer or one of the
//! two budgets (iterations, wall-clock time) runs out. Everything the model
//! can get wrong is recovered inside the loop and fed back as text:
//!
//! - an unregistered tool name becomes an `UnknownTool` entry listing the
//!   available tools,
//! - a reply that is neither a tool call nor a usable answer becomes a
//!   `Correction` entry restating the expected format.
//!
//! Running out of budget is not an error. The loop applies its
//! [`EarlyStopping`] policy and returns whatever answer it can. The extra
//! model call that policy may make is bounded by its own grace period. Only
//! provider failures escape as `Err`.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::message::{Message, ToolCall, Usage};
use crate::provider::{CompletionRequest, CompletionResponse, FinishReason, Provider, ToolChoice};
use crate::tool::{ToolOutput, ToolRegistry};

pub const DEFAULT_MAX_ITERATIONS: usize = 15;
pub const DEFAULT_MAX_EXECUTION_TIME: Duration = Duration::from_secs(300);
/// Grace period for the final answer request after a budget stop.
pub const DEFAULT_FINAL_ANSWER_TIMEOUT: Duration = Duration::from_secs(30);

/// Output used when no answer could be generated after a budget ran out.
pub const FORCE_STOP_MESSAGE: &str = "Agent stopped due to iteration limit or time limit.";

const FINAL_ANSWER_INSTRUCTION: &str = "You have run out of research steps. \
Using only the information gathered so far, give your final answer now in the required format. \
Do not call any more tools.";

const FORMAT_REMINDER: &str = "Either call exactly one of the available tools with a single \
string argument named \"input\", or reply with your final answer as text.";

/// What to do when a budget runs out before the model answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarlyStopping {
    /// Ask the model one last time, without tools, for its best answer.
    #[default]
    Generate,
    /// Return [`FORCE_STOP_MESSAGE`] without another model call.
    Force,
}

impl FromStr for EarlyStopping {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generate" => Ok(EarlyStopping::Generate),
            "force" => Ok(EarlyStopping::Force),
            other => Err(Error::config(format!(
                "unknown early stopping method '{}' (expected 'generate' or 'force')",
                other
            ))),
        }
    }
}

impl std::fmt::Display for EarlyStopping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EarlyStopping::Generate => write!(f, "generate"),
            EarlyStopping::Force => write!(f, "force"),
        }
    }
}

/// Configuration for an executor run.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of tool-calling steps.
    pub max_iterations: usize,
    /// Wall-clock budget for the loop.
    pub max_execution_time: Duration,
    pub early_stopping: EarlyStopping,
    /// Bound on the extra model call made by [`EarlyStopping::Generate`].
    pub final_answer_timeout: Duration,
    /// Model override passed with every request.
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Extra API parameters passed with every request.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_execution_time: DEFAULT_MAX_EXECUTION_TIME,
            early_stopping: EarlyStopping::default(),
            final_answer_timeout: DEFAULT_FINAL_ANSWER_TIMEOUT,
            model: None,
            temperature: None,
            max_tokens: None,
            extra: HashMap::new(),
        }
    }
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_execution_time(mut self, budget: Duration) -> Self {
        self.max_execution_time = budget;
        self
    }

    pub fn with_early_stopping(mut self, early_stopping: EarlyStopping) -> Self {
        self.early_stopping = early_stopping;
        self
    }

    pub fn with_final_answer_timeout(mut self, grace: Duration) -> Self {
        self.final_answer_timeout = grace;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_extra(mut self, extra: HashMap<String, serde_json::Value>) -> Self {
        self.extra = extra;
        self
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model produced a final answer.
    Finished,
    IterationLimit,
    TimeLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Finished => write!(f, "finished"),
            StopReason::IterationLimit => write!(f, "iteration limit"),
            StopReason::TimeLimit => write!(f, "time limit"),
        }
    }
}

/// One record in a run's scratchpad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScratchpadEntry {
    /// A registered tool was invoked.
    Tool {
        call: ToolCall,
        input: String,
        output: ToolOutput,
    },
    /// The model named a tool that is not registered.
    UnknownTool { call: ToolCall, message: String },
    /// The model's reply could not be interpreted as an action.
    Correction {
        call: Option<ToolCall>,
        message: String,
    },
}

impl ScratchpadEntry {
    pub fn call(&self) -> Option<&ToolCall> {
        match self {
            ScratchpadEntry::Tool { call, .. } | ScratchpadEntry::UnknownTool { call, .. } => {
                Some(call)
            }
            ScratchpadEntry::Correction { call, .. } => call.as_ref(),
        }
    }

    /// The text fed back to the model for this entry.
    pub fn feedback(&self) -> &str {
        match self {
            ScratchpadEntry::Tool { output, .. } => &output.content,
            ScratchpadEntry::UnknownTool { message, .. }
            | ScratchpadEntry::Correction { message, .. } => message,
        }
    }
}

/// Append-only record of one run: the entries plus the message transcript
/// they render to.
#[derive(Debug, Default)]
pub struct Scratchpad {
    entries: Vec<ScratchpadEntry>,
    transcript: Vec<Message>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one tool-calling step. Every call gets exactly one result message.
    fn push_step(&mut self, reply: &str, calls: Vec<ToolCall>, entries: Vec<ScratchpadEntry>) {
        debug_assert_eq!(calls.len(), entries.len());
        self.transcript
            .push(Message::assistant_with_tool_calls(reply, calls));
        for entry in entries {
            if let Some(call) = entry.call() {
                self.transcript
                    .push(Message::tool_result(call, entry.feedback()));
            }
            self.entries.push(entry);
        }
    }

    fn push_correction(&mut self, reply: &str, message: String) {
        if !reply.trim().is_empty() {
            self.transcript.push(Message::assistant(reply));
        }
        self.transcript.push(Message::user(message.as_str()));
        self.entries
            .push(ScratchpadEntry::Correction { call: None, message });
    }

    pub fn entries(&self) -> &[ScratchpadEntry] {
        &self.entries
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn into_entries(self) -> Vec<ScratchpadEntry> {
        self.entries
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone)]
pub struct AgentFinish {
    /// Final text: the model's answer, or the best-effort answer after a budget stop.
    pub output: String,
    pub stop_reason: StopReason,
    /// Tool-calling steps performed.
    pub iterations: usize,
    pub elapsed: Duration,
    pub intermediate_steps: Vec<ScratchpadEntry>,
}

/// Events emitted during a run for progress reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    IterationStart {
        iteration: u32,
        max_iterations: u32,
    },
    ToolStart {
        tool_name: String,
        input: String,
    },
    ToolComplete {
        tool_name: String,
        is_error: bool,
        output_len: usize,
    },
    Correction {
        message: String,
    },
    UsageUpdate {
        usage: Usage,
    },
    Stopped {
        reason: StopReason,
        iterations: usize,
    },
}

/// Receiver of [`ProgressEvent`]s.
#[async_trait]
pub trait ProgressHandler: Send + Sync {
    async fn on_progress(&self, event: ProgressEvent);
}

/// How the loop interprets one model reply.
#[derive(Debug)]
enum ModelAction {
    CallTools(Vec<ToolCall>),
    Finish(String),
    Malformed(&'static str),
}

fn classify(response: CompletionResponse) -> ModelAction {
    let CompletionResponse {
        message,
        finish_reason,
        ..
    } = response;

    if !message.tool_calls.is_empty() {
        return ModelAction::CallTools(message.tool_calls);
    }
    if finish_reason == FinishReason::MalformedToolCall {
        return ModelAction::Malformed("Your last tool call could not be parsed.");
    }
    if message.content.trim().is_empty() {
        return ModelAction::Malformed("Your last reply was empty.");
    }
    ModelAction::Finish(message.content)
}

/// Runs the tool-calling loop against an injectable provider and registry.
pub struct AgentExecutor {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    config: ExecutorConfig,
    progress: Option<Arc<dyn ProgressHandler>>,
}

impl AgentExecutor {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: ExecutorConfig) -> Self {
        Self {
            provider,
            tools,
            config,
            progress: None,
        }
    }

    pub fn with_progress(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress = Some(handler);
        self
    }

    /// Run the loop for one query. The scratchpad lives only for this call.
    pub async fn run(&self, system_prompt: &str, query: &str) -> Result<AgentFinish, Error> {
        let started = Instant::now();
        let mut scratchpad = Scratchpad::new();
        let mut iterations = 0usize;
        let mut last_text: Option<String> = None;

        debug!(
            provider = self.provider.name(),
            tools_available = self.tools.len(),
            max_iterations = self.config.max_iterations,
            max_execution_secs = self.config.max_execution_time.as_secs_f64(),
            "Executor run starting"
        );

        let stop_reason = loop {
            if iterations >= self.config.max_iterations {
                break StopReason::IterationLimit;
            }
            let Some(remaining) = self.remaining(started) else {
                break StopReason::TimeLimit;
            };

            self.emit(ProgressEvent::IterationStart {
                iteration: iterations as u32 + 1,
                max_iterations: self.config.max_iterations as u32,
            })
            .await;

            debug!(
                iteration = iterations,
                transcript_len = scratchpad.transcript().len(),
                "Executor iteration starting"
            );

            let request = self.build_request(system_prompt, query, &scratchpad, ToolChoice::Auto);
            let response = match timeout(remaining, self.provider.complete(request)).await {
                Ok(response) => response?,
                Err(_) => {
                    warn!("Execution time budget ran out waiting for the model");
                    break StopReason::TimeLimit;
                }
            };

            self.emit(ProgressEvent::UsageUpdate {
                usage: response.usage.clone(),
            })
            .await;

            let reply = response.message.content.clone();
            if !reply.trim().is_empty() {
                last_text = Some(reply.clone());
            }

            match classify(response) {
                ModelAction::Finish(output) => {
                    info!(
                        iterations,
                        elapsed_secs = started.elapsed().as_secs_f64(),
                        output_len = output.len(),
                        "Executor finished"
                    );
                    self.emit(ProgressEvent::Stopped {
                        reason: StopReason::Finished,
                        iterations,
                    })
                    .await;
                    return Ok(AgentFinish {
                        output,
                        stop_reason: StopReason::Finished,
                        iterations,
                        elapsed: started.elapsed(),
                        intermediate_steps: scratchpad.into_entries(),
                    });
                }
                ModelAction::Malformed(reason) => {
                    iterations += 1;
                    warn!(iteration = iterations, reason, "Model reply was not a usable action");
                    let message = format!("{} {}", reason, FORMAT_REMINDER);
                    self.emit(ProgressEvent::Correction {
                        message: message.clone(),
                    })
                    .await;
                    scratchpad.push_correction(&reply, message);
                }
                ModelAction::CallTools(calls) => {
                    iterations += 1;
                    if !self.execute_step(&reply, calls, &mut scratchpad, started).await {
                        break StopReason::TimeLimit;
                    }
                }
            }
        };

        info!(
            reason = %stop_reason,
            iterations,
            early_stopping = %self.config.early_stopping,
            "Executor budget exhausted"
        );

        let output = self
            .early_stop(system_prompt, query, &scratchpad, last_text)
            .await;

        self.emit(ProgressEvent::Stopped {
            reason: stop_reason,
            iterations,
        })
        .await;

        Ok(AgentFinish {
            output,
            stop_reason,
            iterations,
            elapsed: started.elapsed(),
            intermediate_steps: scratchpad.into_entries(),
        })
    }

    /// Execute every call of one model step in order.
    ///
    /// Returns false when the time budget ran out during the step.
    async fn execute_step(
        &self,
        reply: &str,
        calls: Vec<ToolCall>,
        scratchpad: &mut Scratchpad,
        started: Instant,
    ) -> bool {
        debug!(tool_count = calls.len(), "Executing tool calls");

        let mut entries = Vec::with_capacity(calls.len());
        let mut within_budget = true;
        for call in &calls {
            let (entry, in_time) = self.dispatch(call, started).await;
            within_budget &= in_time;
            entries.push(entry);
        }
        scratchpad.push_step(reply, calls, entries);
        within_budget
    }

    /// Resolve and run one tool call. The bool is false if the budget ran out.
    async fn dispatch(&self, call: &ToolCall, started: Instant) -> (ScratchpadEntry, bool) {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, "Model requested an unregistered tool");
            let message = format!(
                "Error: Unknown tool '{}'. Available tools: {}",
                call.name,
                self.tools.names().join(", ")
            );
            self.emit(ProgressEvent::Correction {
                message: message.clone(),
            })
            .await;
            return (
                ScratchpadEntry::UnknownTool {
                    call: call.clone(),
                    message,
                },
                true,
            );
        };

        let Some(input) = call.input() else {
            warn!(tool = %call.name, arguments = %call.arguments, "Tool call arguments unusable");
            let message = format!(
                "Error: could not read the input for '{}'. {}",
                call.name, FORMAT_REMINDER
            );
            self.emit(ProgressEvent::Correction {
                message: message.clone(),
            })
            .await;
            return (
                ScratchpadEntry::Correction {
                    call: Some(call.clone()),
                    message,
                },
                true,
            );
        };

        let budget_output = || {
            ToolOutput::error(format!(
                "Error: '{}' did not finish within the execution time budget",
                call.name
            ))
        };

        let Some(remaining) = self.remaining(started) else {
            return (
                ScratchpadEntry::Tool {
                    call: call.clone(),
                    input,
                    output: budget_output(),
                },
                false,
            );
        };

        self.emit(ProgressEvent::ToolStart {
            tool_name: call.name.clone(),
            input: input.clone(),
        })
        .await;
        debug!(tool = %call.name, input_len = input.len(), "Invoking tool");

        let (output, in_time) = match timeout(remaining, tool.invoke(&input)).await {
            Ok(output) => (output, true),
            Err(_) => {
                warn!(tool = %call.name, "Tool interrupted by the execution time budget");
                (budget_output(), false)
            }
        };

        debug!(
            tool = %call.name,
            output_len = output.content.len(),
            is_error = output.is_error,
            "Tool finished"
        );
        trace!(tool = %call.name, content = %output.content, "Tool output");

        self.emit(ProgressEvent::ToolComplete {
            tool_name: call.name.clone(),
            is_error: output.is_error,
            output_len: output.content.len(),
        })
        .await;

        (
            ScratchpadEntry::Tool {
                call: call.clone(),
                input,
                output,
            },
            in_time,
        )
    }

    /// Produce the output after a budget stop.
    async fn early_stop(
        &self,
        system_prompt: &str,
        query: &str,
        scratchpad: &Scratchpad,
        last_text: Option<String>,
    ) -> String {
        if self.config.early_stopping == EarlyStopping::Force {
            return FORCE_STOP_MESSAGE.to_string();
        }

        let mut request = self.build_request(system_prompt, query, scratchpad, ToolChoice::None);
        request.messages.push(Message::user(FINAL_ANSWER_INSTRUCTION));

        let fallback = || last_text.unwrap_or_else(|| FORCE_STOP_MESSAGE.to_string());
        let grace = self.config.final_answer_timeout;
        let generated = match timeout(grace, self.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(format!(
                "no final answer within {:.0}s",
                grace.as_secs_f64()
            ))),
        };
        match generated {
            Ok(response) if !response.message.content.trim().is_empty() => {
                response.message.content
            }
            Ok(_) => {
                warn!("Final answer generation returned no text");
                fallback()
            }
            Err(e) => {
                warn!(error = %e, "Final answer generation failed");
                fallback()
            }
        }
    }

    fn build_request(
        &self,
        system_prompt: &str,
        query: &str,
        scratchpad: &Scratchpad,
        tool_choice: ToolChoice,
    ) -> CompletionRequest {
        let mut messages = Vec::with_capacity(scratchpad.transcript().len() + 2);
        messages.push(Message::system(system_prompt));
        messages.push(Message::user(query));
        messages.extend(scratchpad.transcript().iter().cloned());

        let mut request = CompletionRequest::new(messages)
            .with_tools(self.tools.definitions())
            .with_tool_choice(tool_choice);
        if let Some(model) = &self.config.model {
            request = request.with_model(model.as_str());
        }
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        if !self.config.extra.is_empty() {
            request = request.with_extra(self.config.extra.clone());
        }
        request
    }

    fn remaining(&self, started: Instant) -> Option<Duration> {
        self.config
            .max_execution_time
            .checked_sub(started.elapsed())
            .filter(|d| !d.is_zero())
    }

    async fn emit(&self, event: ProgressEvent) {
        if let Some(handler) = &self.progress {
            handler.on_progress(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::testing::{EchoTool, MockProvider, SlowTool};
    use serde_json::json;
    use std::sync::Mutex;

    fn registry_with(tools: Vec<Arc<dyn crate::Tool>>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        Arc::new(registry)
    }

    fn echo_registry() -> Arc<ToolRegistry> {
        registry_with(vec![Arc::new(EchoTool)])
    }

    #[test]
    fn test_executor_config_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.max_iterations, 15);
        assert_eq!(config.max_execution_time, Duration::from_secs(300));
        assert_eq!(config.early_stopping, EarlyStopping::Generate);
        assert_eq!(config.final_answer_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_early_stopping_parse() {
        assert_eq!("generate".parse::<EarlyStopping>().unwrap(), EarlyStopping::Generate);
        assert_eq!("FORCE".parse::<EarlyStopping>().unwrap(), EarlyStopping::Force);
        assert!("later".parse::<EarlyStopping>().is_err());
    }

    #[tokio::test]
    async fn test_final_answer_without_tools() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_response("{\"topic\": \"X\"}");

        let executor = AgentExecutor::new(provider.clone(), echo_registry(), ExecutorConfig::default());
        let finish = executor.run("system", "query").await.unwrap();

        assert_eq!(finish.output, "{\"topic\": \"X\"}");
        assert_eq!(finish.stop_reason, StopReason::Finished);
        assert_eq!(finish.iterations, 0);
        assert!(finish.intermediate_steps.is_empty());

        let request = provider.last_request().unwrap();
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].content, "query");
        assert_eq!(request.tools.len(), 1);
    }

    #[tokio::test]
    async fn test_echo_call_adds_exactly_one_entry() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("echo", json!({"input": "abc"}));
        provider.queue_response("done");

        let executor = AgentExecutor::new(provider.clone(), echo_registry(), ExecutorConfig::default());
        let finish = executor.run("system", "query").await.unwrap();

        assert_eq!(finish.intermediate_steps.len(), 1);
        match &finish.intermediate_steps[0] {
            ScratchpadEntry::Tool { input, output, .. } => {
                assert_eq!(input, "abc");
                assert_eq!(output, &ToolOutput::success("abc"));
            }
            other => panic!("expected tool entry, got {:?}", other),
        }
        assert_eq!(finish.iterations, 1);

        // The second model call sees the call and its result.
        let request = provider.last_request().unwrap();
        let tool_msg = request.messages.last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.content, "abc");
        assert_eq!(tool_msg.name.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_recovered() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("serch_web", json!({"input": "rust"}));
        provider.queue_tool_call("echo", json!({"input": "rust"}));
        provider.queue_response("answer");

        let executor = AgentExecutor::new(provider.clone(), echo_registry(), ExecutorConfig::default());
        let finish = executor.run("system", "query").await.unwrap();

        assert_eq!(finish.stop_reason, StopReason::Finished);
        assert_eq!(finish.output, "answer");
        assert_eq!(finish.intermediate_steps.len(), 2);
        match &finish.intermediate_steps[0] {
            ScratchpadEntry::UnknownTool { call, message } => {
                assert_eq!(call.name, "serch_web");
                assert!(message.starts_with("Error: Unknown tool 'serch_web'"));
                assert!(message.contains("Available tools: echo"));
            }
            other => panic!("expected unknown tool entry, got {:?}", other),
        }
        assert!(matches!(finish.intermediate_steps[1], ScratchpadEntry::Tool { .. }));
    }

    #[tokio::test]
    async fn test_iteration_cap_is_never_exceeded() {
        for cap in [1usize, 2, 5] {
            let provider = Arc::new(MockProvider::new());
            for _ in 0..cap + 3 {
                provider.queue_tool_call("echo", json!({"input": "again"}));
            }

            let config = ExecutorConfig::default().with_max_iterations(cap);
            let executor = AgentExecutor::new(provider.clone(), echo_registry(), config);
            let finish = executor.run("system", "query").await.unwrap();

            assert_eq!(finish.stop_reason, StopReason::IterationLimit);
            assert_eq!(finish.iterations, cap);
            assert_eq!(finish.intermediate_steps.len(), cap);
            // cap tool steps plus the final generation call
            assert_eq!(provider.request_count(), cap + 1);
            assert_eq!(
                provider.last_request().unwrap().tool_choice,
                ToolChoice::None
            );
        }
    }

    #[tokio::test]
    async fn test_generate_uses_final_model_answer() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("echo", json!({"input": "x"}));
        provider.queue_response("best effort summary");

        let config = ExecutorConfig::default().with_max_iterations(1);
        let executor = AgentExecutor::new(provider.clone(), echo_registry(), config);
        let finish = executor.run("system", "query").await.unwrap();

        assert_eq!(finish.output, "best effort summary");
        let last = provider.last_request().unwrap();
        assert!(last.messages.last().unwrap().content.contains("final answer"));
    }

    #[tokio::test]
    async fn test_generate_falls_back_to_last_text() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_raw_response(MockProvider::response(
            Message::assistant_with_tool_calls(
                "partial notes",
                vec![ToolCall::new("tc_0", "echo", json!({"input": "x"}))],
            ),
            FinishReason::ToolCalls,
        ));
        // Nothing queued for the final call: the mock errors.

        let config = ExecutorConfig::default().with_max_iterations(1);
        let executor = AgentExecutor::new(provider.clone(), echo_registry(), config);
        let finish = executor.run("system", "query").await.unwrap();

        assert_eq!(finish.stop_reason, StopReason::IterationLimit);
        assert_eq!(finish.output, "partial notes");
    }

    #[tokio::test]
    async fn test_force_stopping_skips_final_call() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("echo", json!({"input": "x"}));

        let config = ExecutorConfig::default()
            .with_max_iterations(1)
            .with_early_stopping(EarlyStopping::Force);
        let executor = AgentExecutor::new(provider.clone(), echo_registry(), config);
        let finish = executor.run("system", "query").await.unwrap();

        assert_eq!(finish.output, FORCE_STOP_MESSAGE);
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_budget_interrupts_slow_tool() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("slow", json!({"input": "x"}));
        provider.queue_response("ran out of time");

        let tools = registry_with(vec![Arc::new(SlowTool::new(Duration::from_secs(60)))]);
        let config = ExecutorConfig::default().with_max_execution_time(Duration::from_secs(10));
        let executor = AgentExecutor::new(provider.clone(), tools, config);
        let finish = executor.run("system", "query").await.unwrap();

        assert_eq!(finish.stop_reason, StopReason::TimeLimit);
        assert_eq!(finish.output, "ran out of time");
        assert!(finish.elapsed >= Duration::from_secs(10));
        assert!(finish.elapsed < Duration::from_secs(60));
        match &finish.intermediate_steps[0] {
            ScratchpadEntry::Tool { output, .. } => {
                assert!(output.is_error);
                assert!(output.content.contains("execution time budget"));
            }
            other => panic!("expected tool entry, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_budget_checked_between_steps() {
        let provider = Arc::new(MockProvider::new());
        for _ in 0..10 {
            provider.queue_tool_call("slow", json!({"input": "x"}));
        }
        provider.queue_response("summary");

        // Each step takes 4s, budget is 10s: the third step is cut short.
        let tools = registry_with(vec![Arc::new(SlowTool::new(Duration::from_secs(4)))]);
        let config = ExecutorConfig::default().with_max_execution_time(Duration::from_secs(10));
        let executor = AgentExecutor::new(provider.clone(), tools, config);
        let finish = executor.run("system", "query").await.unwrap();

        assert_eq!(finish.stop_reason, StopReason::TimeLimit);
        assert_eq!(finish.iterations, 3);
        assert!(finish.elapsed <= Duration::from_secs(10));
    }

    /// A model backend that accepts requests and never replies.
    struct StalledProvider;

    #[async_trait]
    impl Provider for StalledProvider {
        fn name(&self) -> &str {
            "stalled"
        }

        fn default_model(&self) -> Option<&str> {
            None
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, Error> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_model_cannot_outlast_budget() {
        let config = ExecutorConfig::default()
            .with_max_execution_time(Duration::from_secs(10))
            .with_final_answer_timeout(Duration::from_secs(5));
        let executor = AgentExecutor::new(Arc::new(StalledProvider), echo_registry(), config);

        let finish = timeout(Duration::from_secs(3600), executor.run("system", "query"))
            .await
            .expect("run outlived its budgets")
            .unwrap();

        assert_eq!(finish.stop_reason, StopReason::TimeLimit);
        assert_eq!(finish.output, FORCE_STOP_MESSAGE);
        assert!(finish.elapsed >= Duration::from_secs(10));
        assert!(finish.elapsed <= Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_reply_text_kept_with_tool_calls() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_raw_response(MockProvider::response(
            Message::assistant_with_tool_calls(
                "Checking the echo tool first.",
                vec![ToolCall::new("tc_0", "echo", json!({"input": "x"}))],
            ),
            FinishReason::ToolCalls,
        ));
        provider.queue_response("done");

        let executor = AgentExecutor::new(provider.clone(), echo_registry(), ExecutorConfig::default());
        executor.run("system", "query").await.unwrap();

        let request = provider.last_request().unwrap();
        let assistant = &request.messages[2];
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.content, "Checking the echo tool first.");
        assert_eq!(assistant.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_tool_call_is_corrected() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_raw_response(MockProvider::response(
            Message::assistant(""),
            FinishReason::MalformedToolCall,
        ));
        provider.queue_response("final");

        let executor = AgentExecutor::new(provider.clone(), echo_registry(), ExecutorConfig::default());
        let finish = executor.run("system", "query").await.unwrap();

        assert_eq!(finish.stop_reason, StopReason::Finished);
        assert_eq!(finish.iterations, 1);
        match &finish.intermediate_steps[0] {
            ScratchpadEntry::Correction { call, message } => {
                assert!(call.is_none());
                assert!(message.contains("could not be parsed"));
            }
            other => panic!("expected correction, got {:?}", other),
        }
        let request = provider.last_request().unwrap();
        assert_eq!(request.messages.last().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn test_unusable_arguments_are_corrected() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("echo", json!({"a": 1, "b": 2}));
        provider.queue_response("final");

        let executor = AgentExecutor::new(provider.clone(), echo_registry(), ExecutorConfig::default());
        let finish = executor.run("system", "query").await.unwrap();

        match &finish.intermediate_steps[0] {
            ScratchpadEntry::Correction { call, message } => {
                assert_eq!(call.as_ref().map(|c| c.name.as_str()), Some("echo"));
                assert!(message.contains("\"input\""));
            }
            other => panic!("expected correction, got {:?}", other),
        }
        // The call still received a result message.
        let request = provider.last_request().unwrap();
        assert_eq!(request.messages.last().unwrap().role, Role::Tool);
    }

    #[tokio::test]
    async fn test_provider_failure_escapes() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_error(Error::network("connection refused"));

        let executor = AgentExecutor::new(provider, echo_registry(), ExecutorConfig::default());
        let err = executor.run("system", "query").await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn test_runs_do_not_share_scratchpads() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("echo", json!({"input": "first"}));
        provider.queue_response("one");
        provider.queue_response("two");

        let executor = AgentExecutor::new(provider.clone(), echo_registry(), ExecutorConfig::default());
        let first = executor.run("system", "q1").await.unwrap();
        let second = executor.run("system", "q2").await.unwrap();

        assert_eq!(first.intermediate_steps.len(), 1);
        assert!(second.intermediate_steps.is_empty());
        assert_eq!(provider.last_request().unwrap().messages.len(), 2);
    }

    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl ProgressHandler for Recorder {
        async fn on_progress(&self, event: ProgressEvent) {
            let name = match event {
                ProgressEvent::IterationStart { .. } => "iteration",
                ProgressEvent::ToolStart { .. } => "tool_start",
                ProgressEvent::ToolComplete { .. } => "tool_complete",
                ProgressEvent::Correction { .. } => "correction",
                ProgressEvent::UsageUpdate { .. } => "usage",
                ProgressEvent::Stopped { .. } => "stopped",
            };
            self.0.lock().unwrap().push(name.to_string());
        }
    }

    #[tokio::test]
    async fn test_progress_events() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_tool_call("echo", json!({"input": "x"}));
        provider.queue_response("done");

        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let executor = AgentExecutor::new(provider, echo_registry(), ExecutorConfig::default())
            .with_progress(recorder.clone());
        executor.run("system", "query").await.unwrap();

        let events = recorder.0.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                "iteration",
                "usage",
                "tool_start",
                "tool_complete",
                "iteration",
                "usage",
                "stopped"
            ]
        );
    }
}
