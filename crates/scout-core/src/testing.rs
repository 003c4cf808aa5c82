//! Doubles for exercising the executor without network access.
//! Compiled for tests and behind the `testing` feature.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;
use crate::message::{Message, ToolCall, Usage};
use crate::provider::{CompletionRequest, CompletionResponse, FinishReason, Provider};
use crate::tool::{Tool, ToolOutput};

/// Scripted model: replies are consumed in the order they were queued and
/// every request is recorded.
#[derive(Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<Result<CompletionResponse, Error>>>,
    seen: Mutex<Vec<CompletionRequest>>,
    call_ids: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a message in a response with fixed usage figures.
    pub fn response(message: Message, finish_reason: FinishReason) -> CompletionResponse {
        CompletionResponse {
            message,
            usage: Usage::new(10, 5),
            model: "mock-model".to_string(),
            finish_reason,
        }
    }

    fn push(&self, reply: Result<CompletionResponse, Error>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    pub fn queue_response(&self, content: &str) {
        self.push(Ok(Self::response(
            Message::assistant(content),
            FinishReason::Stop,
        )));
    }

    /// Queue a turn that calls one tool. Ids run `mock_tc_0`, `mock_tc_1`, ...
    pub fn queue_tool_call(&self, name: &str, arguments: serde_json::Value) {
        let id = format!("mock_tc_{}", self.call_ids.fetch_add(1, Ordering::SeqCst));
        self.push(Ok(Self::response(
            Message::assistant_with_tool_calls("", vec![ToolCall::new(id, name, arguments)]),
            FinishReason::ToolCalls,
        )));
    }

    pub fn queue_raw_response(&self, response: CompletionResponse) {
        self.push(Ok(response));
    }

    pub fn queue_error(&self, error: Error) {
        self.push(Err(error));
    }

    pub fn request_count(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or(0)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.seen.lock().ok()?.last().cloned()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> Option<&str> {
        None
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(request);
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| Err(Error::Unknown("mock script exhausted".to_string())))
    }
}

/// Returns its input unchanged.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input back"
    }

    async fn invoke(&self, input: &str) -> ToolOutput {
        ToolOutput::success(input)
    }
}

/// Sleeps before answering. Pair with paused tokio time.
pub struct SlowTool {
    delay: Duration,
}

impl SlowTool {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Answer after a delay"
    }

    async fn invoke(&self, input: &str) -> ToolOutput {
        tokio::time::sleep(self.delay).await;
        ToolOutput::success(format!("slow: {}", input))
    }
}
