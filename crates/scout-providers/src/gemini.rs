//! Google Gemini `generateContent` provider.
//!
//! The transcript maps onto Gemini contents as follows. System messages
//! become the `systemInstruction`. Assistant turns are `model` contents
//! carrying text and `functionCall` parts. Tool results travel back as
//! `functionResponse` parts in a `user` content. Gemini rejects consecutive
//! contents with the same role, so neighbours are merged.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, trace, warn};

use scout_core::{
    CompletionRequest, CompletionResponse, Error, FinishReason, Message, Provider, Role, ToolCall,
    ToolChoice, ToolDefinition, Usage,
};

use self::wire::{
    Candidate, Content, FunctionCallingConfig, FunctionDeclaration, GenerateRequest,
    GenerateResponse, GenerationConfig, Part, ToolConfig, ToolsEntry,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound on a whole generateContent exchange.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: Option<String>,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: None,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    fn model_for(&self, request: &CompletionRequest) -> String {
        request
            .model
            .as_deref()
            .or(self.default_model.as_deref())
            .unwrap_or(DEFAULT_MODEL)
            .to_string()
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }
}

/// Translate a completion request into the Gemini request body.
fn encode_request(request: &CompletionRequest) -> GenerateRequest {
    let system_parts: Vec<Part> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System && !m.content.is_empty())
        .map(|m| Part::text(&m.content))
        .collect();
    let system_instruction = (!system_parts.is_empty()).then(|| Content {
        role: None,
        parts: system_parts,
    });

    let contents = merge_same_role(
        request
            .messages
            .iter()
            .filter_map(|m| encode_message(m, &request.messages))
            .collect(),
    );

    let tools = (!request.tools.is_empty()).then(|| {
        vec![ToolsEntry {
            function_declarations: request.tools.iter().map(declare_function).collect(),
        }]
    });

    // Declarations stay in place when tools are disabled, so function calls
    // already in the history remain valid.
    let tool_config = (request.tool_choice == ToolChoice::None && tools.is_some()).then(|| {
        ToolConfig {
            function_calling_config: FunctionCallingConfig {
                mode: "NONE".to_string(),
            },
        }
    });

    GenerateRequest {
        contents,
        system_instruction,
        tools,
        tool_config,
        generation_config: Some(GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_tokens,
            extra: request.extra.clone(),
        }),
    }
}

/// One transcript message as a Gemini content; `None` when it has nothing to send.
fn encode_message(message: &Message, history: &[Message]) -> Option<Content> {
    match message.role {
        Role::System => None,
        Role::User => (!message.content.is_empty()).then(|| Content::user(vec![Part::text(&message.content)])),
        Role::Assistant => {
            let mut parts: Vec<Part> = Vec::with_capacity(message.tool_calls.len() + 1);
            if !message.content.is_empty() {
                parts.push(Part::text(&message.content));
            }
            parts.extend(message.tool_calls.iter().map(Part::function_call));
            (!parts.is_empty()).then(|| Content {
                role: Some("model".to_string()),
                parts,
            })
        }
        Role::Tool => {
            let call_id = message.tool_call_id.as_deref().unwrap_or_default();
            let name = message
                .name
                .clone()
                .or_else(|| tool_name_for_call(history, call_id))
                .unwrap_or_else(|| format!("unknown_{}", call_id));
            Some(Content::user(vec![Part::function_response(name, &message.content)]))
        }
    }
}

fn tool_name_for_call(history: &[Message], call_id: &str) -> Option<String> {
    history
        .iter()
        .flat_map(|m| &m.tool_calls)
        .find(|call| call.id == call_id)
        .map(|call| call.name.clone())
}

fn declare_function(tool: &ToolDefinition) -> FunctionDeclaration {
    let mut parameters = serde_json::to_value(&tool.parameters).unwrap_or_default();
    // Not part of Gemini's schema subset.
    if let Some(schema) = parameters.as_object_mut() {
        schema.remove("additionalProperties");
    }
    FunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters,
    }
}

fn merge_same_role(contents: Vec<Content>) -> Vec<Content> {
    contents.into_iter().fold(Vec::new(), |mut merged: Vec<Content>, content| {
        match merged.last_mut() {
            Some(last) if last.role == content.role => last.parts.extend(content.parts),
            _ => merged.push(content),
        }
        merged
    })
}

/// Translate a Gemini response body into a completion response.
fn decode_response(response: GenerateResponse, model: &str) -> Result<CompletionResponse, Error> {
    let GenerateResponse {
        candidates,
        usage_metadata,
        prompt_feedback,
    } = response;

    let Some(candidate) = candidates.and_then(|c| c.into_iter().next()) else {
        return Err(match prompt_feedback.and_then(|f| f.block_reason) {
            Some(reason) => Error::api(400, format!("Blocked by safety filter: {}", reason)),
            None => Error::api(500, "No candidates in Gemini response"),
        });
    };

    let (text, tool_calls) = split_parts(&candidate);
    let finish_reason = if tool_calls.is_empty() {
        decode_finish_reason(candidate.finish_reason.as_deref())
    } else {
        FinishReason::ToolCalls
    };

    let message = if tool_calls.is_empty() {
        Message::assistant(text)
    } else {
        Message::assistant_with_tool_calls(text, tool_calls)
    };

    let usage = usage_metadata
        .map(|u| {
            Usage::new(
                u.prompt_token_count.unwrap_or(0),
                u.candidates_token_count.unwrap_or(0),
            )
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        message,
        usage,
        model: model.to_string(),
        finish_reason,
    })
}

/// Text parts joined by newlines, and function calls with generated ids.
fn split_parts(candidate: &Candidate) -> (String, Vec<ToolCall>) {
    let mut texts = Vec::new();
    let mut calls = Vec::new();
    let parts = candidate.content.iter().flat_map(|c| &c.parts);
    for part in parts {
        match part {
            Part::Text { text } => texts.push(text.as_str()),
            Part::FunctionCall { function_call } => calls.push(ToolCall::new(
                format!("gemini_tc_{}", calls.len()),
                function_call.name.clone(),
                function_call.args.clone(),
            )),
            Part::FunctionResponse { .. } => {}
        }
    }
    (texts.join("\n"), calls)
}

fn decode_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        None | Some("STOP") => FinishReason::Stop,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII") => {
            FinishReason::ContentFilter
        }
        Some("MALFORMED_FUNCTION_CALL") => {
            warn!("Gemini produced a malformed function call");
            FinishReason::MalformedToolCall
        }
        Some(other) => {
            debug!(finish_reason = other, "Unrecognized Gemini finish reason");
            FinishReason::Stop
        }
    }
}

/// Map an HTTP failure to an error, using the API's message when the body has one.
fn decode_error(status: u16, body: &str) -> Error {
    let Some(message) = serde_json::from_str::<wire::ErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
    else {
        return Error::api(status, body.to_string());
    };

    match status {
        401 | 403 => Error::auth(message),
        400 if message.contains("API key") => Error::auth(message),
        400 => Error::invalid_request(message),
        429 => Error::rate_limit(message),
        _ => Error::api(status, message),
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        let model = self.model_for(&request);
        let body = encode_request(&request);

        debug!(
            model = %model,
            contents = body.contents.len(),
            tools = request.tools.len(),
            tools_disabled = body.tool_config.is_some(),
            "Gemini request"
        );
        trace!(body = %serde_json::to_string(&body).unwrap_or_default(), "Gemini request body");

        let response = self
            .client
            .post(self.endpoint(&model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::network(e.to_string()))?;

        if !status.is_success() {
            error!(status = status.as_u16(), body = %text, "Gemini request failed");
            return Err(decode_error(status.as_u16(), &text));
        }
        trace!(body = %text, "Gemini response body");

        let parsed = decode_response(serde_json::from_str(&text)?, &model)?;

        debug!(
            finish_reason = ?parsed.finish_reason,
            content_len = parsed.message.content.len(),
            tool_calls = parsed.message.tool_calls.len(),
            prompt_tokens = parsed.usage.prompt_tokens,
            completion_tokens = parsed.usage.completion_tokens,
            "Gemini response"
        );

        Ok(parsed)
    }
}

/// Request and response bodies of the `generateContent` endpoint.
mod wire {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    use scout_core::ToolCall;

    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerateRequest {
        pub contents: Vec<Content>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub system_instruction: Option<Content>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub tools: Option<Vec<ToolsEntry>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub tool_config: Option<ToolConfig>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub generation_config: Option<GenerationConfig>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub(super) struct Content {
        /// Absent on the system instruction.
        #[serde(skip_serializing_if = "Option::is_none")]
        pub role: Option<String>,
        #[serde(default)]
        pub parts: Vec<Part>,
    }

    impl Content {
        pub fn user(parts: Vec<Part>) -> Self {
            Self {
                role: Some("user".to_string()),
                parts,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(untagged)]
    pub(super) enum Part {
        FunctionCall {
            #[serde(rename = "functionCall")]
            function_call: FunctionCall,
        },
        FunctionResponse {
            #[serde(rename = "functionResponse")]
            function_response: FunctionResponse,
        },
        Text {
            text: String,
        },
    }

    impl Part {
        pub fn text(text: &str) -> Self {
            Part::Text {
                text: text.to_string(),
            }
        }

        pub fn function_call(call: &ToolCall) -> Self {
            Part::FunctionCall {
                function_call: FunctionCall {
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                },
            }
        }

        pub fn function_response(name: String, result: &str) -> Self {
            Part::FunctionResponse {
                function_response: FunctionResponse {
                    name,
                    response: json!({ "result": result }),
                },
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub(super) struct FunctionCall {
        pub name: String,
        #[serde(default)]
        pub args: Value,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub(super) struct FunctionResponse {
        pub name: String,
        pub response: Value,
    }

    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ToolsEntry {
        pub function_declarations: Vec<FunctionDeclaration>,
    }

    #[derive(Debug, Serialize)]
    pub(super) struct FunctionDeclaration {
        pub name: String,
        pub description: String,
        pub parameters: Value,
    }

    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ToolConfig {
        pub function_calling_config: FunctionCallingConfig,
    }

    #[derive(Debug, Serialize)]
    pub(super) struct FunctionCallingConfig {
        pub mode: String,
    }

    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerationConfig {
        #[serde(skip_serializing_if = "Option::is_none")]
        pub temperature: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub max_output_tokens: Option<u32>,
        #[serde(flatten)]
        pub extra: HashMap<String, Value>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct GenerateResponse {
        #[serde(default)]
        pub candidates: Option<Vec<Candidate>>,
        #[serde(default)]
        pub usage_metadata: Option<UsageMetadata>,
        #[serde(default)]
        pub prompt_feedback: Option<PromptFeedback>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct Candidate {
        #[serde(default)]
        pub content: Option<Content>,
        #[serde(default)]
        pub finish_reason: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct UsageMetadata {
        #[serde(default)]
        pub prompt_token_count: Option<u32>,
        #[serde(default)]
        pub candidates_token_count: Option<u32>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct PromptFeedback {
        #[serde(default)]
        pub block_reason: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct ErrorBody {
        pub error: ErrorDetail,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct ErrorDetail {
        pub message: String,
    }
}
