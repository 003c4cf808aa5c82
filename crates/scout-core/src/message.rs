use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Extract the single string input every scout tool takes.
    ///
    /// Accepts `{"input": "..."}`, a bare JSON string, or an object with
    /// exactly one string field (models sometimes rename the parameter).
    pub fn input(&self) -> Option<String> {
        match &self.arguments {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) => {
                if let Some(serde_json::Value::String(s)) = map.get("input") {
                    return Some(s.clone());
                }
                let mut strings = map.values().filter_map(|v| v.as_str());
                match (strings.next(), strings.next(), map.len()) {
                    (Some(only), None, 1) => Some(only.to_string()),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// For tool results: the name of the tool that produced them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            name: Some(call.name.clone()),
            tool_call_id: Some(call.id.clone()),
            ..Self::with_role(Role::Tool, content)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello, world!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, world!");
    }

    #[test]
    fn test_tool_result_carries_call_identity() {
        let call = ToolCall::new("tc_1", "search_web", json!({"input": "rust"}));
        let msg = Message::tool_result(&call, "results");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.name.as_deref(), Some("search_web"));
        assert_eq!(msg.tool_call_id.as_deref(), Some("tc_1"));
    }

    #[test]
    fn test_tool_call_input_forms() {
        let canonical = ToolCall::new("1", "t", json!({"input": "abc"}));
        assert_eq!(canonical.input().as_deref(), Some("abc"));

        let bare = ToolCall::new("2", "t", json!("abc"));
        assert_eq!(bare.input().as_deref(), Some("abc"));

        let renamed = ToolCall::new("3", "t", json!({"query": "abc"}));
        assert_eq!(renamed.input().as_deref(), Some("abc"));
    }

    #[test]
    fn test_tool_call_input_rejects_ambiguous_arguments() {
        assert!(ToolCall::new("1", "t", json!({"a": "x", "b": "y"})).input().is_none());
        assert!(ToolCall::new("2", "t", json!({"input": 3})).input().is_none());
        assert!(ToolCall::new("3", "t", serde_json::Value::Null).input().is_none());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
