//! The structured result of a successful research run.
//!
//! Deserialization is lenient: model output routinely omits fields, uses
//! `null`, or cites a source as a bare string. Missing pieces take defaults
//! rather than failing the whole result.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_TOPIC: &str = "Research Topic";
pub const DEFAULT_SUMMARY: &str = "No summary available";
pub const UNTITLED_SOURCE: &str = "Untitled";

/// Keys that identify an object as a research result.
pub(crate) const RESULT_KEYS: &[&str] = &["topic", "summary", "key_points", "sources", "tools_used"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchResult {
    #[serde(default = "default_topic", deserialize_with = "string_or_topic")]
    pub topic: String,
    #[serde(default = "default_summary", deserialize_with = "string_or_summary")]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub key_points: Vec<String>,
    #[serde(default, deserialize_with = "lenient_sources")]
    pub sources: Vec<Source>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub tools_used: Vec<String>,
}

impl Default for ResearchResult {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            summary: default_summary(),
            key_points: Vec::new(),
            sources: Vec::new(),
            tools_used: Vec::new(),
        }
    }
}

/// A cited source. Title and URL are opaque strings; the URL may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub title: String,
    pub url: String,
}

impl Source {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(source_from_value(Value::deserialize(deserializer)?))
    }
}

fn source_from_value(value: Value) -> Source {
    match value {
        Value::String(title) => Source::new(title, ""),
        Value::Object(map) => {
            let field = |key: &str| map.get(key).and_then(value_text);
            Source::new(
                field("title").unwrap_or_else(|| UNTITLED_SOURCE.to_string()),
                field("url").unwrap_or_default(),
            )
        }
        other => Source::new(other.to_string(), ""),
    }
}

/// Text of a scalar JSON value; `None` for null.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_summary() -> String {
    DEFAULT_SUMMARY.to_string()
}

fn string_or_topic<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(value_text(&Value::deserialize(deserializer)?).unwrap_or_else(default_topic))
}

fn string_or_summary<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(value_text(&Value::deserialize(deserializer)?).unwrap_or_else(default_summary))
}

fn lenient_strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.iter().filter_map(value_text).collect(),
        other => value_text(&other).into_iter().collect(),
    })
}

fn lenient_sources<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Source>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().map(source_from_value).collect(),
        other => vec![source_from_value(other)],
    })
}
