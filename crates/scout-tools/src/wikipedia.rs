use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use scout_core::{Error, Tool, ToolOutput};

use crate::http::HttpClient;

pub const WIKIPEDIA_API_URL: &str = "https://en.wikipedia.org/w/api.php";

/// Maximum characters of the rendered page summary.
pub const MAX_SUMMARY_CHARS: usize = 2_000;

const NO_RESULT: &str = "No good Wikipedia Search Result was found";

pub struct WikipediaSearchTool {
    http: Arc<HttpClient>,
    endpoint: String,
}

impl WikipediaSearchTool {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            endpoint: WIKIPEDIA_API_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Top search hit and its intro, or `None` when nothing matches.
    async fn lookup(&self, query: &str) -> Result<Option<(String, String)>, Error> {
        let search_url = format!(
            "{}?action=query&list=search&srlimit=1&format=json&srsearch={}",
            self.endpoint,
            urlencoding::encode(query)
        );
        let Some(title) = first_search_title(&self.http.get_json(&search_url).await?) else {
            return Ok(None);
        };

        let extract_url = format!(
            "{}?action=query&prop=extracts&exintro=1&explaintext=1&redirects=1&format=json&titles={}",
            self.endpoint,
            urlencoding::encode(&title)
        );
        let summary = page_extract(&self.http.get_json(&extract_url).await?).unwrap_or_default();
        Ok(Some((title, summary)))
    }
}

#[async_trait]
impl Tool for WikipediaSearchTool {
    fn name(&self) -> &str {
        "wikipedia_search"
    }

    fn description(&self) -> &str {
        "Search Wikipedia only if you need general background information."
    }

    fn input_description(&self) -> &str {
        "The search query"
    }

    async fn invoke(&self, input: &str) -> ToolOutput {
        match self.lookup(input.trim()).await {
            Ok(Some((title, summary))) => ToolOutput::success(render_page(&title, &summary)),
            Ok(None) => ToolOutput::success(NO_RESULT),
            Err(e) => ToolOutput::error(format!("Error searching Wikipedia: {}", e)),
        }
    }
}

fn first_search_title(response: &Value) -> Option<String> {
    response["query"]["search"]
        .as_array()?
        .first()?
        .get("title")?
        .as_str()
        .map(str::to_string)
}

fn page_extract(response: &Value) -> Option<String> {
    response["query"]["pages"]
        .as_object()?
        .values()
        .find_map(|page| page.get("extract").and_then(Value::as_str))
        .map(|s| s.trim().to_string())
}

fn render_page(title: &str, summary: &str) -> String {
    format!("Page: {}\nSummary: {}", title, summary)
        .chars()
        .take(MAX_SUMMARY_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpConfig;
    use serde_json::json;

    #[test]
    fn test_first_search_title() {
        let response = json!({"query": {"search": [{"title": "Rust (programming language)", "pageid": 1}]}});
        assert_eq!(
            first_search_title(&response).as_deref(),
            Some("Rust (programming language)")
        );
        assert!(first_search_title(&json!({"query": {"search": []}})).is_none());
        assert!(first_search_title(&json!({"error": "x"})).is_none());
    }

    #[test]
    fn test_page_extract() {
        let response = json!({"query": {"pages": {"123": {"title": "Rust", "extract": " Rust is a language. "}}}});
        assert_eq!(page_extract(&response).as_deref(), Some("Rust is a language."));
    }

    #[test]
    fn test_render_page_caps_length() {
        assert_eq!(render_page("Rust", "A language."), "Page: Rust\nSummary: A language.");
        let long = render_page("Rust", &"y".repeat(5_000));
        assert_eq!(long.chars().count(), MAX_SUMMARY_CHARS);
    }

    #[tokio::test]
    async fn test_unreachable_is_soft_error() {
        let http = Arc::new(HttpClient::new(HttpConfig::new().impolite()).unwrap());
        let tool = WikipediaSearchTool::new(http).with_endpoint("http://127.0.0.1:1/w/api.php");
        let output = tool.invoke("Rust").await;
        assert!(output.is_error);
        assert!(output.content.starts_with("Error searching Wikipedia:"));
    }
}
