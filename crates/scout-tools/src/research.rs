//! Multi-source topic research: one search, then article extraction on the
//! most promising result pages.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};
use url::Url;

use scout_core::{Tool, ToolOutput};

use crate::http::truncate_output;
use crate::web::{ExtractArticleTool, SearchWebTool};

/// Maximum characters of combined research returned to the model.
pub const MAX_RESEARCH_CHARS: usize = 20_000;

const MAX_SOURCES: usize = 3;

/// Domains skipped as research sources: encyclopedias are deprioritized,
/// video and social sites rarely have extractable text.
const SKIPPED_DOMAINS: &[&str] = &["wikipedia.org", "youtube.com", "facebook.com", "twitter.com"];

static URL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+").ok());

pub struct ResearchTopicTool {
    search: Arc<SearchWebTool>,
    article: Arc<ExtractArticleTool>,
}

impl ResearchTopicTool {
    pub fn new(search: Arc<SearchWebTool>, article: Arc<ExtractArticleTool>) -> Self {
        Self { search, article }
    }

    async fn research(&self, query: &str) -> ToolOutput {
        let search_results = match self.search.search_formatted(query).await {
            Ok(text) => text,
            Err(e) => return ToolOutput::error(format!("Error during topic research: {}", e)),
        };

        let urls = source_urls(&search_results, MAX_SOURCES);
        info!(query, sources = urls.len(), "Researching topic");

        let mut header = format!("Researching: {}\n\nSources consulted:\n", query);
        let mut sections = Vec::with_capacity(urls.len() + 1);
        for (i, url) in urls.iter().enumerate() {
            let content = self.article.extract(url).await;
            debug!(url = %url, is_error = content.is_error, "Source extracted");
            header.push_str(&format!("{}. {}\n", i + 1, url));
            sections.push(format!("Source {}: {}\n\n{}", i + 1, url, content.content));
        }
        sections.push(format!("Search Results:\n{}", search_results));

        let combined = format!("{}\n\n{}", header, sections.join("\n\n---\n\n"));
        ToolOutput::success(truncate_output(&combined, MAX_RESEARCH_CHARS))
    }
}

#[async_trait]
impl Tool for ResearchTopicTool {
    fn name(&self) -> &str {
        "research_topic"
    }

    fn description(&self) -> &str {
        "Conduct comprehensive research on a topic by gathering information from multiple web sources."
    }

    fn input_description(&self) -> &str {
        "The topic to research"
    }

    async fn invoke(&self, input: &str) -> ToolOutput {
        self.research(input.trim()).await
    }
}

/// Pull up to `limit` usable source URLs out of search result text.
pub fn source_urls(text: &str, limit: usize) -> Vec<String> {
    let Some(pattern) = URL_PATTERN.as_ref() else {
        return Vec::new();
    };
    pattern
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', ')']))
        .filter(|candidate| is_usable_source(candidate))
        .take(limit)
        .map(str::to_string)
        .collect()
}

fn is_usable_source(candidate: &str) -> bool {
    let Ok(url) = Url::parse(candidate) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    !host.contains(".gov") && !SKIPPED_DOMAINS.iter().any(|domain| host.contains(domain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpClient, HttpConfig};

    #[test]
    fn test_source_urls_filters_domains() {
        let text = "1. Rust\n   URL: https://en.wikipedia.org/wiki/Rust\n\
                    2. Video\n   URL: https://www.youtube.com/watch?v=1\n\
                    3. Agency\n   URL: https://www.nist.gov/rust.\n\
                    4. Blog\n   URL: https://blog.example.com/post),\n\
                    5. Docs\n   URL: https://doc.rust-lang.org/book/\n\
                    6. Social\n   URL: https://twitter.com/rustlang\n\
                    7. News\n   URL: https://news.example.org/a;\n\
                    8. More\n   URL: https://more.example.net/\n";

        let urls = source_urls(text, 3);
        assert_eq!(
            urls,
            vec![
                "https://blog.example.com/post",
                "https://doc.rust-lang.org/book/",
                "https://news.example.org/a",
            ]
        );
    }

    #[test]
    fn test_source_urls_none() {
        assert!(source_urls("no links here", 3).is_empty());
    }

    #[tokio::test]
    async fn test_research_search_failure_is_soft_error() {
        let http = Arc::new(HttpClient::new(HttpConfig::new().impolite()).unwrap());
        let search = Arc::new(SearchWebTool::new(http.clone()).with_endpoint("http://127.0.0.1:1/"));
        let article = Arc::new(ExtractArticleTool::new(http));
        let tool = ResearchTopicTool::new(search, article);

        let output = tool.invoke("rust ownership").await;
        assert!(output.is_error);
        assert!(output.content.starts_with("Error during topic research:"));
    }
}
