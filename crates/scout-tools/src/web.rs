//! Web tools: search, page scraping and article extraction.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::Html;
use tracing::debug;

use scout_core::{Error, Tool, ToolOutput};

use crate::html::{
    collapse_whitespace, document_text, element_text, meta_content, select_all, select_first,
    select_within,
};
use crate::http::{truncate_output, HttpClient};

pub const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

/// Maximum characters returned for a single page.
pub const MAX_PAGE_CHARS: usize = 10_000;

const DEFAULT_SEARCH_RESULTS: usize = 5;

// =============================================================================
// Web Search Tool
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub struct SearchWebTool {
    http: Arc<HttpClient>,
    endpoint: String,
    max_results: usize,
}

impl SearchWebTool {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            endpoint: DUCKDUCKGO_HTML_URL.to_string(),
            max_results: DEFAULT_SEARCH_RESULTS,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, Error> {
        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        let html = self.http.get_text(&url).await?;
        let mut results = parse_search_results(&html);
        results.truncate(self.max_results);
        debug!(query, results = results.len(), "Web search complete");
        Ok(results)
    }

    /// Search and render the results as the model sees them.
    pub async fn search_formatted(&self, query: &str) -> Result<String, Error> {
        let results = self.search(query).await?;
        if results.is_empty() {
            return Ok(format!("No results found for '{}'.", query));
        }
        Ok(format_search_results(&results))
    }
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the web for up-to-date information on any topic."
    }

    fn input_description(&self) -> &str {
        "The search query"
    }

    async fn invoke(&self, input: &str) -> ToolOutput {
        match self.search_formatted(input.trim()).await {
            Ok(text) => ToolOutput::success(text),
            Err(e) => ToolOutput::error(format!("Error during web search: {}", e)),
        }
    }
}

/// Parse the DuckDuckGo HTML results page, skipping ads.
pub fn parse_search_results(html: &str) -> Vec<SearchResult> {
    let doc = Html::parse_document(html);
    select_all(&doc, "div.result")
        .into_iter()
        .filter(|result| !result.value().classes().any(|c| c == "result--ad"))
        .filter_map(|result| {
            let link = select_within(result, "a.result__a")?;
            let url = resolve_result_link(link.value().attr("href")?)?;
            let snippet = select_within(result, ".result__snippet")
                .map(element_text)
                .unwrap_or_default();
            Some(SearchResult {
                title: element_text(link),
                url,
                snippet,
            })
        })
        .collect()
}

/// Resolve a result href, decoding DuckDuckGo's `/l/?uddg=` redirects.
fn resolve_result_link(href: &str) -> Option<String> {
    if let Some(start) = href.find("uddg=") {
        let encoded = &href[start + 5..];
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        return urlencoding::decode(encoded).ok().map(|s| s.into_owned());
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    None
}

pub fn format_search_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. {}\n   URL: {}\n   Snippet: {}\n\n",
                i + 1,
                r.title,
                r.url,
                r.snippet
            )
        })
        .collect()
}

// =============================================================================
// Scrape Webpage Tool
// =============================================================================

pub struct ScrapeWebpageTool {
    http: Arc<HttpClient>,
}

impl ScrapeWebpageTool {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    pub async fn scrape(&self, url: &str) -> ToolOutput {
        match self.http.get_text(url).await {
            Ok(html) => ToolOutput::success(scrape_html(url, &html)),
            Err(e) => ToolOutput::error(format!("Error scraping webpage {}: {}", url, e)),
        }
    }
}

#[async_trait]
impl Tool for ScrapeWebpageTool {
    fn name(&self) -> &str {
        "scrape_webpage"
    }

    fn description(&self) -> &str {
        "Scrape and extract content from a specific webpage URL."
    }

    fn input_description(&self) -> &str {
        "The URL of the webpage"
    }

    async fn invoke(&self, input: &str) -> ToolOutput {
        self.scrape(input.trim()).await
    }
}

/// Readable text of a page, prefixed with its source and capped.
pub fn scrape_html(url: &str, html: &str) -> String {
    let doc = Html::parse_document(html);
    let text = format!("Source URL: {}\n\n{}", url, document_text(&doc));
    truncate_output(&text, MAX_PAGE_CHARS)
}

// =============================================================================
// Extract Article Tool
// =============================================================================

/// Metadata and body of an article page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Article {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub published: Option<String>,
    pub body: String,
}

pub struct ExtractArticleTool {
    http: Arc<HttpClient>,
}

impl ExtractArticleTool {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    pub async fn extract(&self, url: &str) -> ToolOutput {
        match self.http.get_text(url).await {
            Ok(html) => ToolOutput::success(render_article(url, &html)),
            Err(e) => ToolOutput::error(format!(
                "Error extracting article content from {}: {}",
                url, e
            )),
        }
    }
}

#[async_trait]
impl Tool for ExtractArticleTool {
    fn name(&self) -> &str {
        "extract_article"
    }

    fn description(&self) -> &str {
        "Extract main article content, title, and metadata from a webpage URL."
    }

    fn input_description(&self) -> &str {
        "The URL of the article"
    }

    async fn invoke(&self, input: &str) -> ToolOutput {
        self.extract(input.trim()).await
    }
}

pub fn parse_article(html: &str) -> Article {
    let doc = Html::parse_document(html);

    let title = meta_content(&doc, r#"meta[property="og:title"]"#).or_else(|| {
        select_first(&doc, "title")
            .map(element_text)
            .filter(|t| !t.is_empty())
    });

    let mut authors: Vec<String> = select_all(
        &doc,
        r#"meta[name="author"], meta[property="article:author"]"#,
    )
    .into_iter()
    .filter_map(|el| el.value().attr("content"))
    .map(collapse_whitespace)
    .filter(|a| !a.is_empty())
    .collect();
    authors.dedup();

    let published = meta_content(&doc, r#"meta[property="article:published_time"]"#)
        .or_else(|| meta_content(&doc, r#"meta[name="date"]"#))
        .or_else(|| {
            select_first(&doc, "time[datetime]")
                .and_then(|el| el.value().attr("datetime"))
                .map(str::to_string)
        });

    let body = ["article p", "main p"]
        .iter()
        .map(|css| {
            select_all(&doc, css)
                .into_iter()
                .map(element_text)
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n")
        })
        .find(|body| !body.is_empty())
        .unwrap_or_default();

    Article {
        title,
        authors,
        published,
        body,
    }
}

/// Article text with a metadata header, or the scraped page when no
/// article body is found.
pub fn render_article(url: &str, html: &str) -> String {
    let article = parse_article(html);
    if article.body.is_empty() {
        debug!(url, "No article body found, falling back to page scrape");
        return scrape_html(url, html);
    }

    let mut out = format!("Title: {}\n", article.title.as_deref().unwrap_or_default());
    if !article.authors.is_empty() {
        out.push_str(&format!("Authors: {}\n", article.authors.join(", ")));
    }
    if let Some(published) = &article.published {
        out.push_str(&format!("Publication Date: {}\n", published));
    }
    out.push_str(&format!("Source URL: {}\n\n", url));
    out.push_str(&article.body);
    truncate_output(&out, MAX_PAGE_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpConfig;

    const SEARCH_PAGE: &str = r#"<html><body>
        <div class="result results_links result--ad">
          <a class="result__a" href="https://ads.example.com/buy">Buy now</a>
        </div>
        <div class="result results_links">
          <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust-lang.org%2Flearn&amp;rut=abc">Learn <b>Rust</b></a>
          <a class="result__snippet">A language empowering   everyone.</a>
        </div>
        <div class="result results_links">
          <a class="result__a" href="https://doc.rust-lang.org/book/">The Book</a>
        </div>
        <div class="result"><a class="result__a" href="/relative">Skip me</a></div>
    </body></html>"#;

    fn offline_http() -> Arc<HttpClient> {
        Arc::new(HttpClient::new(HttpConfig::new().impolite()).unwrap())
    }

    #[test]
    fn test_parse_search_results() {
        let results = parse_search_results(SEARCH_PAGE);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Learn Rust");
        assert_eq!(results[0].url, "https://www.rust-lang.org/learn");
        assert_eq!(results[0].snippet, "A language empowering everyone.");
        assert_eq!(results[1].url, "https://doc.rust-lang.org/book/");
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn test_format_search_results() {
        let text = format_search_results(&parse_search_results(SEARCH_PAGE));
        assert!(text.starts_with(
            "1. Learn Rust\n   URL: https://www.rust-lang.org/learn\n   Snippet: A language"
        ));
        assert!(text.contains("2. The Book\n"));
    }

    #[test]
    fn test_scrape_html() {
        let html = "<html><body><nav>Menu</nav><h1>Heading</h1><p>Body text</p></body></html>";
        let text = scrape_html("https://example.com", html);
        assert_eq!(text, "Source URL: https://example.com\n\nHeading\nBody text");
    }

    #[test]
    fn test_scrape_html_truncates() {
        let long = "word ".repeat(5_000);
        let html = format!("<html><body><p>{}</p></body></html>", long);
        let text = scrape_html("https://example.com", &html);
        assert!(text.ends_with("...[truncated]"));
        assert_eq!(
            text.chars().count(),
            MAX_PAGE_CHARS + "...[truncated]".len()
        );
    }

    #[test]
    fn test_parse_article_metadata() {
        let html = r#"<html><head>
            <title>Fallback title</title>
            <meta property="og:title" content="Real Title">
            <meta name="author" content="Ada Lovelace">
            <meta property="article:author" content="Charles Babbage">
            <meta property="article:published_time" content="2024-03-01T10:00:00Z">
        </head><body><article><p>First paragraph.</p><p></p><p>Second.</p></article></body></html>"#;

        let article = parse_article(html);
        assert_eq!(article.title.as_deref(), Some("Real Title"));
        assert_eq!(article.authors, vec!["Ada Lovelace", "Charles Babbage"]);
        assert_eq!(article.published.as_deref(), Some("2024-03-01T10:00:00Z"));
        assert_eq!(article.body, "First paragraph.\n\nSecond.");

        let rendered = render_article("https://example.com/a", html);
        assert!(rendered.starts_with(
            "Title: Real Title\nAuthors: Ada Lovelace, Charles Babbage\nPublication Date: 2024-03-01T10:00:00Z\nSource URL: https://example.com/a\n\nFirst paragraph."
        ));
    }

    #[test]
    fn test_render_article_falls_back_to_scrape() {
        let html = "<html><head><title>T</title></head><body><div>Just a div</div></body></html>";
        let rendered = render_article("https://example.com", html);
        assert_eq!(rendered, "Source URL: https://example.com\n\nJust a div");
    }

    #[tokio::test]
    async fn test_scrape_invalid_url_is_soft_error() {
        let tool = ScrapeWebpageTool::new(offline_http());
        let output = tool.invoke("not a url").await;
        assert!(output.is_error);
        assert!(output.content.starts_with("Error scraping webpage not a url:"));
    }

    #[tokio::test]
    async fn test_article_unreachable_is_soft_error() {
        let tool = ExtractArticleTool::new(offline_http());
        let output = tool.invoke("http://127.0.0.1:1/post").await;
        assert!(output.is_error);
        assert!(output
            .content
            .starts_with("Error extracting article content from http://127.0.0.1:1/post"));
    }

    #[tokio::test]
    async fn test_search_unreachable_is_soft_error() {
        let tool = SearchWebTool::new(offline_http()).with_endpoint("http://127.0.0.1:1/html/");
        let output = tool.invoke("rust").await;
        assert!(output.is_error);
        assert!(output.content.starts_with("Error during web search:"));
    }
}
