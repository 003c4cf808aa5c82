//! arXiv paper search over the Atom export API.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use scout_core::{Error, Tool, ToolOutput};

use crate::html::collapse_whitespace;
use crate::http::HttpClient;

pub const ARXIV_API_URL: &str = "https://export.arxiv.org/api/query";

const DEFAULT_MAX_PAPERS: usize = 5;
const SUMMARY_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    published: String,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@title", default)]
    title: Option<String>,
    #[serde(rename = "@type", default)]
    link_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paper {
    pub title: String,
    pub authors: Vec<String>,
    /// `YYYY-MM-DD`
    pub published: String,
    pub pdf_url: String,
    pub summary: String,
}

impl From<AtomEntry> for Paper {
    fn from(entry: AtomEntry) -> Self {
        let pdf_url = entry
            .links
            .iter()
            .find(|l| l.title.as_deref() == Some("pdf"))
            .or_else(|| {
                entry
                    .links
                    .iter()
                    .find(|l| l.link_type.as_deref() == Some("application/pdf"))
            })
            .map(|l| l.href.clone())
            .unwrap_or_else(|| entry.id.replacen("/abs/", "/pdf/", 1));

        let summary = collapse_whitespace(&entry.summary);
        let summary = match summary.char_indices().nth(SUMMARY_CHARS) {
            Some((idx, _)) => format!("{}...", &summary[..idx]),
            None => summary,
        };

        Paper {
            title: collapse_whitespace(&entry.title),
            authors: entry.authors.into_iter().map(|a| a.name.trim().to_string()).collect(),
            published: entry.published.chars().take(10).collect(),
            pdf_url,
            summary,
        }
    }
}

pub fn parse_feed(xml: &str) -> Result<Vec<Paper>, Error> {
    let feed: AtomFeed = quick_xml::de::from_str(xml)
        .map_err(|e| Error::serialization(format!("invalid arXiv feed: {}", e)))?;
    Ok(feed.entries.into_iter().map(Paper::from).collect())
}

pub fn format_papers(papers: &[Paper]) -> String {
    let mut out = String::from("ArXiv Research Results:\n\n");
    for (i, paper) in papers.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, paper.title));
        out.push_str(&format!("   Authors: {}\n", paper.authors.join(", ")));
        out.push_str(&format!("   Published: {}\n", paper.published));
        out.push_str(&format!("   URL: {}\n", paper.pdf_url));
        out.push_str(&format!("   Summary: {}\n\n", paper.summary));
    }
    out
}

pub struct SearchAcademicPapersTool {
    http: Arc<HttpClient>,
    endpoint: String,
    max_results: usize,
}

impl SearchAcademicPapersTool {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            endpoint: ARXIV_API_URL.to_string(),
            max_results: DEFAULT_MAX_PAPERS,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn search(&self, query: &str) -> Result<Vec<Paper>, Error> {
        let url = format!(
            "{}?search_query={}&start=0&max_results={}&sortBy=relevance&sortOrder=descending",
            self.endpoint,
            urlencoding::encode(&format!("all:{}", query)),
            self.max_results
        );
        let xml = self.http.get_text(&url).await?;
        let papers = parse_feed(&xml)?;
        debug!(query, papers = papers.len(), "arXiv search complete");
        Ok(papers)
    }
}

#[async_trait]
impl Tool for SearchAcademicPapersTool {
    fn name(&self) -> &str {
        "search_academic_papers"
    }

    fn description(&self) -> &str {
        "Search for academic papers on arXiv."
    }

    fn input_description(&self) -> &str {
        "The search query for papers"
    }

    async fn invoke(&self, input: &str) -> ToolOutput {
        match self.search(input.trim()).await {
            Ok(papers) if papers.is_empty() => {
                ToolOutput::success(format!("No papers found on arXiv for '{}'.", input.trim()))
            }
            Ok(papers) => ToolOutput::success(format_papers(&papers)),
            Err(e) => ToolOutput::error(format!("Error searching arXiv: {}", e)),
        }
    }
}
