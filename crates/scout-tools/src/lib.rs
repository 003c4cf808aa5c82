//! scout-tools: research tools for scout
//!
//! This crate provides the tools available to the research agent:
//! - Web: search, page scraping, article extraction, multi-source research
//! - Academic: arXiv search and PDF text extraction
//! - Wikipedia: background lookups
//! - Persistence: text log and JSON store

pub mod academic;
mod html;
pub mod http;
pub mod pdf;
pub mod persist;
pub mod research;
pub mod web;
pub mod wikipedia;

use std::sync::Arc;

use scout_core::{Error, Tool, ToolRegistry};

pub use academic::SearchAcademicPapersTool;
pub use http::{truncate_output, HttpClient, HttpConfig};
pub use pdf::ExtractPdfTool;
pub use persist::{JsonStore, PersistConfig, SaveJsonTool, SaveTextTool, TextLog};
pub use research::ResearchTopicTool;
pub use web::{ExtractArticleTool, ScrapeWebpageTool, SearchWebTool};
pub use wikipedia::WikipediaSearchTool;

/// Create every research tool, in priority order.
pub fn create_research_tools(
    http: HttpConfig,
    persist: PersistConfig,
) -> Result<Vec<Arc<dyn Tool>>, Error> {
    let http = Arc::new(HttpClient::new(http)?);
    let search = Arc::new(SearchWebTool::new(http.clone()));
    let article = Arc::new(ExtractArticleTool::new(http.clone()));

    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(ResearchTopicTool::new(search.clone(), article.clone())),
        search as Arc<dyn Tool>,
        article as Arc<dyn Tool>,
        Arc::new(ScrapeWebpageTool::new(http.clone())),
        Arc::new(SearchAcademicPapersTool::new(http.clone())),
        Arc::new(ExtractPdfTool::new(http.clone())),
        Arc::new(WikipediaSearchTool::new(http)),
        Arc::new(SaveTextTool::new(TextLog::new(persist.text_log))),
        Arc::new(SaveJsonTool::new(JsonStore::new(persist.json_store))),
    ];
    Ok(tools)
}

/// Registry holding every research tool, in priority order.
pub fn create_research_registry(
    http: HttpConfig,
    persist: PersistConfig,
) -> Result<ToolRegistry, Error> {
    let mut registry = ToolRegistry::new();
    for tool in create_research_tools(http, persist)? {
        registry.register(tool)?;
    }
    Ok(registry)
}
