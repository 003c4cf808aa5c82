//! Research agent: prompt and tool priority.

use scout_core::{AgentExecutor, ToolRegistry};
use tracing::error;

use crate::outcome::{ResearchRun, RunOutcome};

/// Tool names in the order the agent should prefer them.
pub const TOOL_PRIORITY: &[&str] = &[
    "research_topic",
    "search_web",
    "extract_article",
    "scrape_webpage",
    "search_academic_papers",
    "extract_pdf",
    "wikipedia_search",
    "save_text_to_file",
    "save_json_to_file",
];

const SYSTEM_PROMPT: &str = r#"You are a research assistant that produces comprehensive, accurate and well-sourced answers.

## Research Guidelines
1. Prefer diverse web sources. Use Wikipedia only to fill in background.
2. Gather information from several websites, academic papers and specialized resources.
3. Use more than one tool so the topic is covered from different angles.
4. Synthesize what you find into one coherent picture instead of listing what each source said.
5. Record the title and URL of every source you rely on.
6. Stay objective and present competing viewpoints when they exist.

## Research Process
1. Start with `research_topic` to gather broad material from several sources at once.
2. Use `search_web` for specifics the first pass did not cover.
3. Use `extract_article` to read a promising article in depth, or `scrape_webpage` for other pages.
4. For academic topics, use `search_academic_papers`, then `extract_pdf` to read a paper.
5. Use `wikipedia_search` only as a supplementary source.
6. Every tool takes a single string argument named "input".

## Output Format
When you are done, reply with a single JSON object and nothing else:
{
    "topic": "The main research topic",
    "summary": "A comprehensive summary of the findings",
    "key_points": ["Key point 1", "Key point 2", "Key point 3"],
    "sources": [
        {"title": "Source title", "url": "https://example.com/source"}
    ],
    "tools_used": ["research_topic", "search_web"]
}"#;

pub struct ResearcherAgent;

impl ResearcherAgent {
    pub fn new() -> Self {
        Self
    }

    pub fn system_prompt(&self) -> &str {
        SYSTEM_PROMPT
    }

    /// Priority tools absent from `registry`.
    pub fn missing_tools(&self, registry: &ToolRegistry) -> Vec<&'static str> {
        TOOL_PRIORITY
            .iter()
            .copied()
            .filter(|name| !registry.contains(name))
            .collect()
    }

    /// Research one query end to end.
    pub async fn run(&self, executor: &AgentExecutor, query: &str) -> ResearchRun {
        match executor.run(self.system_prompt(), query).await {
            Ok(finish) => ResearchRun {
                outcome: RunOutcome::from_output(&finish.output),
                finish: Some(finish),
            },
            Err(e) => {
                error!(error = %e, "Research run failed");
                ResearchRun {
                    outcome: RunOutcome::ExecutionFailure {
                        error: e.to_string(),
                    },
                    finish: None,
                }
            }
        }
    }
}

impl Default for ResearcherAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_core::testing::EchoTool;
    use std::sync::Arc;

    #[test]
    fn test_prompt_mentions_every_research_tool() {
        let agent = ResearcherAgent::new();
        for name in TOOL_PRIORITY.iter().take(7) {
            assert!(
                agent.system_prompt().contains(name),
                "prompt does not mention {}",
                name
            );
        }
        assert!(agent.system_prompt().contains("\"tools_used\""));
    }

    #[test]
    fn test_missing_tools() {
        let agent = ResearcherAgent::new();
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        assert_eq!(agent.missing_tools(&registry).len(), TOOL_PRIORITY.len());
    }
}
