//! Saving a finished run to disk.

use anyhow::{Context, Result};
use serde_json::Value;

use scout_agents::ResearchResult;
use scout_tools::{JsonStore, TextLog};

use crate::config::expand_path;
use crate::prompt::Prompter;

pub const DEFAULT_RESULT_FILE: &str = "research_output.json";
pub const DEFAULT_RAW_FILE: &str = "raw_response.txt";

/// Append `result` to the JSON store at `path`.
pub fn save_result(path: &str, result: &ResearchResult) -> Result<()> {
    let Value::Object(record) = serde_json::to_value(result)? else {
        anyhow::bail!("research result did not serialize to an object");
    };
    JsonStore::new(expand_path(path))
        .append(record)
        .with_context(|| format!("Failed to save results to {}", path))
}

/// Append the raw model text to the text log at `path`.
pub fn save_raw(path: &str, raw_text: &str) -> Result<()> {
    TextLog::new(expand_path(path))
        .append(raw_text)
        .with_context(|| format!("Failed to save raw response to {}", path))
}

/// Offer to save a recovered result. Returns the path written, if any.
pub fn offer_result_save(prompter: &mut Prompter, result: &ResearchResult) -> Result<Option<String>> {
    if !prompter.confirm("\nWould you like to save these results to a JSON file?")? {
        return Ok(None);
    }
    let filename = prompter.filename(DEFAULT_RESULT_FILE)?;
    save_result(&filename, result)?;
    Ok(Some(filename))
}

/// Offer to save the raw text of an unparseable answer.
pub fn offer_raw_save(prompter: &mut Prompter, raw_text: &str) -> Result<Option<String>> {
    if !prompter.confirm("Would you like to save the raw response to a file?")? {
        return Ok(None);
    }
    let filename = prompter.filename(DEFAULT_RAW_FILE)?;
    save_raw(&filename, raw_text)?;
    Ok(Some(filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_agents::Source;

    fn sample() -> ResearchResult {
        ResearchResult {
            topic: "Tidal power".to_string(),
            summary: "Predictable but site-limited.".to_string(),
            key_points: vec!["Predictable".to_string()],
            sources: vec![Source::new("Survey", "https://example.com/tidal")],
            tools_used: vec!["search_web".to_string()],
        }
    }

    #[test]
    fn test_save_result_appends_with_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let path = path.to_str().unwrap();

        save_result(path, &sample()).unwrap();
        save_result(path, &sample()).unwrap();

        let stored: Vec<Value> =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(stored.len(), 2);

        let mut last = stored[1].as_object().unwrap().clone();
        assert!(last.remove("timestamp").is_some());
        let restored: ResearchResult = serde_json::from_value(Value::Object(last)).unwrap();
        assert_eq!(restored, sample());
    }

    #[test]
    fn test_offer_saves_when_assumed_yes() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("raw.txt").to_str().unwrap().to_string();

        let mut prompter = Prompter::unattended(true, Some(target.clone()));
        let saved = offer_raw_save(&mut prompter, "free-form answer").unwrap();
        assert_eq!(saved.as_deref(), Some(target.as_str()));

        let content = std::fs::read_to_string(&target).unwrap();
        assert!(content.starts_with("--- Research Output ---\nTimestamp: "));
        assert!(content.contains("\n\nfree-form answer\n\n"));
    }

    #[test]
    fn test_offer_declined_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.json").to_str().unwrap().to_string();

        let mut prompter = Prompter::unattended(false, Some(target.clone()));
        assert!(offer_result_save(&mut prompter, &sample()).unwrap().is_none());
        assert!(!std::path::Path::new(&target).exists());
    }
}
