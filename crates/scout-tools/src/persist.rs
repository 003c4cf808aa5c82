//! File persistence: an append-only text log and an append-only JSON array.
//!
//! Both are best-effort single-writer stores. Concurrent writers to the same
//! path are not coordinated.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use scout_core::{Error, Tool, ToolOutput};

pub const DEFAULT_TEXT_LOG: &str = "research_output.txt";
pub const DEFAULT_JSON_STORE: &str = "research_output.json";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Where the save tools write.
#[derive(Debug, Clone)]
pub struct PersistConfig {
    pub text_log: PathBuf,
    pub json_store: PathBuf,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            text_log: PathBuf::from(DEFAULT_TEXT_LOG),
            json_store: PathBuf::from(DEFAULT_JSON_STORE),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextLog {
    path: PathBuf,
}

impl TextLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped block.
    pub fn append(&self, data: &str) -> Result<(), Error> {
        let block = format!(
            "--- Research Output ---\nTimestamp: {}\n\n{}\n\n",
            timestamp(),
            data
        );
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(block.as_bytes())?;
        debug!(path = %self.path.display(), bytes = block.len(), "Appended to text log");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current records. A missing or unreadable file reads as empty; a
    /// non-array document becomes the first record.
    pub fn read(&self) -> Vec<Value> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(records)) => records,
            Ok(other) => vec![other],
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "JSON store is corrupt, starting over");
                Vec::new()
            }
        }
    }

    /// Append a record with an added `timestamp` and rewrite the file.
    pub fn append(&self, record: Map<String, Value>) -> Result<(), Error> {
        let mut record = record;
        record.insert("timestamp".to_string(), Value::String(timestamp()));

        let mut records = self.read();
        records.push(Value::Object(record));

        let content = serde_json::to_string_pretty(&Value::Array(records))?;
        fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), "Appended to JSON store");
        Ok(())
    }
}

/// Parse tool input for the JSON store: objects are kept, other JSON values
/// are wrapped as `{"data": value}`.
pub fn json_record(input: &str) -> Result<Map<String, Value>, Error> {
    match serde_json::from_str::<Value>(input.trim())? {
        Value::Object(map) => Ok(map),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            Ok(map)
        }
    }
}

pub struct SaveTextTool {
    log: TextLog,
}

impl SaveTextTool {
    pub fn new(log: TextLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl Tool for SaveTextTool {
    fn name(&self) -> &str {
        "save_text_to_file"
    }

    fn description(&self) -> &str {
        "Saves structured research data to a text file."
    }

    fn input_description(&self) -> &str {
        "The text to save"
    }

    async fn invoke(&self, input: &str) -> ToolOutput {
        match self.log.append(input) {
            Ok(()) => ToolOutput::success(format!(
                "Data successfully saved to {}",
                self.log.path().display()
            )),
            Err(e) => ToolOutput::error(format!(
                "Error saving to {}: {}",
                self.log.path().display(),
                e
            )),
        }
    }
}

pub struct SaveJsonTool {
    store: JsonStore,
}

impl SaveJsonTool {
    pub fn new(store: JsonStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SaveJsonTool {
    fn name(&self) -> &str {
        "save_json_to_file"
    }

    fn description(&self) -> &str {
        "Saves structured research data to a JSON file."
    }

    fn input_description(&self) -> &str {
        "A JSON object with the research data"
    }

    async fn invoke(&self, input: &str) -> ToolOutput {
        let result = json_record(input).and_then(|record| self.store.append(record));
        match result {
            Ok(()) => ToolOutput::success(format!(
                "Data successfully saved to {}",
                self.store.path().display()
            )),
            Err(e) => ToolOutput::error(format!(
                "Error saving to {}: {}",
                self.store.path().display(),
                e
            )),
        }
    }
}
