use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::Config;

const CONFIG_TEMPLATE: &str = r#"# scout configuration
#
# The Gemini API key is read from GEMINI_API_KEY by default.
# You can also set it directly in this file (not recommended).
#
# Any value can be overridden from the environment with the SCOUT_ prefix,
# using __ between section and key, e.g. SCOUT_AGENT__MAX_ITERATIONS=20

# ── Provider ─────────────────────────────────────────────────────
[provider]
# api_key = "AIza..."               # or set GEMINI_API_KEY env var
# base_url = "https://generativelanguage.googleapis.com/v1beta"
model = "gemini-1.5-pro"
temperature = 0.3
max_tokens = 4096

# ── Agent budgets ────────────────────────────────────────────────
[agent]
max_iterations = 15
max_execution_time_secs = 300
# "generate" asks the model for a final answer when a budget runs out,
# "force" stops with a fixed message.
early_stopping = "generate"
# Seconds allowed for that last request.
final_answer_timeout_secs = 30

# ── Tools ────────────────────────────────────────────────────────
[tools]
# Politeness delay before every outbound request: min_delay_ms plus a
# random amount up to jitter_ms.
min_delay_ms = 1000
jitter_ms = 1000
request_timeout_secs = 15
text_log = "research_output.txt"
json_store = "research_output.json"
# user_agent = "Mozilla/5.0 ..."
"#;

pub fn run() -> Result<()> {
    let config_dir = Config::config_dir()?;
    let config_path = config_dir.join("config.toml");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

    if config_path.exists() {
        println!("Existing config file found:");
        println!("  {}", config_path.display());
        print!("\nOverwrite? (The existing file will be backed up) [y/N] ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Setup cancelled.");
            return Ok(());
        }

        let backup = backup_file(&config_path)?;
        println!("  Backed up to {}", backup.display());
    }

    write_template(&config_path)?;
    println!("Created {}", config_path.display());

    println!("\nNext steps:");
    println!("  1. Set your API key:  export GEMINI_API_KEY=\"AIza...\"");
    println!("  2. Start researching: scout");
    println!("  3. Or run a query:    scout -q \"history of the transistor\"");

    Ok(())
}

fn write_template(path: &Path) -> Result<()> {
    std::fs::write(path, CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Move a file to `<name>.bak`, adding a timestamp if that backup already exists.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let mut backup = path.with_extension("toml.bak");

    if backup.exists() {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        backup = path.with_extension(format!("toml.bak.{}", timestamp));
    }

    std::fs::rename(path, &backup)
        .with_context(|| format!("Failed to back up {} to {}", path.display(), backup.display()))?;

    Ok(backup)
}
