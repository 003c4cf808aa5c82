use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scout_agents::{run_research, ResearcherAgent, RunOutcome};
use scout_core::{AgentExecutor, EarlyStopping, Provider, ToolRegistry};
use scout_providers::GeminiProvider;

mod config;
mod progress;
mod prompt;
mod report;
mod run_log;
mod save;
mod setup;

use config::Config;
use progress::CliProgress;
use prompt::Prompter;
use run_log::RunLog;

/// Log level for tracing output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Most verbose: request and tool payloads
    Trace,
    /// Verbose: every iteration and tool call
    Debug,
    /// Standard: run completion and recovered results
    Info,
    /// Quiet: only warnings and errors
    Warn,
    /// Minimal: only errors
    Error,
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser)]
#[command(name = "scout")]
#[command(author, version, about = "Scout: a research agent for the command line", long_about = None)]
pub struct Cli {
    /// Research this query and exit (prompts for one otherwise)
    #[arg(short, long)]
    pub query: Option<String>,

    /// Model to use (overrides config)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Temperature (0.0-2.0)
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate per reply
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Maximum tool-calling steps per run
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Wall-clock budget per run, in seconds
    #[arg(long, value_name = "SECS")]
    pub max_execution_time: Option<u64>,

    /// What to do when a budget runs out (generate, force)
    #[arg(long)]
    pub early_stopping: Option<EarlyStopping>,

    /// Save results without asking
    #[arg(short, long)]
    pub yes: bool,

    /// File to save results to (skips the filename prompt)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Print the outcome as JSON instead of the report
    #[arg(long)]
    pub json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Enable debug logging (shorthand for --log-level debug)
    #[arg(short, long)]
    pub debug: bool,

    /// Write tracing output and run events to file (JSON-lines format)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Print each step and tool call to stderr
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Config,
    /// List research tools in priority order
    Tools,
    /// Initialize the configuration file in ~/.config/scout
    Setup,
}

impl Cli {
    /// CLI flags take precedence over every other configuration layer.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.provider.model = model.clone();
        }
        if let Some(temperature) = self.temperature {
            config.provider.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.provider.max_tokens = max_tokens;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.agent.max_iterations = max_iterations;
        }
        if let Some(secs) = self.max_execution_time {
            config.agent.max_execution_time_secs = secs;
        }
        if let Some(early_stopping) = self.early_stopping {
            config.agent.early_stopping = early_stopping;
        }
    }

    fn log_level(&self) -> LogLevel {
        if self.debug {
            LogLevel::Debug
        } else {
            self.log_level
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // One append-mode handle shared by the tracing layer and the run log.
    let log_file = match &cli.log_file {
        Some(path) => Some(
            run_log::open_shared(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?,
        ),
        None => None,
    };
    init_tracing(&cli, log_file.clone());

    // Handle setup before config is required
    if matches!(&cli.command, Some(Commands::Setup)) {
        return setup::run();
    }

    let mut config = Config::load()?;
    cli.apply_overrides(&mut config);

    match &cli.command {
        Some(Commands::Config) => show_config(&config),
        Some(Commands::Tools) => list_tools(&config),
        Some(Commands::Setup) => Ok(()),
        None => research_mode(&cli, &config, log_file).await,
    }
}

fn init_tracing(cli: &Cli, log_file: Option<Arc<File>>) {
    let filter = EnvFilter::new(cli.log_level().as_filter());

    if let Some(file) = log_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn build_registry(config: &Config) -> Result<Arc<ToolRegistry>> {
    let registry = scout_tools::create_research_registry(config.http_config(), config.persist_config())
        .context("Failed to register research tools")?;

    let missing = ResearcherAgent::new().missing_tools(&registry);
    if !missing.is_empty() {
        tracing::warn!(tools = ?missing, "Research tools missing from registry");
    }

    Ok(Arc::new(registry))
}

fn create_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    let mut provider =
        GeminiProvider::new(config.api_key()?)?.with_default_model(config.provider.model.clone());
    if let Some(base_url) = &config.provider.base_url {
        provider = provider.with_base_url(base_url.clone());
    }
    Ok(Arc::new(provider))
}

async fn research_mode(cli: &Cli, config: &Config, log_file: Option<Arc<File>>) -> Result<()> {
    let provider = create_provider(config)?;
    let registry = build_registry(config)?;

    let run_log = log_file.map(|file| Arc::new(RunLog::with_file(file)));

    let mut executor = AgentExecutor::new(provider, Arc::clone(&registry), config.executor_config());
    let progress = CliProgress::new(run_log.clone(), cli.verbose);
    if progress.is_active() {
        executor = executor.with_progress(Arc::new(progress));
    }

    let (mut prompter, query) = match &cli.query {
        Some(query) => (
            Prompter::unattended(cli.yes, cli.output.clone()),
            query.clone(),
        ),
        None => {
            let mut prompter = Prompter::interactive(cli.yes, cli.output.clone())?;
            match prompter.read_query()? {
                Some(query) => (prompter, query),
                None => return Ok(()),
            }
        }
    };

    if let Some(log) = &run_log {
        log.log_run_start(&query, Some(&config.provider.model), registry.len());
    }

    report::print_status(
        "\nResearching your topic using multiple web sources. This may take a few minutes...\n",
    )?;
    let start = Instant::now();
    let run = run_research(&executor, &query).await;
    println!("\nResearch completed in {:.2} seconds", start.elapsed().as_secs_f64());

    if let Some(log) = &run_log {
        log.log_run_end(&run);
    }
    if let Some(finish) = &run.finish {
        tracing::info!(
            stop_reason = ?finish.stop_reason,
            iterations = finish.iterations,
            elapsed_ms = finish.elapsed.as_millis() as u64,
            "Research run finished"
        );
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&run.outcome.to_json())?);
    }

    // Failures past this point are reported, not propagated.
    let saved = match &run.outcome {
        RunOutcome::Success(result) => {
            if !cli.json {
                report::print_report(result);
            }
            save::offer_result_save(&mut prompter, result)
                .map(|path| path.map(|p| format!("Results saved to {}", p)))
        }
        RunOutcome::ParseFailure { raw_text, reason } => {
            if !cli.json {
                report::print_raw_fallback(raw_text, reason)?;
            }
            save::offer_raw_save(&mut prompter, raw_text)
                .map(|path| path.map(|p| format!("Raw response saved to {}", p)))
        }
        RunOutcome::ExecutionFailure { error } => {
            report::print_error(error)?;
            Ok(None)
        }
    };

    match saved {
        Ok(Some(message)) => println!("{}", message),
        Ok(None) => {}
        Err(e) => report::print_error(&format!("{:#}", e))?,
    }

    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    println!("Configuration:");
    println!("  File: {}", Config::config_path()?.display());

    println!("\nProvider:");
    println!("  API key: {}", config.masked_api_key());
    if let Some(base_url) = &config.provider.base_url {
        println!("  Base URL: {}", base_url);
    }
    println!("  Model: {}", config.provider.model);
    println!("  Temperature: {}", config.provider.temperature);
    println!("  Max tokens: {}", config.provider.max_tokens);

    println!("\nAgent:");
    println!("  Max iterations: {}", config.agent.max_iterations);
    println!(
        "  Max execution time: {:?}",
        Duration::from_secs(config.agent.max_execution_time_secs)
    );
    println!("  Early stopping: {}", config.agent.early_stopping);
    println!(
        "  Final answer timeout: {:?}",
        Duration::from_secs(config.agent.final_answer_timeout_secs)
    );

    println!("\nTools:");
    println!(
        "  Request delay: {}ms + up to {}ms",
        config.tools.min_delay_ms, config.tools.jitter_ms
    );
    println!("  Request timeout: {}s", config.tools.request_timeout_secs);
    println!("  Text log: {}", config.tools.text_log);
    println!("  JSON store: {}", config.tools.json_store);
    if let Some(agent) = &config.tools.user_agent {
        println!("  User agent: {}", agent);
    }

    Ok(())
}

fn list_tools(config: &Config) -> Result<()> {
    let registry = build_registry(config)?;

    report::print_section_header("Research tools")?;
    for (i, tool) in registry.iter().enumerate() {
        println!("{}. {}", i + 1, tool.name());
        println!("   {}", tool.description());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::try_parse_from([
            "scout",
            "-q",
            "graphene",
            "-m",
            "gemini-2.0-flash",
            "--max-iterations",
            "3",
            "--max-execution-time",
            "60",
            "--early-stopping",
            "force",
        ])
        .unwrap();

        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(cli.query.as_deref(), Some("graphene"));
        assert_eq!(config.provider.model, "gemini-2.0-flash");
        assert_eq!(config.agent.max_iterations, 3);
        assert_eq!(config.agent.max_execution_time_secs, 60);
        assert_eq!(config.agent.early_stopping, EarlyStopping::Force);
        assert_eq!(config.provider.temperature, 0.3);
    }

    #[test]
    fn test_bad_early_stopping_rejected() {
        assert!(Cli::try_parse_from(["scout", "--early-stopping", "later"]).is_err());
    }

    #[test]
    fn test_debug_flag_wins() {
        let cli = Cli::try_parse_from(["scout", "--log-level", "error", "-d"]).unwrap();
        assert_eq!(cli.log_level(), LogLevel::Debug);

        let cli = Cli::try_parse_from(["scout"]).unwrap();
        assert_eq!(cli.log_level(), LogLevel::Warn);
        assert!(!cli.yes && !cli.json && !cli.verbose);
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::try_parse_from(["scout", "tools"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Tools)));
        let cli = Cli::try_parse_from(["scout", "config"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Config)));
    }
}
