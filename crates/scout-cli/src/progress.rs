use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::ExecutableCommand;

use scout_core::{ProgressEvent, ProgressHandler};

use crate::run_log::RunLog;

/// Characters of tool input shown in verbose output.
const INPUT_PREVIEW_CHARS: usize = 80;

/// Forwards executor events to the run log and, when verbose, to stderr.
pub struct CliProgress {
    log: Option<Arc<RunLog>>,
    verbose: bool,
}

impl CliProgress {
    pub fn new(log: Option<Arc<RunLog>>, verbose: bool) -> Self {
        Self { log, verbose }
    }

    /// Whether attaching this handler would have any effect.
    pub fn is_active(&self) -> bool {
        self.verbose || self.log.is_some()
    }
}

#[async_trait]
impl ProgressHandler for CliProgress {
    async fn on_progress(&self, event: ProgressEvent) {
        if let Some(log) = &self.log {
            log.log_progress(&event);
        }
        if self.verbose {
            let _ = print_event(&event);
        }
    }
}

fn print_event(event: &ProgressEvent) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    match event {
        ProgressEvent::IterationStart {
            iteration,
            max_iterations,
        } => {
            stderr.execute(SetForegroundColor(Color::DarkGrey))?;
            eprintln!("[step {}/{}]", iteration, max_iterations);
        }
        ProgressEvent::ToolStart { tool_name, input } => {
            stderr.execute(SetForegroundColor(Color::DarkGrey))?;
            eprint!("▶ ");
            stderr.execute(SetForegroundColor(Color::Yellow))?;
            eprint!("{}", tool_name);
            stderr.execute(SetForegroundColor(Color::DarkGrey))?;
            eprintln!(" {}", preview(input));
        }
        ProgressEvent::ToolComplete {
            tool_name,
            is_error,
            output_len,
        } => {
            if *is_error {
                stderr.execute(SetForegroundColor(Color::Red))?;
                eprintln!("  {} failed", tool_name);
            } else {
                stderr.execute(SetForegroundColor(Color::DarkGrey))?;
                eprintln!("  {} returned {} chars", tool_name, output_len);
            }
        }
        ProgressEvent::Correction { message } => {
            stderr.execute(SetForegroundColor(Color::Magenta))?;
            eprintln!("  correction: {}", message);
        }
        ProgressEvent::UsageUpdate { .. } => return Ok(()),
        ProgressEvent::Stopped { reason, iterations } => {
            stderr.execute(SetForegroundColor(Color::DarkGrey))?;
            eprintln!("[stopped: {} after {} steps]", reason, iterations);
        }
    }
    stderr.execute(ResetColor)?;
    stderr.flush()
}

fn preview(input: &str) -> String {
    let single_line = input.replace('\n', " ");
    if single_line.chars().count() > INPUT_PREVIEW_CHARS {
        let head: String = single_line.chars().take(INPUT_PREVIEW_CHARS).collect();
        format!("{}…", head)
    } else {
        single_line
    }
}
