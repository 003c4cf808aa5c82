//! Terminal rendering of research outcomes.

use std::io::Write;

use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::terminal::size;
use crossterm::ExecutableCommand;

use scout_agents::ResearchResult;

/// Characters of raw output shown when no result could be recovered.
pub const RAW_PREVIEW_CHARS: usize = 500;

const RULE_WIDTH: usize = 50;

/// The plain-text report for a recovered result.
pub fn render_report(result: &ResearchResult) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    out.push_str(&format!("{}\nRESEARCH RESULTS: {}\n{}\n", rule, result.topic, rule));
    out.push_str(&format!("\nSUMMARY:\n{}\n", result.summary));

    if !result.key_points.is_empty() {
        out.push_str("\nKEY POINTS:\n");
        for (i, point) in result.key_points.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, point));
        }
    }

    if !result.sources.is_empty() {
        out.push_str("\nSOURCES:\n");
        for (i, source) in result.sources.iter().enumerate() {
            if source.url.is_empty() {
                out.push_str(&format!("{}. {}\n", i + 1, source.title));
            } else {
                out.push_str(&format!("{}. {}: {}\n", i + 1, source.title, source.url));
            }
        }
    }

    if !result.tools_used.is_empty() {
        out.push_str("\nTOOLS USED:\n");
        for tool in &result.tools_used {
            out.push_str(&format!("- {}\n", tool));
        }
    }

    out
}

/// The first 500 characters of `text`, with `...` when cut.
pub fn raw_preview(text: &str) -> String {
    if text.chars().count() > RAW_PREVIEW_CHARS {
        let head: String = text.chars().take(RAW_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

pub fn print_report(result: &ResearchResult) {
    println!();
    print!("{}", render_report(result));
}

/// Print a parse failure: the reason, then a preview of the raw text.
pub fn print_raw_fallback(raw_text: &str, reason: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.execute(SetForegroundColor(Color::Yellow))?;
    println!("Could not parse the research result: {}", reason);
    stdout.execute(ResetColor)?;
    println!("Raw response:");
    println!("{}", raw_preview(raw_text));
    stdout.flush()
}

pub fn print_error(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    stderr.execute(SetForegroundColor(Color::Red))?;
    eprintln!("Error during research: {}", message);
    stderr.execute(ResetColor)?;
    stderr.flush()
}

/// Print a centered section header between rules.
pub fn print_section_header(title: &str) -> std::io::Result<()> {
    let width = size().map(|(w, _)| w as usize).unwrap_or(80);
    let title_len = title.len() + 2;
    let remaining = width.saturating_sub(title_len).saturating_sub(1);
    let left_len = remaining / 2;
    let right_len = remaining - left_len;

    let mut stdout = std::io::stdout();
    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
    print!("{} ", "─".repeat(left_len));
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    print!("{}", title);
    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
    println!(" {}", "─".repeat(right_len));
    stdout.execute(ResetColor)?;
    stdout.flush()
}

pub fn print_status(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.execute(SetForegroundColor(Color::DarkGrey))?;
    println!("{}", message);
    stdout.execute(ResetColor)?;
    stdout.flush()
}
