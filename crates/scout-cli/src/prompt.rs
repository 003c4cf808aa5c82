//! Operator prompts: the research query and the save flow.

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

pub const QUERY_PROMPT: &str = "What can I help you research? ";

/// Reads operator input with rustyline. Without an editor nothing is read:
/// confirmations take `assume_yes` and filenames take their defaults.
pub struct Prompter {
    editor: Option<DefaultEditor>,
    assume_yes: bool,
    /// Save target used instead of asking for a filename.
    output: Option<String>,
}

impl Prompter {
    pub fn interactive(assume_yes: bool, output: Option<String>) -> Result<Self> {
        Ok(Self {
            editor: Some(DefaultEditor::new()?),
            assume_yes,
            output,
        })
    }

    pub fn unattended(assume_yes: bool, output: Option<String>) -> Self {
        Self {
            editor: None,
            assume_yes,
            output,
        }
    }

    /// `None` on end of input or interrupt.
    pub fn read_query(&mut self) -> Result<Option<String>> {
        loop {
            match self.read_line(QUERY_PROMPT)? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    if let Some(editor) = self.editor.as_mut() {
                        let _ = editor.add_history_entry(line.trim());
                    }
                    return Ok(Some(line.trim().to_string()));
                }
            }
        }
    }

    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        if self.assume_yes || self.editor.is_none() {
            return Ok(self.assume_yes);
        }
        Ok(self
            .read_line(&format!("{} (y/n): ", question))?
            .is_some_and(|answer| is_yes(&answer)))
    }

    pub fn filename(&mut self, default: &str) -> Result<String> {
        if let Some(output) = &self.output {
            return Ok(output.clone());
        }
        if self.assume_yes || self.editor.is_none() {
            return Ok(default.to_string());
        }
        let answer = self.read_line(&format!("Enter filename (default: {}): ", default))?;
        Ok(or_default(answer.as_deref(), default))
    }

    fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        let Some(editor) = self.editor.as_mut() else {
            return Ok(None);
        };
        match editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

fn or_default(answer: Option<&str>, default: &str) -> String {
    match answer.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes(" Y \n"));
        assert!(!is_yes("yes"));
        assert!(!is_yes("n"));
        assert!(!is_yes(""));
    }

    #[test]
    fn test_or_default() {
        assert_eq!(or_default(Some("notes.json"), "research_output.json"), "notes.json");
        assert_eq!(or_default(Some("   "), "research_output.json"), "research_output.json");
        assert_eq!(or_default(None, "raw_response.txt"), "raw_response.txt");
    }

    #[test]
    fn test_unattended_answers() {
        let mut prompter = Prompter::unattended(false, None);
        assert!(!prompter.confirm("Save?").unwrap());

        let mut prompter = Prompter::unattended(true, None);
        assert!(prompter.confirm("Save?").unwrap());
        assert_eq!(prompter.filename("research_output.json").unwrap(), "research_output.json");
        assert_eq!(prompter.read_query().unwrap(), None);

        let mut prompter = Prompter::unattended(true, Some("out.json".to_string()));
        assert_eq!(prompter.filename("research_output.json").unwrap(), "out.json");
    }
}
