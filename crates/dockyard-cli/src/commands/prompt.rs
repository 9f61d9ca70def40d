//! Interactive variable input on the terminal.

use dockyard_config::{ConfigResult, InputProvider, PromptParams};
use std::io::{BufRead, Write};

/// Asks on stderr and reads answers from stdin.
///
/// Answers are echoed. For password variables the default value is kept off
/// the screen and the question says the answer will be visible.
pub struct TerminalInput;

impl InputProvider for TerminalInput {
    fn prompt(&mut self, params: &PromptParams) -> ConfigResult<Option<String>> {
        let mut stderr = std::io::stderr().lock();
        if let Some(error) = &params.previous_error {
            writeln!(stderr, "  {}", error)?;
        }
        write!(stderr, "? {}", question_line(params))?;
        stderr.flush()?;

        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line)? == 0 {
            // stdin closed
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

fn question_line(params: &PromptParams) -> String {
    let mut line = params.question.clone();
    if !params.options.is_empty() {
        line.push_str(&format!(" [{}]", params.options.join("/")));
    }
    match &params.default_value {
        Some(default) if !params.is_password => line.push_str(&format!(" ({})", default)),
        _ => {}
    }
    if params.is_password {
        line.push_str(" (input is visible)");
    }
    line.push_str(": ");
    line
}
