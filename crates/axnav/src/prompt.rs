//! Clarification answers typed at the terminal.

use axnav_engine::protocol::ClarificationAnswer;
use std::io::{self, Write};

/// Read one answer from stdin. `None` on end of input or an exit command.
pub fn read_answer() -> io::Result<Option<String>> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input = String::new();

    loop {
        print!("> ");
        stdout.flush()?;
        input.clear();
        if stdin.read_line(&mut input)? == 0 {
            return Ok(None);
        }

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "exit" || trimmed == "quit" {
            return Ok(None);
        }
        return Ok(Some(trimmed.to_string()));
    }
}

/// A bare number picks the option with that 1-based index; anything else
/// is free text for the engine to interpret.
pub fn parse_answer(input: &str) -> ClarificationAnswer {
    let input = input.trim();
    match input.parse::<usize>() {
        Ok(n) if n >= 1 => ClarificationAnswer::Option { index: n - 1 },
        _ => ClarificationAnswer::Text {
            text: input.to_string(),
        },
    }
}
