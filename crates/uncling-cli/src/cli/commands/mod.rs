//! CLI command handlers.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

pub mod config;
pub mod features;
pub mod session;

/// Prints `prompt` and reads one trimmed line. `None` at end of input.
pub(crate) fn read_line(prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush().context("flush stdout")?;

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read stdin")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}
