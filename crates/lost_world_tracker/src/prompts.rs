use std::io::{self, Write};

use anyhow::{Context, Result};

pub fn prompt_input(message: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{message}: ")?;
    stdout.flush().context("failed to flush prompt")?;
    let mut buffer = String::new();
    io::stdin()
        .read_line(&mut buffer)
        .context("failed to read input")?;
    Ok(buffer.trim().to_string())
}

pub fn pause_with_message(message: &str) -> Result<()> {
    println!("{message}");
    io::stdout().flush().ok();
    let mut buffer = String::new();
    io::stdin().read_line(&mut buffer).ok();
    Ok(())
}
