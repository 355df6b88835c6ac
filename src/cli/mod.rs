//! Command implementations for the `seekchat` binary

pub mod chat;
pub mod conversation;
pub mod send;
pub mod template;
pub mod user;

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::credentials::KeyPrompt;
use crate::store::MessageRow;
use crate::types::Role;

/// Reads an API key from the terminal
pub struct StdinPrompt;

impl KeyPrompt for StdinPrompt {
    fn read_key(&self, prompt: &str) -> io::Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "{}", prompt)?;
        stderr.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default level
pub fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init()
        .context("error initializing logging")?;

    Ok(())
}

/// Print a message log the way the chat loop shows it
pub fn print_history(messages: &[MessageRow]) {
    if messages.is_empty() {
        println!("No messages yet.");
        return;
    }

    for msg in messages {
        match msg.role {
            Role::System => println!("System: {}", msg.content),
            Role::User => println!("User: {}", msg.content),
            Role::Assistant => {
                if let Some(reasoning) = &msg.reasoning_content {
                    println!("AI (reasoning): {}", reasoning);
                }
                println!("AI: {}", msg.content);
            }
        }
    }
}

/// Shorten a single-line display string to `max` characters
pub(crate) fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}
