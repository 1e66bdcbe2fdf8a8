//! Command-line interface for tunebot.
//!
//! `serve` runs the webhook bot; `fetch` runs the acquisition pipeline
//! once from the terminal, which is handy for debugging an extraction
//! problem without a Telegram round trip.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::Config;
use crate::pipeline::{self, YtDlpEngine};
use crate::progress;
use crate::server;
use crate::workspace::{workspace_key, WorkspaceManager};
use crate::Bot;

/// tunebot - Telegram bot that turns media links into tagged MP3s
#[derive(Parser, Debug)]
#[command(name = "tunebot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the webhook server
    Serve,

    /// Fetch a single URL into a local staging directory
    Fetch {
        /// Media URL to fetch
        url: String,

        /// Staging directory root
        #[arg(short, long, default_value = "./staging")]
        staging: PathBuf,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve => serve().await,
            Commands::Fetch { url, staging } => fetch(&url, staging).await,
        }
    }
}

async fn serve() -> Result<()> {
    let config = Config::from_env()?;
    let bot = Bot::new(&config, Arc::new(YtDlpEngine::new()));
    server::run(&config, bot).await
}

async fn fetch(url: &str, staging: PathBuf) -> Result<()> {
    let engine = YtDlpEngine::new();
    let http = reqwest::Client::new();

    let manager = WorkspaceManager::new(staging);
    let key = workspace_key(0, url);
    let workspace = manager
        .prepare(&key)
        .await
        .context("workspace preparation failed")?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{}", strip_html(&progress::render(&event)));
        }
    });

    let artifact = pipeline::acquire(&engine, &http, url, &workspace, tx).await?;
    let _ = printer.await;

    info!(
        file = %artifact.path.display(),
        bitrate_kbps = artifact.bitrate_kbps,
        duration = ?artifact.duration,
        "fetch complete"
    );
    println!("{}", artifact.path.display());

    Ok(())
}

/// Progress strings are rendered as Telegram HTML; drop the tags for
/// terminal output.
fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<i>Uploading the file...</i>"), "Uploading the file...");
        assert_eq!(strip_html("<b>Status:</b> downloading"), "Status: downloading");
        assert_eq!(strip_html("plain"), "plain");
    }
}
