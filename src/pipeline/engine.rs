//! yt-dlp invocation.
//!
//! Shells out to the yt-dlp binary twice per request: a metadata probe
//! (`-J`) and the actual download/transcode. Progress is read line by line
//! from stdout using `--progress-template` lines that carry the engine's
//! progress dict as JSON, one template per phase.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::ExtractedMedia;
use crate::progress::ProgressEvent;

/// Template prefixes used to demultiplex the two progress streams.
const DOWNLOAD_PREFIX: &str = "__dl:";
const POSTPROCESS_PREFIX: &str = "__pp:";

const DOWNLOAD_TEMPLATE: &str = "download:__dl:%(progress)j";
const POSTPROCESS_TEMPLATE: &str = "postprocess:__pp:%(progress)j";

/// Number of trailing stderr lines kept for error reporting.
const STDERR_TAIL: usize = 20;

/// The external media engine behind a stable interface.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Fetch descriptive metadata for a single item without downloading.
    async fn probe(&self, url: &str) -> Result<ExtractedMedia>;

    /// Download the best available audio into the workspace as MP3,
    /// forwarding progress events as they arrive.
    async fn download(
        &self,
        url: &str,
        workspace: &Path,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<()>;
}

/// Media engine backed by the yt-dlp binary.
pub struct YtDlpEngine {
    binary: String,
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlpEngine {
    /// Create an engine using `YTDLP_BIN` or plain `yt-dlp` from PATH.
    pub fn new() -> Self {
        let binary = std::env::var("YTDLP_BIN").unwrap_or_else(|_| "yt-dlp".to_string());
        Self { binary }
    }
}

#[async_trait]
impl MediaEngine for YtDlpEngine {
    async fn probe(&self, url: &str) -> Result<ExtractedMedia> {
        let output = Command::new(&self.binary)
            .args(["-J", "--no-playlist", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("failed to run yt-dlp")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("yt-dlp metadata probe failed: {}", tail_of(&stderr));
        }

        serde_json::from_slice(&output.stdout).context("failed to parse yt-dlp metadata")
    }

    async fn download(
        &self,
        url: &str,
        workspace: &Path,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<()> {
        let outtmpl = workspace
            .join("%(channel)s - %(title)s.%(ext)s")
            .to_string_lossy()
            .to_string();

        let mut child = Command::new(&self.binary)
            .arg("--no-playlist")
            .args(["-f", "bestaudio/best"])
            .args(["-x", "--audio-format", "mp3", "--audio-quality", "0"])
            .arg("--newline")
            .args(["--progress-template", DOWNLOAD_TEMPLATE])
            .args(["--progress-template", POSTPROCESS_TEMPLATE])
            .args(["-o", &outtmpl])
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn yt-dlp")?;

        // Keep a bounded tail of stderr for the failure message while the
        // main task drains stdout for progress lines.
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut tail: VecDeque<String> = VecDeque::new();
            if let Some(stream) = stderr {
                let mut lines = BufReader::new(stream).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "yt_dlp", "{line}");
                    if tail.len() == STDERR_TAIL {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            tail
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await.context("failed to read yt-dlp output")? {
                if let Some(event) = parse_progress_line(&line) {
                    // Receiver gone means the request is being torn down;
                    // the engine still runs to completion.
                    let _ = progress.send(event);
                } else {
                    debug!(target: "yt_dlp", "{line}");
                }
            }
        }

        let status = child.wait().await.context("failed to wait for yt-dlp")?;
        let tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            bail!(
                "yt-dlp exited with {}: {}",
                status,
                tail.into_iter().collect::<Vec<_>>().join("\n")
            );
        }

        Ok(())
    }
}

/// Raw progress dict for the download phase; every numeric may be absent,
/// null, or a string depending on the extractor.
#[derive(Debug, Deserialize)]
struct RawDownloadProgress {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    downloaded_bytes: Option<serde_json::Value>,
    #[serde(default)]
    total_bytes: Option<serde_json::Value>,
    #[serde(default)]
    elapsed: Option<serde_json::Value>,
    #[serde(default)]
    eta: Option<serde_json::Value>,
    #[serde(default)]
    speed: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawPostprocessProgress {
    #[serde(default)]
    status: Option<String>,
}

/// Parse one stdout line into a progress event, if it is one.
pub(crate) fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    if let Some(json) = line.strip_prefix(DOWNLOAD_PREFIX) {
        let raw: RawDownloadProgress = serde_json::from_str(json).ok()?;
        return Some(ProgressEvent::Downloading {
            status: raw.status,
            downloaded_bytes: numeric(&raw.downloaded_bytes),
            total_bytes: numeric(&raw.total_bytes),
            elapsed: numeric(&raw.elapsed),
            eta: numeric(&raw.eta),
            speed: numeric(&raw.speed),
        });
    }

    if let Some(json) = line.strip_prefix(POSTPROCESS_PREFIX) {
        let raw: RawPostprocessProgress = serde_json::from_str(json).ok()?;
        return Some(ProgressEvent::Converting { status: raw.status });
    }

    None
}

/// Coerce a JSON value to a finite number, tolerating numeric strings.
/// Anything else degrades to `None` and renders as an unknown placeholder.
fn numeric(value: &Option<serde_json::Value>) -> Option<f64> {
    let value = value.as_ref()?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|n| n.is_finite())
}

fn tail_of(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .take(5)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("\n")
}
