//! Media acquisition pipeline.
//!
//! Turns a URL into a tagged MP3 artifact inside a prepared workspace:
//! metadata probe, download/transcode with forwarded progress, a
//! single-file invariant check, ID3 tagging and bitrate readback.
//!
//! The pipeline does not attempt recovery: it completes fully or fails,
//! and classification of the failure happens at the orchestrator boundary.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tokio::fs;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

use crate::progress::ProgressEvent;

pub mod engine;
pub mod tagger;

pub use engine::{MediaEngine, YtDlpEngine};

/// Descriptive metadata produced by the engine's probe.
///
/// Every field is optional; the engine reports what the source exposes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedMedia {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Final output of the pipeline. Ownership transfers to the caller, which
/// is responsible for delivery; the file itself is reclaimed when the next
/// request with the same workspace key wipes the directory.
#[derive(Debug, Clone)]
pub struct TaggedArtifact {
    pub path: PathBuf,
    pub duration: Option<u32>,
    pub bitrate_kbps: u32,
}

/// Run the full acquisition pipeline for one request.
///
/// Progress events are forwarded over the channel in delivery order; the
/// terminal `Uploading` transition is the caller's responsibility.
pub async fn acquire(
    engine: &dyn MediaEngine,
    http: &reqwest::Client,
    url: &str,
    workspace: &Path,
    progress: UnboundedSender<ProgressEvent>,
) -> Result<TaggedArtifact> {
    let meta = engine
        .probe(url)
        .await
        .context("metadata extraction failed")?;

    engine
        .download(url, workspace, progress.clone())
        .await
        .context("download failed")?;

    let _ = progress.send(ProgressEvent::PostProcessing);

    let path = single_file_in(workspace).await?;

    tagger::tag(&path, &meta, http).await.context("tagging failed")?;

    let bitrate_kbps = tagger::read_bitrate(&path)?;

    info!(
        file = %path.display(),
        bitrate_kbps,
        duration = ?meta.duration,
        "artifact ready"
    );

    Ok(TaggedArtifact {
        path,
        duration: meta.duration.map(|d| d as u32),
        bitrate_kbps,
    })
}

/// Enforce the single-file invariant: the engine must have produced
/// exactly one file in the workspace.
async fn single_file_in(workspace: &Path) -> Result<PathBuf> {
    let mut found = Vec::new();

    let mut entries = fs::read_dir(workspace)
        .await
        .context("failed to list workspace")?;
    while let Some(entry) = entries.next_entry().await? {
        found.push(entry.path());
    }

    match found.len() {
        1 => Ok(found.remove(0)),
        n => bail!("expected exactly one file in the workspace, found {n}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_single_file_accepted() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a - b.mp3");
        fs::write(&file, b"audio").await.unwrap();

        let path = single_file_in(temp.path()).await.unwrap();
        assert_eq!(path, file);
    }

    #[tokio::test]
    async fn test_empty_workspace_rejected() {
        let temp = TempDir::new().unwrap();
        assert!(single_file_in(temp.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_two_files_rejected() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.mp3"), b"x").await.unwrap();
        fs::write(temp.path().join("a.webm"), b"x").await.unwrap();

        let err = single_file_in(temp.path()).await.unwrap_err();
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn test_extracted_media_tolerates_unknown_fields() {
        let meta: ExtractedMedia = serde_json::from_str(
            r#"{"channel":"X","title":"Y","thumbnail":"http://e.org/a.jpg",
                "duration":63.4,"view_count":12345,"uploader":"X"}"#,
        )
        .unwrap();

        assert_eq!(meta.channel.as_deref(), Some("X"));
        assert_eq!(meta.title.as_deref(), Some("Y"));
        assert_eq!(meta.duration, Some(63.4));
    }

    #[test]
    fn test_extracted_media_all_optional() {
        let meta: ExtractedMedia = serde_json::from_str("{}").unwrap();
        assert!(meta.channel.is_none());
        assert!(meta.thumbnail.is_none());
        assert!(meta.duration.is_none());
    }
}
