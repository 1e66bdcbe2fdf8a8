//! Acquisition Pipeline Integration Tests
//!
//! Exercises the orchestration around a scripted engine: the single-file
//! invariant, probe failure propagation, and progress forwarding.

use std::path::Path;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc::{self, UnboundedSender};
use tunebot::pipeline::{self, ExtractedMedia, MediaEngine};
use tunebot::ProgressEvent;

/// Engine that writes a scripted set of files instead of downloading.
struct ScriptedEngine {
    probe_fails: bool,
    files: Vec<&'static str>,
}

#[async_trait]
impl MediaEngine for ScriptedEngine {
    async fn probe(&self, _url: &str) -> Result<ExtractedMedia> {
        if self.probe_fails {
            bail!("no suitable extractor");
        }
        Ok(ExtractedMedia::default())
    }

    async fn download(
        &self,
        _url: &str,
        workspace: &Path,
        progress: UnboundedSender<ProgressEvent>,
    ) -> Result<()> {
        let _ = progress.send(ProgressEvent::Downloading {
            status: Some("downloading".to_string()),
            downloaded_bytes: Some(500_000.0),
            total_bytes: Some(1_500_000.0),
            elapsed: Some(3.0),
            eta: Some(6.0),
            speed: Some(250_000.0),
        });
        for name in &self.files {
            tokio::fs::write(workspace.join(name), b"data").await?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_two_files_in_workspace_fail_before_tagging() {
    let workspace = TempDir::new().unwrap();
    let engine = ScriptedEngine {
        probe_fails: false,
        files: vec!["a.mp3", "b.mp3"],
    };
    let (tx, _rx) = mpsc::unbounded_channel();
    let http = reqwest::Client::new();

    let err = pipeline::acquire(&engine, &http, "https://example.org/x", workspace.path(), tx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("expected exactly one file"));
}

#[tokio::test]
async fn test_probe_failure_downloads_nothing() {
    let workspace = TempDir::new().unwrap();
    let engine = ScriptedEngine {
        probe_fails: true,
        files: vec!["a.mp3"],
    };
    let (tx, _rx) = mpsc::unbounded_channel();
    let http = reqwest::Client::new();

    let err = pipeline::acquire(&engine, &http, "https://example.org/x", workspace.path(), tx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("metadata extraction failed"));
    assert_eq!(std::fs::read_dir(workspace.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_progress_events_arrive_in_delivery_order() {
    let workspace = TempDir::new().unwrap();
    let engine = ScriptedEngine {
        probe_fails: false,
        files: vec!["a.mp3", "b.mp3"],
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let http = reqwest::Client::new();

    // Fails at the single-file check, after download progress and the
    // post-processing transition were already emitted.
    let _ = pipeline::acquire(&engine, &http, "https://example.org/x", workspace.path(), tx).await;

    let first = rx.recv().await.unwrap();
    assert!(matches!(first, ProgressEvent::Downloading { .. }));
    let second = rx.recv().await.unwrap();
    assert_eq!(second, ProgressEvent::PostProcessing);
    assert!(rx.recv().await.is_none());
}
