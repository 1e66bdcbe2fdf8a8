//! tunebot - Telegram bot that turns media links into tagged MP3 files.
//!
//! An inbound message carrying a URL is handed to the acquisition
//! pipeline, which drives yt-dlp to download and transcode the best
//! available audio, embeds ID3 metadata and cover art, and hands the
//! finished file back for delivery. Progress is streamed to the user as
//! throttled edits of an ephemeral status message, and failures are
//! classified into user-facing explanations.

pub mod bot;
pub mod cli;
pub mod config;
pub mod pipeline;
pub mod progress;
pub mod reporter;
pub mod server;
pub mod telegram;
pub mod workspace;

pub use bot::Bot;
pub use config::Config;
pub use pipeline::{ExtractedMedia, TaggedArtifact};
pub use progress::ProgressEvent;
