//! ID3 tagging and bitrate readback.
//!
//! Writes a fixed ID3 v2.3 tag in place: artist from the extracted channel
//! name, title from the extracted title, front-cover art fetched from the
//! thumbnail URL. Absent metadata fields are simply omitted.

use std::path::Path;

use anyhow::{bail, Context, Result};
use id3::frame::{Picture, PictureType};
use id3::{Tag, TagLike, Version};
use lofty::prelude::*;
use lofty::probe::Probe;

use super::ExtractedMedia;

/// Cover-art MIME type, inferred strictly from the URL's file extension.
/// No fallback: an extension outside the fixed mapping fails the request.
fn thumbnail_mime(url: &str) -> Result<&'static str> {
    match url.rsplit('.').next() {
        Some("webp") => Ok("image/webp"),
        Some("jpg") => Ok("image/jpeg"),
        other => bail!("unsupported thumbnail extension: {:?}", other.unwrap_or("")),
    }
}

/// Write the ID3 v2.3 tag for the given artifact in place.
pub async fn tag(path: &Path, meta: &ExtractedMedia, http: &reqwest::Client) -> Result<()> {
    let mut tag = Tag::new();

    if let Some(channel) = &meta.channel {
        tag.set_artist(channel.as_str());
    }
    if let Some(title) = &meta.title {
        tag.set_title(title.as_str());
    }

    if let Some(thumbnail) = &meta.thumbnail {
        let mime_type = thumbnail_mime(thumbnail)?;

        let bytes = http
            .get(thumbnail)
            .send()
            .await
            .context("cover art fetch failed")?
            .error_for_status()
            .context("cover art fetch rejected")?
            .bytes()
            .await
            .context("cover art body read failed")?;

        tag.add_frame(Picture {
            mime_type: mime_type.to_string(),
            picture_type: PictureType::CoverFront,
            description: String::new(),
            data: bytes.to_vec(),
        });
    }

    tag.write_to_path(path, Version::Id3v23)
        .context("failed to write ID3 tag")?;

    Ok(())
}

/// Read back the container's bitrate in kbps.
pub fn read_bitrate(path: &Path) -> Result<u32> {
    let tagged_file = Probe::open(path)
        .context("failed to open audio file")?
        .read()
        .context("failed to read audio properties")?;

    tagged_file
        .properties()
        .audio_bitrate()
        .context("file reports no bitrate")
}
