//! Request orchestration and error classification.
//!
//! One inbound message becomes one request: an ephemeral acknowledgment is
//! posted, the acquisition pipeline runs with its progress pumped into the
//! status reporter, and the terminal state is either the delivered audio
//! file or a classified failure explanation. The acknowledgment message is
//! deleted on every exit path.

use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::pipeline::{self, MediaEngine, TaggedArtifact};
use crate::progress::{self, ProgressEvent};
use crate::reporter::StatusReporter;
use crate::telegram::{Message, TelegramClient, TelegramError, Update};
use crate::workspace::{workspace_key, InFlightKeys, WorkspaceManager};

/// Static response for messages that carry no URL.
pub const HELP_MESSAGE: &str = "\
<b>Welcome!</b>\n\
\n\
Send or forward a link to a video or track (YouTube, Invidious, etc) \
and you will get back its audio as an MP3 file.\n\
\n\
<i>Hint:</i> you can use @vid to do in-line searches for YouTube videos";

/// Telegram's upload ceiling for bot-sent files.
const SIZE_LIMIT_TEXT: &str = "50MB";

/// A request classified into a terminal failure.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The URL references a playlist; rejected before any pipeline work.
    #[error("playlists are not supported")]
    Disallowed,

    /// The produced file exceeds the delivery platform's size ceiling.
    #[error("produced file exceeds the delivery size limit")]
    Oversized { size_bytes: Option<u64> },

    /// Another request for the same (requester, url) pair is still running.
    #[error("an identical request is already in progress")]
    Busy,

    /// Anything else; surfaced to the user and logged for the operator.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One parsed inbound request.
#[derive(Debug, Clone)]
struct Request {
    id: Uuid,
    chat_id: i64,
    requester_id: i64,
    message_id: i64,
    url: String,
    started_at: DateTime<Utc>,
}

/// Normalize a URL extracted from a message entity.
///
/// Telegram marks scheme-less text like `example.com/watch` as a `url`
/// entity, so a missing scheme gets `https://` prepended. Anything that
/// still does not parse as http(s) is rejected before it can reach the
/// engine subprocess as an argument.
fn normalize_url(raw: &str) -> Result<String, RequestError> {
    let parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{raw}"))
            .map_err(|e| RequestError::Other(anyhow!("unparseable URL: {e}")))?,
        Err(e) => return Err(RequestError::Other(anyhow!("unparseable URL: {e}"))),
    };

    match parsed.scheme() {
        "http" | "https" => Ok(parsed.into()),
        other => Err(RequestError::Other(anyhow!("unsupported URL scheme: {other}"))),
    }
}

/// The bot's shared state. Cheap to clone; one clone per request task.
#[derive(Clone)]
pub struct Bot {
    client: Arc<TelegramClient>,
    http: reqwest::Client,
    engine: Arc<dyn MediaEngine>,
    workspaces: Arc<WorkspaceManager>,
    in_flight: InFlightKeys,
    appendix: String,
    devlink: String,
}

impl Bot {
    pub fn new(config: &Config, engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            client: Arc::new(TelegramClient::new(config.bot_token.clone())),
            http: reqwest::Client::new(),
            engine,
            workspaces: Arc::new(WorkspaceManager::new(config.staging_root.clone())),
            in_flight: InFlightKeys::new(),
            appendix: config.appendix.clone(),
            devlink: config.devlink.clone(),
        }
    }

    pub fn client(&self) -> &Arc<TelegramClient> {
        &self.client
    }

    /// Route one webhook update. URL-bearing messages start a pipeline run,
    /// any other text gets the static help response.
    pub async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            debug!(update_id = update.update_id, "ignoring non-message update");
            return;
        };

        match message.first_url() {
            Some(url) => self.run_request(&message, url).await,
            None => {
                if message.text.is_some() {
                    if let Err(e) = self
                        .client
                        .send_message(message.chat.id, HELP_MESSAGE, Some(message.message_id))
                        .await
                    {
                        warn!(error = %e, chat_id = message.chat.id, "help response failed");
                    }
                }
            }
        }
    }

    async fn run_request(&self, message: &Message, url: String) {
        let request = Request {
            id: Uuid::new_v4(),
            chat_id: message.chat.id,
            requester_id: message.from.as_ref().map(|u| u.id).unwrap_or(message.chat.id),
            message_id: message.message_id,
            url,
            started_at: Utc::now(),
        };

        info!(
            request_id = %request.id,
            chat_id = request.chat_id,
            url = %request.url,
            "request received"
        );

        let ack_id = match self
            .client
            .send_message(
                request.chat_id,
                "<i>Processing this link...</i>",
                Some(request.message_id),
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, chat_id = request.chat_id, "acknowledgment failed");
                return;
            }
        };

        let outcome = self.process(&request, ack_id).await;

        let elapsed = (Utc::now() - request.started_at).num_seconds();
        match outcome {
            Ok(()) => {
                info!(request_id = %request.id, elapsed_s = elapsed, "request succeeded");
            }
            Err(e) => {
                self.respond_failure(&request, &e).await;
                match e {
                    RequestError::Disallowed | RequestError::Busy => {
                        info!(request_id = %request.id, reason = %e, "request rejected");
                    }
                    RequestError::Oversized { size_bytes } => {
                        info!(request_id = %request.id, ?size_bytes, "request rejected, oversized");
                    }
                    RequestError::Other(e) => {
                        error!(
                            request_id = %request.id,
                            url = %request.url,
                            elapsed_s = elapsed,
                            error = %format!("{e:#}"),
                            "request failed"
                        );
                    }
                }
            }
        }

        // Unconditional finalizer for the acknowledgment message.
        if let Err(e) = self.client.delete_message(request.chat_id, ack_id).await {
            warn!(error = %e, chat_id = request.chat_id, "acknowledgment cleanup failed");
        }
    }

    /// Run one request to a terminal state. The ack message is owned by the
    /// caller; this only edits it through the reporter.
    async fn process(&self, request: &Request, ack_id: i64) -> Result<(), RequestError> {
        let url = normalize_url(&request.url)?;

        if url.contains("playlist") {
            return Err(RequestError::Disallowed);
        }

        let key = workspace_key(request.requester_id, &url);
        let _guard = self.in_flight.acquire(&key).ok_or(RequestError::Busy)?;

        let workspace = self
            .workspaces
            .prepare(&key)
            .await
            .map_err(anyhow::Error::from)?;

        let reporter = Arc::new(StatusReporter::new(
            Arc::clone(&self.client),
            request.chat_id,
            ack_id,
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_progress(rx, Arc::clone(&reporter)));

        let artifact =
            pipeline::acquire(self.engine.as_ref(), &self.http, &url, &workspace, tx).await;

        // Dropping the sender above ends the pump; surface its delivery
        // errors only when the pipeline itself succeeded.
        let pump_result = pump.await;

        let artifact = artifact?;
        if let Ok(Err(e)) = pump_result {
            return Err(anyhow::Error::from(e)
                .context("status delivery failed")
                .into());
        }

        reporter
            .report_now(&progress::render(&ProgressEvent::Uploading))
            .await
            .map_err(anyhow::Error::from)?;

        self.deliver(request, &artifact).await
    }

    async fn deliver(
        &self,
        request: &Request,
        artifact: &TaggedArtifact,
    ) -> Result<(), RequestError> {
        let caption = format!(
            "{} kbps | <a href=\"{}\">Source</a> | {}",
            artifact.bitrate_kbps, request.url, self.appendix
        );

        match self
            .client
            .send_audio(
                request.chat_id,
                &artifact.path,
                artifact.duration,
                &caption,
                Some(request.message_id),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_payload_too_large() => {
                let size_bytes = tokio::fs::metadata(&artifact.path)
                    .await
                    .ok()
                    .map(|m| m.len());
                Err(RequestError::Oversized { size_bytes })
            }
            Err(e) => Err(anyhow::Error::from(e).context("audio delivery failed").into()),
        }
    }

    /// Send the user-facing explanation for a failed request. Best-effort;
    /// a delivery fault here is only logged.
    async fn respond_failure(&self, request: &Request, failure: &RequestError) {
        let preamble = format!(
            "<i>Failed to process this <a href=\"{}\">link</a></i>\n\n",
            request.url
        );

        let text = match failure {
            RequestError::Disallowed => {
                format!("{preamble}Playlists are currently not supported.  We're sorry")
            }
            RequestError::Oversized { size_bytes } => format!(
                "{preamble}The resulting file's size is {}, exceeding the {} limit \
                 imposed by Telegram.  We're sorry",
                progress::humanify_size(size_bytes.map(|s| s as f64)),
                SIZE_LIMIT_TEXT,
            ),
            RequestError::Busy => format!(
                "{preamble}An identical request of yours is still being processed.  \
                 Hold on"
            ),
            RequestError::Other(e) => format!(
                "{preamble}<b>Error</b>: {e:#}\n\n\
                 Redirect this message to the <a href=\"{}\">bot developer</a>",
                self.devlink
            ),
        };

        if let Err(e) = self
            .client
            .send_message(request.chat_id, &text, Some(request.message_id))
            .await
        {
            warn!(error = %e, chat_id = request.chat_id, "failure response delivery failed");
        }
    }
}

/// Drain progress events into throttled status edits. Phase transitions
/// bypass the throttle so the user always sees them.
async fn pump_progress(
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
    reporter: Arc<StatusReporter>,
) -> Result<(), TelegramError> {
    while let Some(event) = rx.recv().await {
        let text = progress::render(&event);
        match event {
            ProgressEvent::Downloading { .. } | ProgressEvent::Converting { .. } => {
                reporter.report(&text).await?;
            }
            ProgressEvent::PostProcessing | ProgressEvent::Uploading => {
                reporter.report_now(&text).await?;
            }
        }
    }
    Ok(())
}
