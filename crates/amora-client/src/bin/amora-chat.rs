//! # amora-chat
//!
//! Terminal driver for a single chat session.
//!
//! ```text
//! AMORA_SELF_ID=<id> AMORA_SELF_FIRST_NAME=Ada amora-chat <target-user-id>
//! ```
//!
//! Every stdin line is sent as a text message. `/media <path>` sends an image
//! or video, `/cancel` drops a pending media selection and `/quit` closes the
//! session.

use std::path::Path;

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use amora_client::{ChatSession, ClientConfig, MediaEvent, MediaFile, SessionEvent};
use amora_shared::constants::APP_NAME;
use amora_shared::types::{SelfProfile, UserId};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    amora_client::init_tracing();

    let target = match std::env::args().nth(1) {
        Some(target) => UserId::new(target),
        None => bail!("usage: amora-chat <target-user-id>"),
    };
    let profile = SelfProfile {
        id: UserId::new(std::env::var("AMORA_SELF_ID").context("AMORA_SELF_ID is not set")?),
        first_name: std::env::var("AMORA_SELF_FIRST_NAME").unwrap_or_default(),
        last_name: std::env::var("AMORA_SELF_LAST_NAME").unwrap_or_default(),
    };

    let config = ClientConfig::from_env();
    info!(app = APP_NAME, api = %config.api_url, ws = %config.ws_url, "Loaded configuration");

    let api = config.api()?;
    let mut session = ChatSession::open(&config, profile, target.clone(), api)
        .await
        .with_context(|| format!("opening chat with {target}"))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line == "/quit" {
                    break;
                }
                if let Err(e) = handle_line(&session, line).await {
                    warn!(error = %e, "Command failed");
                }
            }
            event = session.next_event() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
        }
    }

    session.close().await;
    Ok(())
}

async fn handle_line(session: &ChatSession, line: &str) -> anyhow::Result<()> {
    if line.is_empty() {
        return Ok(());
    }
    if line == "/cancel" {
        session.cancel_media().await?;
        return Ok(());
    }
    if let Some(path) = line.strip_prefix("/media ") {
        let file = read_media(Path::new(path.trim())).await?;
        session.select_media(file).await?;
        session.confirm_media().await?;
        return Ok(());
    }
    session.keystroke().await?;
    session.send_text(line).await?;
    Ok(())
}

async fn read_media(path: &Path) -> anyhow::Result<MediaFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(MediaFile {
        mime: mime_from_extension(path).to_string(),
        name,
        bytes,
    })
}

fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::Connection(state) => info!(?state, "Connection"),
        SessionEvent::Participant(p) => info!(name = %p.display_name(), "Chatting with"),
        SessionEvent::TimelineReset(entries) => {
            for entry in entries {
                print_message(&entry.message);
            }
        }
        SessionEvent::MessageAppended(entry) => print_message(&entry.message),
        SessionEvent::MessageConfirmed { id, .. } => info!(message_id = %id, "Delivered"),
        SessionEvent::MessagesFailed(refs) => warn!(count = refs.len(), "Messages not delivered"),
        SessionEvent::MessagesRead(ids) => info!(count = ids.len(), "Seen"),
        SessionEvent::Presence(status) => info!(online = status.online, last_seen = ?status.last_seen, "Presence"),
        SessionEvent::RemoteTyping(typing) => info!(typing, "Typing"),
        SessionEvent::Media(MediaEvent::Failed(e)) | SessionEvent::Media(MediaEvent::Rejected(e)) => {
            error!(error = %e, "Media")
        }
        SessionEvent::Media(media) => info!(?media, "Media"),
        SessionEvent::Error(e) => error!(error = %e, "Chat error"),
    }
}

fn print_message(message: &amora_shared::ChatMessage) {
    let time = message.timestamp.format("%H:%M");
    let name = &message.sender.first_name;
    match (&message.body, &message.media) {
        (Some(body), _) => println!("[{time}] {name}: {body}"),
        (None, Some(media)) => println!("[{time}] {name}: <{}> {}", media.kind.as_str(), media.url),
        (None, None) => {}
    }
}
