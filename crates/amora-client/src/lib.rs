//! Client-side chat session manager for Amora.
//!
//! A [`ChatSession`] owns one real-time channel for one open conversation
//! and drives the connection lifecycle, presence, the message timeline,
//! typing indicators and media delivery from a single actor task.

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod inbox;
pub mod media;
pub mod presence;
pub mod reconciler;
pub mod session;
pub mod timers;
pub mod typing;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::{ClientConfig, SessionTimings};
pub use error::{ClientError, Result};
pub use events::{MediaEvent, SessionEvent};
pub use media::{MediaError, MediaFile, MediaPhase};
pub use reconciler::{Delivery, TimelineEntry};
pub use session::{ChatSession, SessionSnapshot};

/// Install the global tracing subscriber (respects `RUST_LOG`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("amora_client=debug,amora_net=debug,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
