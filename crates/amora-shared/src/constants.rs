use std::time::Duration;

/// Application name
pub const APP_NAME: &str = "Amora";

/// Interval between presence keep-alive pings on an open chat channel
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Quiet period after the last keystroke before typing stops
pub const TYPING_QUIET_PERIOD: Duration = Duration::from_secs(2);

/// How long a media message may wait for a real-time ack before the REST fallback
pub const MEDIA_FALLBACK_TIMEOUT: Duration = Duration::from_secs(8);

/// Hard limit after which the media sending dialog is closed regardless of outcome
pub const MEDIA_AUTO_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum media attachment size in bytes (10 MiB)
pub const MAX_MEDIA_SIZE: usize = 10 * 1024 * 1024;

/// Progress shown as soon as a media message is handed to the real-time channel
pub const MEDIA_PROGRESS_PRIMARY: u8 = 10;

/// Progress at which the REST fallback starts; upload bytes fill the rest
pub const MEDIA_PROGRESS_FALLBACK_FLOOR: u8 = 25;

/// Default number of reconnect attempts after an established channel drops
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// First reconnect backoff; doubled on every failed attempt
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for the reconnect backoff
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Capacity of the command / notification channels between tasks
pub const CHANNEL_CAPACITY: usize = 256;

/// Default REST API base URL (local development)
pub const DEFAULT_API_URL: &str = "http://localhost:7777";

/// Default real-time endpoint (local development)
pub const DEFAULT_WS_URL: &str = "ws://localhost:7777/ws";

/// Inbox previews longer than this are truncated
pub const PREVIEW_MAX_CHARS: usize = 40;
