// Domain types, wire protocol and constants shared by the Amora chat crates.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{InboundEvent, OutboundEvent};
pub use types::{
    ChatMessage, ConnectionState, LocalRef, MediaKind, MediaRef, MessageId, Participant,
    PresenceStatus, SelfProfile, Sender, UserId,
};
