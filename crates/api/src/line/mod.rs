//! LINE Messaging API integration

pub mod client;
pub mod events;
pub mod signature;
pub mod state;

pub use client::{LineClient, LineError};
pub use events::{canned_reply, LineWebhookEvent, LineWebhookRequest, WELCOME_MESSAGE};
pub use state::UserStateStore;
