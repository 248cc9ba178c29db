//! Client side of the chat relay
//!
//! A WebSocket client for the relay, the local conversation store it
//! files messages into, and sign-up form validation.

mod profile;
mod relay;
mod store;

pub use profile::{Profile, Registration};
pub use relay::{Delivery, RelayClient};
pub use store::{ChatMessage, Conversation, ConversationStore};
