//! # confab-store
//!
//! In-memory model of swarm conversations. Raw daemon messages are
//! converted into interactions, placed along their parent links, and
//! folded (edits, reactions, call-history pairs) before being published.
//! The overlay tracks history loads so that concurrent callers share a
//! single daemon request.

pub mod conversation;
pub mod convert;
pub mod interaction;
pub mod overlay;

mod error;

pub use conversation::{Conversation, ConversationSnapshot, ElementChange, Member, Profile};
pub use convert::convert;
pub use error::ConvertError;
pub use interaction::*;
pub use overlay::{ConversationChange, ConversationEvent, LoadHandle, SwarmOverlay, UntilHandle};
