//! Timeline entries of a swarm conversation.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! to the UI layer or a history store as is.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use confab_shared::types::{ConferenceId, ConversationId, MessageId, Uri};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Delivery status of a message, overall or for one peer device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum InteractionStatus {
    Unknown,
    Sending,
    Success,
    Displayed,
    Failure,
    Cancelled,
    Invalid,
}

impl InteractionStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Sending,
            2 => Self::Success,
            3 => Self::Displayed,
            4 => Self::Failure,
            5 => Self::Cancelled,
            _ => Self::Invalid,
        }
    }
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContactAction {
    Invited,
    Joined,
    Removed,
    Banned,
    Unbanned,
}

impl ContactAction {
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "add" => Some(Self::Invited),
            "join" => Some(Self::Joined),
            "remove" => Some(Self::Removed),
            "ban" => Some(Self::Banned),
            "unban" => Some(Self::Unbanned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InteractionKind {
    Invalid,
    Text,
    Contact,
    DataTransfer,
    Call,
}

/// Type-specific content of an interaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum InteractionBody {
    /// Unsupported, malformed, or folded into another entry.
    Invalid,
    Text {
        body: String,
    },
    Contact {
        member: Uri,
        action: ContactAction,
    },
    DataTransfer {
        file_id: String,
        display_name: String,
        total_size: u64,
    },
    Call {
        /// Zero for a "call started" record.
        duration_ms: u64,
        conf_id: Option<ConferenceId>,
    },
}

impl InteractionBody {
    pub fn kind(&self) -> InteractionKind {
        match self {
            Self::Invalid => InteractionKind::Invalid,
            Self::Text { .. } => InteractionKind::Text,
            Self::Contact { .. } => InteractionKind::Contact,
            Self::DataTransfer { .. } => InteractionKind::DataTransfer,
            Self::Call { .. } => InteractionKind::Call,
        }
    }
}

// ---------------------------------------------------------------------------
// Overlays
// ---------------------------------------------------------------------------

/// One revision of an edited message. An empty body is a deletion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edit {
    pub id: MessageId,
    pub author: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    pub id: MessageId,
    pub author: String,
    pub emoji: String,
    pub timestamp: DateTime<Utc>,
}

/// Excerpt of the message a reply points at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyPreview {
    pub id: MessageId,
    pub author: String,
    pub body: Option<String>,
}

// ---------------------------------------------------------------------------
// Interaction
// ---------------------------------------------------------------------------

/// A single entry of a conversation timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Interaction {
    /// Swarm message id.
    pub id: MessageId,
    pub conversation: ConversationId,
    /// Author uri as reported by the daemon.
    pub author: String,
    pub timestamp: DateTime<Utc>,
    /// Linearized parent in the swarm history.
    pub parent: Option<MessageId>,
    pub body: InteractionBody,
    pub reply_to: Option<MessageId>,
    pub react_to: Option<MessageId>,
    pub edit_of: Option<MessageId>,
    /// Revisions, oldest first.
    pub edits: Vec<Edit>,
    pub reactions: Vec<Reaction>,
    /// Filled once the replied-to message is loaded.
    pub reply_preview: Option<ReplyPreview>,
    pub status: InteractionStatus,
    /// Per peer-device delivery status.
    pub statuses: BTreeMap<String, InteractionStatus>,
    /// Peers whose last displayed message is this one.
    pub displayed_by: BTreeSet<String>,
    pub notified: bool,
    /// Folded into another entry (a call-history completion record).
    pub hidden: bool,
}

impl Interaction {
    pub fn new(
        id: MessageId,
        conversation: ConversationId,
        author: impl Into<String>,
        timestamp: DateTime<Utc>,
        body: InteractionBody,
    ) -> Self {
        Self {
            id,
            conversation,
            author: author.into(),
            timestamp,
            parent: None,
            body,
            reply_to: None,
            react_to: None,
            edit_of: None,
            edits: Vec::new(),
            reactions: Vec::new(),
            reply_preview: None,
            status: InteractionStatus::Unknown,
            statuses: BTreeMap::new(),
            displayed_by: BTreeSet::new(),
            notified: false,
            hidden: false,
        }
    }

    pub fn kind(&self) -> InteractionKind {
        self.body.kind()
    }

    pub fn is_edit(&self) -> bool {
        self.edit_of.is_some()
    }

    pub fn is_reaction(&self) -> bool {
        self.react_to.is_some() && !self.is_edit()
    }

    /// Whether the entry belongs in the visible timeline.
    pub fn is_visible(&self) -> bool {
        !self.hidden && self.kind() != InteractionKind::Invalid
    }

    /// Raw body of a text message, before edits.
    pub fn raw_text(&self) -> Option<&str> {
        match &self.body {
            InteractionBody::Text { body } => Some(body),
            _ => None,
        }
    }

    /// Text as currently displayed: the latest edit wins.
    pub fn text(&self) -> Option<&str> {
        match self.edits.last() {
            Some(edit) => Some(edit.body.as_str()),
            None => self.raw_text(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.edits.last().is_some_and(|e| e.body.is_empty())
    }

    pub fn is_edited(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Placeholder that keeps this entry's position in the parent chain
    /// once its content has been folded elsewhere.
    pub fn placeholder(&self) -> Self {
        let mut p = Self::new(
            self.id.clone(),
            self.conversation.clone(),
            self.author.clone(),
            self.timestamp,
            InteractionBody::Invalid,
        );
        p.parent = self.parent.clone();
        p
    }

    pub fn as_edit(&self) -> Edit {
        Edit {
            id: self.id.clone(),
            author: self.author.clone(),
            body: self.raw_text().unwrap_or_default().to_string(),
            timestamp: self.timestamp,
        }
    }

    pub fn as_reaction(&self) -> Reaction {
        Reaction {
            id: self.id.clone(),
            author: self.author.clone(),
            emoji: self.raw_text().unwrap_or_default().to_string(),
            timestamp: self.timestamp,
        }
    }

    pub fn as_reply_preview(&self) -> ReplyPreview {
        ReplyPreview {
            id: self.id.clone(),
            author: self.author.clone(),
            body: self.text().map(str::to_string),
        }
    }

    /// Fold a newer copy of this message in, keeping local overlays.
    pub fn merge_from(&mut self, newer: Interaction) {
        self.body = newer.body;
        self.timestamp = newer.timestamp;
        self.author = newer.author;
        if newer.parent.is_some() {
            self.parent = newer.parent;
        }
        if newer.status != InteractionStatus::Unknown {
            self.status = newer.status;
        }
    }

    pub fn call_record(&self) -> Option<(u64, Option<&ConferenceId>)> {
        match &self.body {
            InteractionBody::Call {
                duration_ms,
                conf_id,
            } => Some((*duration_ms, conf_id.as_ref())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(id: &str, body: &str) -> Interaction {
        Interaction::new(
            MessageId::from(id),
            ConversationId::from("conv"),
            "alice",
            Utc::now(),
            InteractionBody::Text { body: body.into() },
        )
    }

    #[test]
    fn test_text_follows_latest_edit() {
        let mut msg = text("m1", "hello");
        assert_eq!(msg.text(), Some("hello"));
        assert!(!msg.is_edited());
        msg.edits.push(text("e1", "hello!").as_edit());
        assert_eq!(msg.text(), Some("hello!"));
        assert_eq!(msg.raw_text(), Some("hello"));
        msg.edits.push(text("e2", "").as_edit());
        assert!(msg.is_deleted());
    }

    #[test]
    fn test_placeholder_is_invisible() {
        let mut msg = text("m1", "x");
        msg.parent = Some(MessageId::from("m0"));
        let p = msg.placeholder();
        assert!(!p.is_visible());
        assert_eq!(p.parent, msg.parent);
        assert_eq!(p.id, msg.id);
    }

    #[test]
    fn test_reaction_vs_edit_flags() {
        let mut r = text("r1", "👍");
        r.react_to = Some(MessageId::from("m1"));
        assert!(r.is_reaction());
        r.edit_of = Some(MessageId::from("r0"));
        assert!(!r.is_reaction());
        assert!(r.is_edit());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(InteractionStatus::from_code(3), InteractionStatus::Displayed);
        assert_eq!(InteractionStatus::from_code(42), InteractionStatus::Invalid);
    }

    #[test]
    fn test_merge_keeps_overlays() {
        let mut msg = text("m1", "a");
        msg.reactions.push(text("r", "🎉").as_reaction());
        msg.statuses.insert("dev".into(), InteractionStatus::Displayed);
        let mut newer = text("m1", "b");
        newer.status = InteractionStatus::Success;
        msg.merge_from(newer);
        assert_eq!(msg.raw_text(), Some("b"));
        assert_eq!(msg.reactions.len(), 1);
        assert_eq!(msg.statuses.len(), 1);
        assert_eq!(msg.status, InteractionStatus::Success);
    }
}
