use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::{
    MEDIA_KEY_ENABLED, MEDIA_KEY_LABEL, MEDIA_KEY_MUTED, MEDIA_KEY_SOURCE, MEDIA_KEY_TYPE,
    MEDIA_TYPE_AUDIO, MEDIA_TYPE_VIDEO,
};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// First eight characters, for log lines.
            pub fn short(&self) -> &str {
                let end = self
                    .0
                    .char_indices()
                    .nth(8)
                    .map(|(i, _)| i)
                    .unwrap_or(self.0.len());
                &self.0[..end]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Local account the daemon operates on behalf of.
    AccountId
);
string_id!(
    /// Daemon-assigned call id.
    CallId
);
string_id!(
    /// Daemon-assigned conference id, or the id of the sole call of an
    /// implicit conference.
    ConferenceId
);
string_id!(
    /// Swarm conversation id.
    ConversationId
);
string_id!(
    /// Swarm message (commit) id.
    MessageId
);

impl From<&CallId> for ConferenceId {
    fn from(call: &CallId) -> Self {
        Self(call.0.clone())
    }
}

impl ConferenceId {
    /// Whether this id is the id of `call`, i.e. the implicit conference
    /// wrapping that call.
    pub fn is_call(&self, call: &CallId) -> bool {
        self.0 == call.0
    }
}

// ---------------------------------------------------------------------------
// Uri
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UriScheme {
    Swarm,
    Jami,
    Sip,
}

impl UriScheme {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Swarm => "swarm:",
            Self::Jami => "jami:",
            Self::Sip => "sip:",
        }
    }
}

/// A peer or conversation address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uri {
    pub scheme: UriScheme,
    pub host: String,
}

impl Uri {
    pub fn new(scheme: UriScheme, host: impl Into<String>) -> Self {
        Self {
            scheme,
            host: host.into(),
        }
    }

    pub fn swarm(conversation: &ConversationId) -> Self {
        Self::new(UriScheme::Swarm, conversation.as_str())
    }

    /// Parse a daemon address.
    ///
    /// Bare 40-character hex strings are account hashes and map to the jami
    /// scheme; anything else without a known scheme is treated as SIP.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        // Strip a display name of the form `"Name" <sip:x>`.
        let raw = match (raw.find('<'), raw.rfind('>')) {
            (Some(start), Some(end)) if start < end => &raw[start + 1..end],
            _ => raw,
        };

        for (prefix, scheme) in [
            ("swarm:", UriScheme::Swarm),
            ("jami:", UriScheme::Jami),
            ("ring:", UriScheme::Jami),
            ("sip:", UriScheme::Sip),
        ] {
            if let Some(host) = raw.strip_prefix(prefix) {
                return Self::new(scheme, host);
            }
        }

        if raw.len() == 40 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
            Self::new(UriScheme::Jami, raw)
        } else {
            Self::new(UriScheme::Sip, raw)
        }
    }

    pub fn is_swarm(&self) -> bool {
        self.scheme == UriScheme::Swarm
    }

    /// The address without its scheme.
    pub fn raw_id(&self) -> &str {
        &self.host
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.is_swarm().then(|| ConversationId::new(self.host.clone()))
    }
}

impl std::fmt::Display for Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.scheme.prefix(), self.host)
    }
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            Self::Incoming
        } else {
            Self::Outgoing
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CallStatus {
    None,
    Searching,
    Connecting,
    Ringing,
    Current,
    Hungup,
    Busy,
    Failure,
    Hold,
    Unhold,
    Inactive,
    Over,
}

impl CallStatus {
    /// Map a daemon call state string. `INCOMING` and `RINGING` both ring.
    pub fn from_daemon(state: &str) -> Self {
        match state {
            "SEARCHING" => Self::Searching,
            "CONNECTING" => Self::Connecting,
            "INCOMING" | "RINGING" => Self::Ringing,
            "CURRENT" => Self::Current,
            "HUNGUP" => Self::Hungup,
            "BUSY" => Self::Busy,
            "FAILURE" => Self::Failure,
            "HOLD" => Self::Hold,
            "UNHOLD" => Self::Unhold,
            "INACTIVE" => Self::Inactive,
            "OVER" => Self::Over,
            _ => Self::None,
        }
    }

    /// Map a daemon conference state string onto the status of the
    /// conference's host call.
    pub fn from_conference_state(state: &str) -> Self {
        match state {
            "ACTIVE_ATTACHED" => Self::Current,
            "ACTIVE_DETACHED" | "HOLD" => Self::Hold,
            _ => Self::None,
        }
    }

    pub fn is_ringing(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Ringing | Self::None | Self::Searching
        )
    }

    pub fn is_ongoing(self) -> bool {
        matches!(self, Self::Current | Self::Hold | Self::Unhold)
    }

    pub fn is_over(self) -> bool {
        matches!(self, Self::Hungup | Self::Busy | Self::Failure | Self::Over)
    }
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio,
    Video,
}

impl MediaType {
    pub fn from_daemon(value: &str) -> Option<Self> {
        match value {
            MEDIA_TYPE_AUDIO => Some(Self::Audio),
            MEDIA_TYPE_VIDEO => Some(Self::Video),
            _ => None,
        }
    }

    pub fn as_daemon(self) -> &'static str {
        match self {
            Self::Audio => MEDIA_TYPE_AUDIO,
            Self::Video => MEDIA_TYPE_VIDEO,
        }
    }
}

/// One negotiated (or proposed) media stream of a call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Media {
    pub media_type: MediaType,
    pub label: String,
    pub enabled: bool,
    pub muted: bool,
    pub source: String,
}

impl Media {
    pub fn default_audio() -> Self {
        Self {
            media_type: MediaType::Audio,
            label: "audio_0".to_string(),
            enabled: true,
            muted: false,
            source: String::new(),
        }
    }

    pub fn default_video() -> Self {
        Self {
            media_type: MediaType::Video,
            label: "video_0".to_string(),
            enabled: true,
            muted: false,
            source: "camera://default".to_string(),
        }
    }

    /// Build from a daemon media map. Entries with an unknown media type
    /// are rejected.
    pub fn from_map(map: &HashMap<String, String>) -> Option<Self> {
        let media_type = MediaType::from_daemon(map.get(MEDIA_KEY_TYPE)?)?;
        let flag = |key: &str| map.get(key).map(|v| v == "true").unwrap_or(false);
        Some(Self {
            media_type,
            label: map.get(MEDIA_KEY_LABEL).cloned().unwrap_or_default(),
            enabled: map.get(MEDIA_KEY_ENABLED).map(|v| v == "true").unwrap_or(true),
            muted: flag(MEDIA_KEY_MUTED),
            source: map.get(MEDIA_KEY_SOURCE).cloned().unwrap_or_default(),
        })
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (MEDIA_KEY_TYPE.to_string(), self.media_type.as_daemon().to_string()),
            (MEDIA_KEY_LABEL.to_string(), self.label.clone()),
            (MEDIA_KEY_ENABLED.to_string(), self.enabled.to_string()),
            (MEDIA_KEY_MUTED.to_string(), self.muted.to_string()),
            (MEDIA_KEY_SOURCE.to_string(), self.source.clone()),
        ])
    }

    pub fn with_muted(&self, muted: bool) -> Self {
        Self {
            muted,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

/// Membership policy reported by the daemon in the conversation `mode` field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConversationKind {
    OneToOne,
    AdminInvitesOnly,
    InvitesOnly,
    Public,
}

impl ConversationKind {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::OneToOne),
            1 => Some(Self::AdminInvitesOnly),
            2 => Some(Self::InvitesOnly),
            3 => Some(Self::Public),
            _ => None,
        }
    }

    pub fn is_one_to_one(self) -> bool {
        self == Self::OneToOne
    }
}

/// Local synchronization state of a swarm conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncState {
    Syncing,
    Request,
    Ready,
}

/// Combined view of kind and sync state exposed to observers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConversationMode {
    OneToOne,
    Group,
    Request,
    Syncing,
}

impl ConversationMode {
    pub fn of(kind: ConversationKind, sync: SyncState) -> Self {
        match sync {
            SyncState::Syncing => Self::Syncing,
            SyncState::Request => Self::Request,
            SyncState::Ready if kind.is_one_to_one() => Self::OneToOne,
            SyncState::Ready => Self::Group,
        }
    }

    /// No history exists yet to page through.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Syncing | Self::Request)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemberRole {
    Invited,
    Member,
    Admin,
    Blocked,
}

impl MemberRole {
    pub fn from_daemon(role: &str) -> Self {
        match role {
            "admin" => Self::Admin,
            "invited" => Self::Invited,
            "banned" | "blocked" => Self::Blocked,
            _ => Self::Member,
        }
    }
}

/// Membership change reported by the daemon for a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemberEvent {
    Add,
    Join,
    Remove,
    Block,
    Unblock,
}

impl MemberEvent {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Add),
            1 => Some(Self::Join),
            2 => Some(Self::Remove),
            3 => Some(Self::Block),
            4 => Some(Self::Unblock),
            _ => None,
        }
    }
}
