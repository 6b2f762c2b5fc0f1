use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    MSG_KEY_AUTHOR, MSG_KEY_EDIT, MSG_KEY_ID, MSG_KEY_PARENT, MSG_KEY_REACT_TO, MSG_KEY_REPLY_TO,
    MSG_KEY_TIMESTAMP, MSG_KEY_TYPE,
};
use crate::types::{
    AccountId, CallId, ConferenceId, ConversationId, Media, MediaType, MessageId, Uri,
};

/// Callbacks delivered by the telephony/swarm daemon, in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DaemonEvent {
    CallStateChanged {
        account: AccountId,
        call_id: CallId,
        state: String,
        detail_code: i32,
        details: HashMap<String, String>,
    },
    IncomingCall {
        account: AccountId,
        call_id: CallId,
        from: String,
        media: Vec<HashMap<String, String>>,
    },
    MediaNegotiationStatus {
        call_id: CallId,
        event: String,
        media: Vec<HashMap<String, String>>,
    },
    MediaChangeRequested {
        account: AccountId,
        call_id: CallId,
        media: Vec<HashMap<String, String>>,
    },
    /// `id` is a call id or a conference id.
    AudioMuted {
        id: String,
        muted: bool,
    },
    VideoMuted {
        id: String,
        muted: bool,
    },
    RemoteRecordingChanged {
        id: String,
        peer: String,
        recording: bool,
    },
    ConferenceCreated {
        account: AccountId,
        conversation: Option<ConversationId>,
        conf_id: ConferenceId,
        participants: Vec<CallId>,
        state: String,
    },
    ConferenceChanged {
        account: AccountId,
        conf_id: ConferenceId,
        state: String,
        participants: Vec<CallId>,
    },
    ConferenceRemoved {
        account: AccountId,
        conf_id: ConferenceId,
    },
    ConferenceInfoUpdated {
        conf_id: ConferenceId,
        info: Vec<HashMap<String, String>>,
    },
    SwarmLoaded {
        request_id: u32,
        account: AccountId,
        conversation: ConversationId,
        messages: Vec<RawSwarmMessage>,
    },
    SwarmMessageReceived {
        account: AccountId,
        conversation: ConversationId,
        message: RawSwarmMessage,
    },
    SwarmMessageUpdated {
        account: AccountId,
        conversation: ConversationId,
        message: RawSwarmMessage,
    },
    MessageStatusChanged {
        account: AccountId,
        conversation: ConversationId,
        message: MessageId,
        contact: String,
        status: i32,
    },
    ConversationReady {
        account: AccountId,
        conversation: ConversationId,
        info: HashMap<String, String>,
        members: Vec<HashMap<String, String>>,
    },
    ConversationSyncing {
        account: AccountId,
        conversation: ConversationId,
    },
    ConversationRemoved {
        account: AccountId,
        conversation: ConversationId,
    },
    ConversationRequestReceived {
        account: AccountId,
        conversation: ConversationId,
        metadata: HashMap<String, String>,
    },
    ConversationRequestDeclined {
        account: AccountId,
        conversation: ConversationId,
    },
    ConversationMemberEvent {
        account: AccountId,
        conversation: ConversationId,
        uri: String,
        event: i32,
    },
    ConversationProfileUpdated {
        account: AccountId,
        conversation: ConversationId,
        profile: HashMap<String, String>,
    },
}

impl DaemonEvent {
    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CallStateChanged { .. } => "call-state-changed",
            Self::IncomingCall { .. } => "incoming-call",
            Self::MediaNegotiationStatus { .. } => "media-negotiation-status",
            Self::MediaChangeRequested { .. } => "media-change-requested",
            Self::AudioMuted { .. } => "audio-muted",
            Self::VideoMuted { .. } => "video-muted",
            Self::RemoteRecordingChanged { .. } => "remote-recording-changed",
            Self::ConferenceCreated { .. } => "conference-created",
            Self::ConferenceChanged { .. } => "conference-changed",
            Self::ConferenceRemoved { .. } => "conference-removed",
            Self::ConferenceInfoUpdated { .. } => "conference-info-updated",
            Self::SwarmLoaded { .. } => "swarm-loaded",
            Self::SwarmMessageReceived { .. } => "swarm-message-received",
            Self::SwarmMessageUpdated { .. } => "swarm-message-updated",
            Self::MessageStatusChanged { .. } => "message-status-changed",
            Self::ConversationReady { .. } => "conversation-ready",
            Self::ConversationSyncing { .. } => "conversation-syncing",
            Self::ConversationRemoved { .. } => "conversation-removed",
            Self::ConversationRequestReceived { .. } => "conversation-request-received",
            Self::ConversationRequestDeclined { .. } => "conversation-request-declined",
            Self::ConversationMemberEvent { .. } => "conversation-member-event",
            Self::ConversationProfileUpdated { .. } => "conversation-profile-updated",
        }
    }
}

/// A swarm message exactly as the daemon reports it: a flat string map.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawSwarmMessage(pub HashMap<String, String>);

impl RawSwarmMessage {
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value of `key`, treating an empty string as absent.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn id(&self) -> Option<MessageId> {
        self.non_empty(MSG_KEY_ID).map(MessageId::from)
    }

    pub fn kind(&self) -> &str {
        self.get(MSG_KEY_TYPE).unwrap_or_default()
    }

    pub fn author(&self) -> &str {
        self.get(MSG_KEY_AUTHOR).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<MessageId> {
        self.non_empty(MSG_KEY_PARENT).map(MessageId::from)
    }

    pub fn reply_to(&self) -> Option<MessageId> {
        self.non_empty(MSG_KEY_REPLY_TO).map(MessageId::from)
    }

    pub fn react_to(&self) -> Option<MessageId> {
        self.non_empty(MSG_KEY_REACT_TO).map(MessageId::from)
    }

    pub fn edit(&self) -> Option<MessageId> {
        self.non_empty(MSG_KEY_EDIT).map(MessageId::from)
    }

    /// Timestamp in seconds since the epoch. `None` when absent or malformed.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let secs: i64 = self.get(MSG_KEY_TIMESTAMP)?.parse().ok()?;
        Utc.timestamp_opt(secs, 0).single()
    }
}

/// Flag passed along with an outgoing swarm message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageFlag {
    Plain,
    /// Edit of an earlier message. An empty body deletes it.
    Edit,
    Reaction,
}

impl MessageFlag {
    pub fn code(self) -> i32 {
        match self {
            Self::Plain => 0,
            Self::Edit => 1,
            Self::Reaction => 2,
        }
    }
}

/// Commands issued to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DaemonCommand {
    PlaceCall {
        account: AccountId,
        to: Uri,
        media: Vec<Media>,
    },
    Accept {
        account: AccountId,
        call_id: CallId,
        media: Vec<Media>,
    },
    Refuse {
        account: AccountId,
        call_id: CallId,
    },
    HangUp {
        account: AccountId,
        call_id: CallId,
    },
    Hold {
        account: AccountId,
        call_id: CallId,
    },
    Unhold {
        account: AccountId,
        call_id: CallId,
    },
    Transfer {
        account: AccountId,
        call_id: CallId,
        to: String,
    },
    AttendedTransfer {
        account: AccountId,
        transfer_id: CallId,
        target_id: CallId,
    },
    MuteLocalMedia {
        account: AccountId,
        call_id: String,
        media_type: MediaType,
        mute: bool,
    },
    RequestMediaChange {
        account: AccountId,
        call_id: CallId,
        media: Vec<Media>,
    },
    AnswerMediaChange {
        account: AccountId,
        call_id: CallId,
        media: Vec<Media>,
    },
    HoldConference {
        account: AccountId,
        conf_id: ConferenceId,
    },
    UnholdConference {
        account: AccountId,
        conf_id: ConferenceId,
    },
    HangUpConference {
        account: AccountId,
        conf_id: ConferenceId,
    },
    AddParticipant {
        account: AccountId,
        call_id: CallId,
        conf_id: ConferenceId,
    },
    AddMainParticipant {
        account: AccountId,
        conf_id: ConferenceId,
    },
    JoinParticipant {
        account: AccountId,
        selected: CallId,
        dragged: CallId,
    },
    JoinConference {
        account: AccountId,
        selected: ConferenceId,
        dragged: ConferenceId,
    },
    DetachParticipant {
        account: AccountId,
        call_id: CallId,
    },
    MuteStream {
        account: AccountId,
        conf_id: ConferenceId,
        peer: String,
        device: String,
        stream: String,
        mute: bool,
    },
    HangUpParticipant {
        account: AccountId,
        conf_id: ConferenceId,
        peer: String,
        device: String,
    },
    RaiseHand {
        account: AccountId,
        conf_id: ConferenceId,
        peer: String,
        device: String,
        raised: bool,
    },
    SetConferenceLayout {
        account: AccountId,
        conf_id: ConferenceId,
        layout: u32,
    },
    SetActiveParticipant {
        account: AccountId,
        conf_id: ConferenceId,
        peer: String,
    },
    LoadConversation {
        account: AccountId,
        conversation: ConversationId,
        from: String,
        count: u32,
    },
    LoadConversationUntil {
        account: AccountId,
        conversation: ConversationId,
        from: String,
        until: MessageId,
    },
    SendMessage {
        account: AccountId,
        conversation: ConversationId,
        body: String,
        parent: Option<MessageId>,
        flag: MessageFlag,
    },
    SetMessageDisplayed {
        account: AccountId,
        conversation: ConversationId,
        message: MessageId,
    },
    StartConversation {
        account: AccountId,
    },
    AddConversationMember {
        account: AccountId,
        conversation: ConversationId,
        member: Uri,
    },
    AcceptConversationRequest {
        account: AccountId,
        conversation: ConversationId,
    },
    DeclineConversationRequest {
        account: AccountId,
        conversation: ConversationId,
    },
    RemoveConversation {
        account: AccountId,
        conversation: ConversationId,
    },
}

impl DaemonCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlaceCall { .. } => "place-call",
            Self::Accept { .. } => "accept",
            Self::Refuse { .. } => "refuse",
            Self::HangUp { .. } => "hang-up",
            Self::Hold { .. } => "hold",
            Self::Unhold { .. } => "unhold",
            Self::Transfer { .. } => "transfer",
            Self::AttendedTransfer { .. } => "attended-transfer",
            Self::MuteLocalMedia { .. } => "mute-local-media",
            Self::RequestMediaChange { .. } => "request-media-change",
            Self::AnswerMediaChange { .. } => "answer-media-change",
            Self::HoldConference { .. } => "hold-conference",
            Self::UnholdConference { .. } => "unhold-conference",
            Self::HangUpConference { .. } => "hang-up-conference",
            Self::AddParticipant { .. } => "add-participant",
            Self::AddMainParticipant { .. } => "add-main-participant",
            Self::JoinParticipant { .. } => "join-participant",
            Self::JoinConference { .. } => "join-conference",
            Self::DetachParticipant { .. } => "detach-participant",
            Self::MuteStream { .. } => "mute-stream",
            Self::HangUpParticipant { .. } => "hang-up-participant",
            Self::RaiseHand { .. } => "raise-hand",
            Self::SetConferenceLayout { .. } => "set-conference-layout",
            Self::SetActiveParticipant { .. } => "set-active-participant",
            Self::LoadConversation { .. } => "load-conversation",
            Self::LoadConversationUntil { .. } => "load-conversation-until",
            Self::SendMessage { .. } => "send-message",
            Self::SetMessageDisplayed { .. } => "set-message-displayed",
            Self::StartConversation { .. } => "start-conversation",
            Self::AddConversationMember { .. } => "add-conversation-member",
            Self::AcceptConversationRequest { .. } => "accept-conversation-request",
            Self::DeclineConversationRequest { .. } => "decline-conversation-request",
            Self::RemoveConversation { .. } => "remove-conversation",
        }
    }
}

/// Synchronous reply to a [`DaemonCommand`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandReply {
    Done,
    /// Id assigned to a placed call. May be empty.
    CallId(String),
    /// Id of an asynchronous history request, echoed by `SwarmLoaded`.
    RequestId(u32),
    Accepted(bool),
    ConversationId(ConversationId),
}

impl CommandReply {
    pub fn into_call_id(self) -> Result<String, crate::error::BoundaryError> {
        match self {
            Self::CallId(id) => Ok(id),
            _ => Err(crate::error::BoundaryError::UnexpectedReply("place-call")),
        }
    }

    pub fn into_request_id(self) -> Result<u32, crate::error::BoundaryError> {
        match self {
            Self::RequestId(id) => Ok(id),
            _ => Err(crate::error::BoundaryError::UnexpectedReply("load-conversation")),
        }
    }

    pub fn into_conversation_id(self) -> Result<ConversationId, crate::error::BoundaryError> {
        match self {
            Self::ConversationId(id) => Ok(id),
            _ => Err(crate::error::BoundaryError::UnexpectedReply(
                "start-conversation",
            )),
        }
    }

    /// Accept `Done` as success too; some commands only acknowledge.
    pub fn accepted(&self) -> bool {
        !matches!(self, Self::Accepted(false))
    }
}
