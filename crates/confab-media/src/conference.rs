use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use confab_shared::constants::{
    CONF_KEY_ACTIVE, CONF_KEY_AUDIO_LOCAL_MUTED, CONF_KEY_AUDIO_MODERATOR_MUTED, CONF_KEY_DEVICE,
    CONF_KEY_HAND_RAISED, CONF_KEY_IS_MODERATOR, CONF_KEY_RECORDING, CONF_KEY_SINK, CONF_KEY_URI,
    CONF_KEY_VIDEO_MUTED, CONF_KEY_VOICE_ACTIVITY,
};
use confab_shared::types::{AccountId, CallId, CallStatus, ConferenceId, ConversationId, Uri};

use crate::call::Call;

/// Registry-side conference record. Participants are referenced by id;
/// the calls themselves live in the registry's call map.
#[derive(Debug, Clone)]
pub(crate) struct Conference {
    pub(crate) id: ConferenceId,
    pub(crate) account: AccountId,
    pub(crate) conversation: Option<ConversationId>,
    pub(crate) participants: Vec<CallId>,
    pub(crate) host_call: Option<Call>,
    pub(crate) daemon_state: Option<String>,
    pub(crate) info: Vec<ParticipantInfo>,
    pub(crate) is_moderator: bool,
    pub(crate) audio_muted: bool,
    pub(crate) video_muted: bool,
}

impl Conference {
    pub(crate) fn new(
        id: ConferenceId,
        account: AccountId,
        conversation: Option<ConversationId>,
    ) -> Self {
        Self {
            id,
            account,
            conversation,
            participants: Vec::new(),
            host_call: None,
            daemon_state: None,
            info: Vec::new(),
            is_moderator: false,
            audio_muted: false,
            video_muted: false,
        }
    }

    pub(crate) fn contains(&self, call: &CallId) -> bool {
        self.participants.contains(call)
    }

    pub(crate) fn add_participant(&mut self, call: &CallId) {
        if !self.contains(call) {
            self.participants.push(call.clone());
        }
    }

    pub(crate) fn remove_participant(&mut self, call: &CallId) -> bool {
        let before = self.participants.len();
        self.participants.retain(|c| c != call);
        before != self.participants.len()
    }

    pub(crate) fn is_host_call(&self, call: &CallId) -> bool {
        self.host_call
            .as_ref()
            .and_then(|h| h.id.as_ref())
            .is_some_and(|id| id == call)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.participants.is_empty() && self.host_call.is_none()
    }
}

/// Published view of a conference with its participant calls resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConferenceSnapshot {
    pub id: ConferenceId,
    pub account: AccountId,
    pub conversation: Option<ConversationId>,
    pub participants: Vec<Call>,
    pub host_call: Option<Call>,
    pub daemon_state: Option<String>,
    pub info: Vec<ParticipantInfo>,
    pub is_moderator: bool,
    pub audio_muted: bool,
    pub video_muted: bool,
}

impl ConferenceSnapshot {
    /// Aggregate status: the host call's, the sole participant's, or the
    /// daemon conference state.
    pub fn state(&self) -> CallStatus {
        if let Some(host) = &self.host_call {
            return host.status;
        }
        if let [only] = self.participants.as_slice() {
            return only.status;
        }
        self.daemon_state
            .as_deref()
            .map(CallStatus::from_conference_state)
            .unwrap_or(CallStatus::None)
    }

    pub fn participant_ids(&self) -> Vec<CallId> {
        self.participants.iter().filter_map(|c| c.id.clone()).collect()
    }

    pub fn contains(&self, call: &CallId) -> bool {
        self.participants
            .iter()
            .chain(self.host_call.iter())
            .any(|c| c.id.as_ref() == Some(call))
    }

    /// The sole participant, if there is exactly one.
    pub fn sole_call(&self) -> Option<&Call> {
        match self.participants.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    pub fn first_call(&self) -> Option<&Call> {
        self.participants.first()
    }

    /// A single call framed as a conference, identified by the call id.
    pub fn is_simple_call(&self) -> bool {
        self.host_call.is_none()
            && self
                .sole_call()
                .and_then(|c| c.id.as_ref())
                .is_some_and(|id| self.id.is_call(id))
    }

    pub fn is_conference(&self) -> bool {
        !self.is_simple_call()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty() && self.host_call.is_none()
    }

    pub fn is_recording(&self) -> bool {
        self.info.iter().any(|p| p.recording)
    }
}

/// Per-participant metadata from a conference-info report.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantInfo {
    /// `None` for the local user.
    pub uri: Option<Uri>,
    pub device: String,
    pub sink_id: String,
    /// Participant call on this side, matched by peer address.
    pub call_id: Option<CallId>,
    pub active: bool,
    pub video_muted: bool,
    pub audio_local_muted: bool,
    pub audio_moderator_muted: bool,
    pub is_moderator: bool,
    pub hand_raised: bool,
    pub recording: bool,
    pub voice_activity: bool,
}

impl ParticipantInfo {
    /// Parse one conference-info entry. Entries with neither a uri key nor
    /// a device are dropped.
    pub fn from_map(map: &HashMap<String, String>) -> Option<Self> {
        let raw_uri = map.get(CONF_KEY_URI);
        let device = map.get(CONF_KEY_DEVICE).cloned().unwrap_or_default();
        if raw_uri.is_none() && device.is_empty() {
            return None;
        }
        let flag = |key: &str| map.get(key).is_some_and(|v| v == "true");
        Some(Self {
            uri: raw_uri.filter(|u| !u.is_empty()).map(|u| Uri::parse(u)),
            device,
            sink_id: map.get(CONF_KEY_SINK).cloned().unwrap_or_default(),
            call_id: None,
            active: flag(CONF_KEY_ACTIVE),
            video_muted: flag(CONF_KEY_VIDEO_MUTED),
            audio_local_muted: flag(CONF_KEY_AUDIO_LOCAL_MUTED),
            audio_moderator_muted: flag(CONF_KEY_AUDIO_MODERATOR_MUTED),
            is_moderator: flag(CONF_KEY_IS_MODERATOR),
            hand_raised: flag(CONF_KEY_HAND_RAISED),
            recording: flag(CONF_KEY_RECORDING),
            voice_activity: flag(CONF_KEY_VOICE_ACTIVITY),
        })
    }

    pub fn is_local(&self) -> bool {
        self.uri.is_none()
    }
}
