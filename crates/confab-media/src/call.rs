use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use confab_shared::constants::{
    CALL_KEY_ACCOUNT_ID, CALL_KEY_AUDIO_CODEC, CALL_KEY_AUDIO_MUTED, CALL_KEY_CALL_TYPE,
    CALL_KEY_PEER_HOLDING, CALL_KEY_PEER_NUMBER, CALL_KEY_VIDEO_CODEC, CALL_KEY_VIDEO_MUTED,
    SCREEN_SHARE_SOURCE,
};
use confab_shared::types::{
    AccountId, CallId, CallStatus, ConferenceId, ConversationId, Direction, Media, MediaType, Uri,
};

/// A single call leg as known locally.
///
/// `id` is `None` only for a provisional outgoing swarm call that the daemon
/// has not confirmed yet. Conference membership (`conf_id`) is owned by the
/// registry and is never derived from daemon call details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Call {
    pub id: Option<CallId>,
    pub account: AccountId,
    pub direction: Direction,
    pub peer: Uri,
    pub conversation: Option<ConversationId>,
    pub media: Vec<Media>,
    pub status: CallStatus,
    pub(crate) conf_id: Option<ConferenceId>,
    pub peer_holding: bool,
    pub audio_muted: bool,
    pub video_muted: bool,
    pub audio_codec: Option<String>,
    pub video_codec: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub missed: bool,
}

impl Call {
    pub fn new(
        id: CallId,
        account: AccountId,
        direction: Direction,
        peer: Uri,
        conversation: Option<ConversationId>,
    ) -> Self {
        Self {
            id: Some(id),
            account,
            direction,
            peer,
            conversation,
            media: Vec::new(),
            status: CallStatus::None,
            conf_id: None,
            peer_holding: false,
            audio_muted: false,
            video_muted: false,
            audio_codec: None,
            video_codec: None,
            started_at: Utc::now(),
            ended_at: None,
            missed: true,
        }
    }

    /// Placeholder for an outgoing swarm call awaiting its daemon id.
    pub fn provisional(
        account: AccountId,
        peer: Uri,
        conversation: Option<ConversationId>,
        media: Vec<Media>,
    ) -> Self {
        Self {
            id: None,
            media,
            ..Self::new(
                CallId::new(""),
                account,
                Direction::Outgoing,
                peer,
                conversation,
            )
        }
    }

    /// Build a call first seen through a state callback.
    pub fn from_details(id: CallId, account: AccountId, details: &HashMap<String, String>) -> Self {
        let account = details
            .get(CALL_KEY_ACCOUNT_ID)
            .filter(|a| !a.is_empty())
            .map(|a| AccountId::new(a.as_str()))
            .unwrap_or(account);
        let direction = details
            .get(CALL_KEY_CALL_TYPE)
            .and_then(|t| t.parse::<i32>().ok())
            .map(Direction::from_code)
            .unwrap_or(Direction::Incoming);
        let peer = details
            .get(CALL_KEY_PEER_NUMBER)
            .map(|p| Uri::parse(p))
            .unwrap_or_else(|| Uri::parse(""));
        let mut call = Self::new(id, account, direction, peer, None);
        call.apply_details(details);
        call
    }

    /// Refresh attributes carried by a daemon details map.
    pub fn apply_details(&mut self, details: &HashMap<String, String>) {
        let flag = |key: &str| details.get(key).map(|v| v == "true");
        if let Some(holding) = flag(CALL_KEY_PEER_HOLDING) {
            self.peer_holding = holding;
        }
        if let Some(muted) = flag(CALL_KEY_AUDIO_MUTED) {
            self.audio_muted = muted;
        }
        if let Some(muted) = flag(CALL_KEY_VIDEO_MUTED) {
            self.video_muted = muted;
        }
        if let Some(codec) = details.get(CALL_KEY_AUDIO_CODEC).filter(|c| !c.is_empty()) {
            self.audio_codec = Some(codec.clone());
        }
        if let Some(codec) = details.get(CALL_KEY_VIDEO_CODEC).filter(|c| !c.is_empty()) {
            self.video_codec = Some(codec.clone());
        }
    }

    pub fn set_status(&mut self, status: CallStatus) {
        self.status = status;
        if status == CallStatus::Current {
            self.missed = false;
        }
        if status.is_over() && self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn conf_id(&self) -> Option<&ConferenceId> {
        self.conf_id.as_ref()
    }

    /// Call id as a string, empty for a provisional call.
    pub fn id_str(&self) -> &str {
        self.id.as_ref().map(CallId::as_str).unwrap_or_default()
    }

    pub fn is_provisional(&self) -> bool {
        self.id.is_none()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }

    pub fn has_media(&self, kind: MediaType) -> bool {
        self.media.iter().any(|m| m.media_type == kind && m.enabled)
    }

    pub fn has_active_media(&self, kind: MediaType) -> bool {
        self.media
            .iter()
            .any(|m| m.media_type == kind && m.enabled && !m.muted)
    }

    pub fn has_active_screen_sharing(&self) -> bool {
        self.media.iter().any(|m| {
            m.media_type == MediaType::Video && m.enabled && !m.muted && m.source == SCREEN_SHARE_SOURCE
        })
    }

    /// Media list to accept with. Video is muted when the user declines it.
    pub fn accepted_media(&self, with_video: bool) -> Vec<Media> {
        self.media
            .iter()
            .map(|m| {
                if !with_video && m.media_type == MediaType::Video {
                    m.with_muted(true)
                } else {
                    m.clone()
                }
            })
            .collect()
    }

    /// Answer to a peer's media change proposal, keeping local mute intent.
    pub fn media_change_answer(&self, proposed: &[Media]) -> Vec<Media> {
        let video_active = self.has_active_media(MediaType::Video);
        proposed
            .iter()
            .map(|m| match m.media_type {
                MediaType::Video if !video_active => m.with_muted(true),
                MediaType::Video => m.clone(),
                MediaType::Audio => m.with_muted(self.audio_muted),
            })
            .collect()
    }

    pub fn set_local_mute(&mut self, kind: MediaType, muted: bool) {
        match kind {
            MediaType::Audio => self.audio_muted = muted,
            MediaType::Video => self.video_muted = muted,
        }
    }
}
