//! Authoritative call and conference state.
//!
//! The registry folds daemon callbacks into local maps and publishes every
//! observable change on the call and conference topics. It is owned by the
//! session task and is never shared; all methods take `&mut self`.
//!
//! Membership is kept consistent in one direction: a call whose `conf_id`
//! is set is always listed in that conference. A call without `conf_id` is
//! framed by its implicit conference, keyed by its own id.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use confab_net::EventBus;
use confab_shared::types::{
    AccountId, CallId, CallStatus, ConferenceId, ConversationId, Direction, Media, MediaType, Uri,
};

use crate::call::Call;
use crate::conference::{Conference, ConferenceSnapshot, ParticipantInfo};

pub struct CallRegistry {
    calls: HashMap<CallId, Call>,
    conferences: HashMap<ConferenceId, Conference>,
    /// Provisional swarm calls waiting for their conference, by conversation.
    pending_hosts: HashMap<ConversationId, Call>,
    call_bus: EventBus<Call>,
    conference_bus: EventBus<ConferenceSnapshot>,
}

impl CallRegistry {
    pub fn new(call_bus: EventBus<Call>, conference_bus: EventBus<ConferenceSnapshot>) -> Self {
        Self {
            calls: HashMap::new(),
            conferences: HashMap::new(),
            pending_hosts: HashMap::new(),
            call_bus,
            conference_bus,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn call(&self, id: &CallId) -> Option<&Call> {
        self.calls.get(id)
    }

    pub fn calls(&self) -> impl Iterator<Item = &Call> {
        self.calls.values()
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn conference_count(&self) -> usize {
        self.conferences.len()
    }

    /// Look up a conference by id without creating anything.
    pub fn conference(&self, id: &ConferenceId) -> Option<ConferenceSnapshot> {
        self.conferences.get(id).map(|c| self.snapshot(c))
    }

    /// Conference currently framing `call`: its explicit conference, or its
    /// implicit one if that already exists.
    pub fn conference_of(&self, call: &CallId) -> Option<ConferenceSnapshot> {
        let c = self.calls.get(call)?;
        let id = c.conf_id.clone().unwrap_or_else(|| ConferenceId::from(call));
        self.conference(&id)
    }

    /// Conferences whose aggregate state is CURRENT.
    pub fn current_conferences(&self) -> Vec<ConferenceSnapshot> {
        self.conferences
            .values()
            .map(|c| self.snapshot(c))
            .filter(|s| s.state() == CallStatus::Current)
            .collect()
    }

    pub fn pending_host(&self, conversation: &ConversationId) -> Option<&Call> {
        self.pending_hosts.get(conversation)
    }

    fn snapshot(&self, conf: &Conference) -> ConferenceSnapshot {
        ConferenceSnapshot {
            id: conf.id.clone(),
            account: conf.account.clone(),
            conversation: conf.conversation.clone(),
            participants: conf
                .participants
                .iter()
                .filter_map(|id| self.calls.get(id).cloned())
                .collect(),
            host_call: conf.host_call.clone(),
            daemon_state: conf.daemon_state.clone(),
            info: conf.info.clone(),
            is_moderator: conf.is_moderator,
            audio_muted: conf.audio_muted,
            video_muted: conf.video_muted,
        }
    }

    fn publish_conference(&self, id: &ConferenceId) -> Option<ConferenceSnapshot> {
        let snapshot = self.conference(id)?;
        self.conference_bus.publish(snapshot.clone());
        Some(snapshot)
    }

    fn publish_call(&self, call: &Call) {
        self.call_bus.publish(call.clone());
    }

    // -----------------------------------------------------------------------
    // Local registration
    // -----------------------------------------------------------------------

    /// Register a call known from a local command (place or answer).
    pub fn add_call(
        &mut self,
        account: AccountId,
        id: CallId,
        peer: Uri,
        direction: Direction,
        media: Vec<Media>,
        conversation: Option<ConversationId>,
    ) -> Call {
        let call = self.calls.entry(id.clone()).or_insert_with(|| {
            Call::new(id.clone(), account, direction, peer, conversation.clone())
        });
        call.media = media;
        if call.conversation.is_none() {
            call.conversation = conversation;
        }
        debug!(call = %id, "Call registered");
        call.clone()
    }

    /// Hold a provisional swarm call until the daemon reports the
    /// conference for its conversation.
    pub fn park_host_call(&mut self, call: Call) {
        match call.conversation.clone() {
            Some(conversation) => {
                debug!(conversation = %conversation, "Parking provisional host call");
                self.pending_hosts.insert(conversation, call);
            }
            None => warn!("Provisional call without a conversation, not parked"),
        }
    }

    pub fn set_media(&mut self, id: &CallId, media: Vec<Media>) -> Option<Call> {
        let call = self.calls.get_mut(id)?;
        call.media = media;
        Some(call.clone())
    }

    /// Record a local mute toggle without publishing; the daemon echoes it.
    pub fn set_local_mute(&mut self, id: &str, kind: MediaType, muted: bool) {
        if let Some(call) = self.calls.get_mut(&CallId::from(id)) {
            call.set_local_mute(kind, muted);
        } else if let Some(conf) = self.conferences.get_mut(&ConferenceId::from(id)) {
            match kind {
                MediaType::Audio => conf.audio_muted = muted,
                MediaType::Video => conf.video_muted = muted,
            }
        }
    }

    /// Frame `call` as a conference, wrapping it in a new implicit
    /// conference when it has none.
    pub fn get_or_create_implicit_conference(&mut self, call: &CallId) -> Option<ConferenceSnapshot> {
        let c = self.calls.get(call)?;
        if let Some(conf_id) = c.conf_id.clone() {
            if self.conferences.contains_key(&conf_id) {
                return self.conference(&conf_id);
            }
        }
        let implicit = ConferenceId::from(call);
        if self.conferences.contains_key(&implicit) {
            return self.conference(&implicit);
        }

        let mut conf = Conference::new(implicit.clone(), c.account.clone(), c.conversation.clone());
        conf.add_participant(call);
        self.conferences.insert(implicit.clone(), conf);
        debug!(conf = %implicit, "Implicit conference created");
        self.publish_conference(&implicit)
    }

    // -----------------------------------------------------------------------
    // Membership helpers
    // -----------------------------------------------------------------------

    /// Move `call` into `conf_id`, leaving whatever framed it before.
    /// Returns false when the call is unknown.
    fn attach(&mut self, call: &CallId, conf_id: &ConferenceId) -> bool {
        let Some(c) = self.calls.get_mut(call) else {
            debug!(call = %call, conf = %conf_id, "Unknown participant ignored");
            return false;
        };
        let previous = c.conf_id.replace(conf_id.clone());

        if let Some(prev) = previous.filter(|p| p != conf_id) {
            self.detach_from(&prev, call);
        }
        let implicit = ConferenceId::from(call);
        if &implicit != conf_id && self.conferences.remove(&implicit).is_some() {
            debug!(conf = %implicit, "Implicit conference merged");
        }
        if let Some(conf) = self.conferences.get_mut(conf_id) {
            conf.add_participant(call);
        }
        true
    }

    /// Remove `call` from `conf_id`, dropping the conference once empty.
    fn detach_from(&mut self, conf_id: &ConferenceId, call: &CallId) {
        let Some(conf) = self.conferences.get_mut(conf_id) else {
            return;
        };
        if !conf.remove_participant(call) {
            return;
        }
        if conf.is_empty() {
            let removed = self.conferences.remove(conf_id);
            if let Some(conf) = removed.filter(|c| !c.id.is_call(call)) {
                debug!(conf = %conf_id, "Conference emptied");
                self.conference_bus.publish(self.snapshot(&conf));
            }
        } else {
            self.publish_conference(conf_id);
        }
    }

    /// Drop `conf_id` if no call frames it any more. A conference the
    /// daemon reported for the first time goes away silently; one that
    /// subscribers already saw gets a final empty snapshot.
    fn drop_if_empty(&mut self, conf_id: &ConferenceId, known: bool) -> bool {
        if !self.conferences.get(conf_id).is_some_and(Conference::is_empty) {
            return false;
        }
        if let Some(conf) = self.conferences.remove(conf_id) {
            debug!(conf = %conf_id, "Conference without participants dropped");
            if known {
                self.conference_bus.publish(self.snapshot(&conf));
            }
        }
        true
    }

    fn clear_conf_id(&mut self, call: &CallId, conf_id: &ConferenceId) {
        if let Some(c) = self.calls.get_mut(call) {
            if c.conf_id.as_ref() == Some(conf_id) {
                c.conf_id = None;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Call events
    // -----------------------------------------------------------------------

    /// Apply a daemon call state. Terminal states for unknown ids are
    /// ignored. Reaching OVER removes the call synchronously.
    pub fn ingest_call_state_changed(
        &mut self,
        account: &AccountId,
        id: &CallId,
        state: &str,
        details: &HashMap<String, String>,
    ) -> Option<Call> {
        let status = CallStatus::from_daemon(state);
        if !self.calls.contains_key(id) {
            if matches!(status, CallStatus::Over | CallStatus::Failure) {
                debug!(call = %id, state, "Terminal state for unknown call ignored");
                return None;
            }
            let call = Call::from_details(id.clone(), account.clone(), details);
            self.calls.insert(id.clone(), call);
        }

        let call = self.calls.get_mut(id)?;
        call.apply_details(details);
        call.set_status(status);
        let call = call.clone();
        info!(call = %id, state, "Call state changed");

        if status == CallStatus::Over {
            self.remove_call(id);
            self.publish_call(&call);
        } else if state == "INCOMING" {
            // Published by the incoming-call event that follows.
            debug!(call = %id, "Incoming state not published");
        } else {
            self.publish_call(&call);
        }
        Some(call)
    }

    fn remove_call(&mut self, id: &CallId) {
        self.calls.remove(id);
        self.conferences.remove(&ConferenceId::from(id));

        let containing: Vec<ConferenceId> = self
            .conferences
            .values()
            .filter(|c| c.contains(id))
            .map(|c| c.id.clone())
            .collect();
        for conf_id in containing {
            self.detach_from(&conf_id, id);
        }

        let hosting: Vec<ConferenceId> = self
            .conferences
            .values()
            .filter(|c| c.is_host_call(id))
            .map(|c| c.id.clone())
            .collect();
        for conf_id in hosting {
            if let Some(host) = self
                .conferences
                .get_mut(&conf_id)
                .and_then(|c| c.host_call.as_mut())
            {
                host.set_status(CallStatus::Over);
            }
            self.publish_conference(&conf_id);
        }
        debug!(call = %id, "Call removed");
    }

    /// Incoming call with its offered media. This is the signal that
    /// publishes a call whose INCOMING state was held back.
    pub fn ingest_incoming_call(
        &mut self,
        account: &AccountId,
        id: &CallId,
        from: &str,
        media: Vec<Media>,
    ) -> Call {
        let call = self.calls.entry(id.clone()).or_insert_with(|| {
            Call::new(
                id.clone(),
                account.clone(),
                Direction::Incoming,
                Uri::parse(from),
                None,
            )
        });
        call.media = media;
        if call.status == CallStatus::None {
            call.set_status(CallStatus::Ringing);
        }
        let call = call.clone();
        info!(call = %id, from, "Incoming call");
        self.publish_call(&call);
        call
    }

    pub fn ingest_media_negotiation(&mut self, id: &CallId, media: Vec<Media>) -> Option<Call> {
        let Some(call) = self.calls.get_mut(id) else {
            debug!(call = %id, "Media negotiation for unknown call");
            return None;
        };
        call.media = media;
        let call = call.clone();
        self.publish_call(&call);
        Some(call)
    }

    /// `id` names a call or a conference. Calls publish only while CURRENT;
    /// conferences always publish.
    pub fn ingest_audio_muted(&mut self, id: &str, muted: bool) {
        self.ingest_muted(id, MediaType::Audio, muted);
    }

    pub fn ingest_video_muted(&mut self, id: &str, muted: bool) {
        self.ingest_muted(id, MediaType::Video, muted);
    }

    fn ingest_muted(&mut self, id: &str, kind: MediaType, muted: bool) {
        let call_id = CallId::from(id);
        if let Some(call) = self.calls.get_mut(&call_id) {
            call.set_local_mute(kind, muted);
            if call.status == CallStatus::Current {
                let call = call.clone();
                self.publish_call(&call);
            }
            return;
        }
        let conf_id = ConferenceId::from(id);
        if let Some(conf) = self.conferences.get_mut(&conf_id) {
            match kind {
                MediaType::Audio => conf.audio_muted = muted,
                MediaType::Video => conf.video_muted = muted,
            }
            self.publish_conference(&conf_id);
            return;
        }
        debug!(id, ?kind, "Mute change for unknown call or conference");
    }

    // -----------------------------------------------------------------------
    // Conference events
    // -----------------------------------------------------------------------

    pub fn ingest_conference_created(
        &mut self,
        account: &AccountId,
        conversation: Option<&ConversationId>,
        conf_id: &ConferenceId,
        participants: &[CallId],
        state: &str,
    ) -> Option<ConferenceSnapshot> {
        let known = self.conferences.contains_key(conf_id);
        let conf = self.conferences.entry(conf_id.clone()).or_insert_with(|| {
            Conference::new(conf_id.clone(), account.clone(), conversation.cloned())
        });
        conf.daemon_state = Some(state.to_string());
        if conf.conversation.is_none() {
            conf.conversation = conversation.cloned();
        }

        for call in participants {
            self.attach(call, conf_id);
        }

        if let Some(mut host) = conversation.and_then(|c| self.pending_hosts.remove(c)) {
            host.conf_id = Some(conf_id.clone());
            host.set_status(CallStatus::from_conference_state(state));
            self.publish_call(&host);
            if let Some(conf) = self.conferences.get_mut(conf_id) {
                conf.host_call = Some(host);
            }
            debug!(conf = %conf_id, "Provisional call became host call");
        }
        if self.drop_if_empty(conf_id, known) {
            return None;
        }

        info!(conf = %conf_id, participants = participants.len(), "Conference created");
        self.publish_conference(conf_id)
    }

    /// Reconcile against the daemon's full membership report.
    pub fn ingest_conference_changed(
        &mut self,
        account: &AccountId,
        conf_id: &ConferenceId,
        state: &str,
        participants: &[CallId],
    ) -> Option<ConferenceSnapshot> {
        let known = self.conferences.contains_key(conf_id);
        let conf = self
            .conferences
            .entry(conf_id.clone())
            .or_insert_with(|| Conference::new(conf_id.clone(), account.clone(), None));
        conf.daemon_state = Some(state.to_string());
        let present: Vec<CallId> = conf.participants.clone();

        for call in participants.iter().filter(|c| !present.contains(c)) {
            self.attach(call, conf_id);
        }

        let reported: HashSet<&CallId> = participants.iter().collect();
        let stale: Vec<CallId> = present
            .into_iter()
            .filter(|c| !reported.contains(c))
            .collect();
        for call in &stale {
            if let Some(conf) = self.conferences.get_mut(conf_id) {
                conf.remove_participant(call);
            }
            self.clear_conf_id(call, conf_id);
            debug!(call = %call, conf = %conf_id, "Participant detached");
        }
        if self.drop_if_empty(conf_id, known) {
            return None;
        }

        let members: Vec<CallId> = self
            .conferences
            .get(conf_id)
            .map(|c| c.participants.clone())
            .unwrap_or_default();
        if members.len() > 1 {
            for call in &members {
                let needs_attach = self
                    .calls
                    .get(call)
                    .is_some_and(|c| c.conf_id.as_ref() != Some(conf_id));
                if needs_attach {
                    self.attach(call, conf_id);
                }
            }
        }

        let host = self.conferences.get_mut(conf_id).and_then(|conf| {
            let host = conf.host_call.as_mut()?;
            host.set_status(CallStatus::from_conference_state(state));
            Some(host.clone())
        });
        if let Some(host) = host {
            self.publish_call(&host);
        }

        let snapshot = self.publish_conference(conf_id);

        // Split: the two-party conference lost a side. The remaining call
        // goes back to its implicit conference.
        if !stale.is_empty() {
            if let [remaining] = members.as_slice() {
                // The explicit conference keeps listing `remaining` and is
                // dropped once that call ends.
                self.clear_conf_id(remaining, conf_id);
                if !conf_id.is_call(remaining) {
                    info!(conf = %conf_id, call = %remaining, "Conference split");
                    self.get_or_create_implicit_conference(remaining);
                }
            }
        }
        snapshot
    }

    pub fn ingest_conference_removed(&mut self, conf_id: &ConferenceId) -> Option<ConferenceSnapshot> {
        let Some(mut conf) = self.conferences.remove(conf_id) else {
            debug!(conf = %conf_id, "Removal of unknown conference");
            return None;
        };
        for call in std::mem::take(&mut conf.participants) {
            self.clear_conf_id(&call, conf_id);
        }
        if let Some(host) = conf.host_call.as_mut() {
            host.set_status(CallStatus::Over);
            let host = host.clone();
            self.publish_call(&host);
        }
        conf.host_call = None;
        info!(conf = %conf_id, "Conference removed");
        let snapshot = self.snapshot(&conf);
        self.conference_bus.publish(snapshot.clone());
        Some(snapshot)
    }

    pub fn ingest_conference_info(
        &mut self,
        conf_id: &ConferenceId,
        entries: &[HashMap<String, String>],
    ) -> Option<ConferenceSnapshot> {
        let peers: Vec<(CallId, Uri)> = match self.conferences.get(conf_id) {
            Some(conf) => conf
                .participants
                .iter()
                .filter_map(|id| self.calls.get(id).map(|c| (id.clone(), c.peer.clone())))
                .collect(),
            None => {
                debug!(conf = %conf_id, "Info for unknown conference");
                return None;
            }
        };

        let mut is_moderator = false;
        let info: Vec<ParticipantInfo> = entries
            .iter()
            .filter_map(ParticipantInfo::from_map)
            .map(|mut p| {
                if p.is_local() {
                    is_moderator |= p.is_moderator;
                } else if let Some(uri) = &p.uri {
                    p.call_id = peers
                        .iter()
                        .find(|(_, peer)| peer.raw_id() == uri.raw_id())
                        .map(|(id, _)| id.clone());
                }
                p
            })
            .collect();

        let conf = self.conferences.get_mut(conf_id)?;
        conf.info = info;
        conf.is_moderator = is_moderator;
        self.publish_conference(conf_id)
    }

    /// `id` names a call or a conference.
    pub fn ingest_remote_recording(&mut self, id: &str, peer: &str, recording: bool) {
        let conf_id = match self.calls.get(&CallId::from(id)) {
            Some(call) => call
                .conf_id
                .clone()
                .unwrap_or_else(|| ConferenceId::from(id)),
            None => ConferenceId::from(id),
        };
        let peer = Uri::parse(peer);
        let Some(conf) = self.conferences.get_mut(&conf_id) else {
            debug!(id, "Recording change for unknown conference");
            return;
        };
        let mut changed = false;
        for p in conf.info.iter_mut() {
            if p.uri.as_ref().is_some_and(|u| u.raw_id() == peer.raw_id()) {
                p.recording = recording;
                changed = true;
            }
        }
        if changed {
            self.publish_conference(&conf_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_net::Subscription;

    fn acc() -> AccountId {
        AccountId::from("acc")
    }

    fn ids(list: &[&str]) -> Vec<CallId> {
        list.iter().map(|s| CallId::from(*s)).collect()
    }

    struct Fixture {
        registry: CallRegistry,
        calls: Subscription<Call>,
        conferences: Subscription<ConferenceSnapshot>,
    }

    fn fixture() -> Fixture {
        let call_bus = EventBus::new(64);
        let conference_bus = EventBus::new(64);
        let calls = call_bus.subscribe();
        let conferences = conference_bus.subscribe();
        Fixture {
            registry: CallRegistry::new(call_bus, conference_bus),
            calls,
            conferences,
        }
    }

    fn with_calls(f: &mut Fixture, list: &[&str]) {
        for id in list {
            f.registry
                .ingest_call_state_changed(&acc(), &CallId::from(*id), "CURRENT", &HashMap::new());
        }
        f.calls.drain();
    }

    fn participant_set(s: &ConferenceSnapshot) -> HashSet<CallId> {
        s.participant_ids().into_iter().collect()
    }

    #[test]
    fn test_terminal_state_for_unknown_call_is_ignored() {
        let mut f = fixture();
        let id = CallId::from("x");
        assert!(f
            .registry
            .ingest_call_state_changed(&acc(), &id, "OVER", &HashMap::new())
            .is_none());
        assert!(f
            .registry
            .ingest_call_state_changed(&acc(), &id, "FAILURE", &HashMap::new())
            .is_none());
        assert_eq!(f.registry.call_count(), 0);
        assert!(f.calls.drain().is_empty());
    }

    #[test]
    fn test_incoming_state_is_held_back() {
        let mut f = fixture();
        let id = CallId::from("c1");
        f.registry
            .ingest_call_state_changed(&acc(), &id, "INCOMING", &HashMap::new());
        assert!(f.calls.drain().is_empty());
        assert_eq!(f.registry.call(&id).map(|c| c.status), Some(CallStatus::Ringing));

        f.registry
            .ingest_incoming_call(&acc(), &id, "sip:bob", vec![Media::default_audio()]);
        let published = f.calls.drain();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].media, vec![Media::default_audio()]);
    }

    #[test]
    fn test_over_removes_call_and_implicit_conference() {
        let mut f = fixture();
        with_calls(&mut f, &["c1"]);
        let id = CallId::from("c1");
        f.registry.get_or_create_implicit_conference(&id);
        assert_eq!(f.registry.conference_count(), 1);

        let ended = f
            .registry
            .ingest_call_state_changed(&acc(), &id, "OVER", &HashMap::new())
            .unwrap();
        assert_eq!(ended.status, CallStatus::Over);
        assert!(f.registry.call(&id).is_none());
        assert_eq!(f.registry.conference_count(), 0);
        assert_eq!(f.calls.drain().len(), 1);
    }

    #[test]
    fn test_implicit_conference_is_reused() {
        let mut f = fixture();
        with_calls(&mut f, &["c1"]);
        let id = CallId::from("c1");
        let first = f.registry.get_or_create_implicit_conference(&id).unwrap();
        let second = f.registry.get_or_create_implicit_conference(&id).unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.is_simple_call());
        assert_eq!(f.conferences.drain().len(), 1);
        assert!(f
            .registry
            .get_or_create_implicit_conference(&CallId::from("nope"))
            .is_none());
    }

    #[test]
    fn test_merge_removes_implicit_wrappers() {
        let mut f = fixture();
        with_calls(&mut f, &["a", "b"]);
        f.registry.get_or_create_implicit_conference(&CallId::from("a"));
        f.registry.get_or_create_implicit_conference(&CallId::from("b"));

        let conf_id = ConferenceId::from("conf");
        let snapshot = f
            .registry
            .ingest_conference_created(&acc(), None, &conf_id, &ids(&["a", "b"]), "ACTIVE_ATTACHED")
            .unwrap();

        assert_eq!(participant_set(&snapshot), ids(&["a", "b"]).into_iter().collect());
        assert!(f.registry.conference(&ConferenceId::from("a")).is_none());
        assert!(f.registry.conference(&ConferenceId::from("b")).is_none());
        for id in ["a", "b"] {
            let found = f.registry.conference_of(&CallId::from(id)).unwrap();
            assert_eq!(found.id, conf_id);
            assert_eq!(f.registry.call(&CallId::from(id)).unwrap().conf_id(), Some(&conf_id));
        }
        assert_eq!(f.registry.conference_count(), 1);
        assert_eq!(snapshot.state(), CallStatus::Current);
    }

    #[test]
    fn test_created_skips_unknown_participants() {
        let mut f = fixture();
        with_calls(&mut f, &["a"]);
        let snapshot = f
            .registry
            .ingest_conference_created(
                &acc(),
                None,
                &ConferenceId::from("conf"),
                &ids(&["a", "ghost"]),
                "ACTIVE_ATTACHED",
            )
            .unwrap();
        assert_eq!(snapshot.participant_ids(), ids(&["a"]));
    }

    #[test]
    fn test_created_with_only_unknown_participants_is_dropped() {
        let mut f = fixture();
        let conf_id = ConferenceId::from("conf");
        let created = f.registry.ingest_conference_created(
            &acc(),
            None,
            &conf_id,
            &ids(&["ghost1", "ghost2"]),
            "ACTIVE_ATTACHED",
        );
        assert!(created.is_none());
        assert!(f.registry.conference(&conf_id).is_none());
        assert_eq!(f.registry.conference_count(), 0);
        assert!(f.conferences.drain().is_empty());
    }

    #[test]
    fn test_changed_to_empty_removes_conference() {
        let mut f = fixture();
        with_calls(&mut f, &["a", "b", "c"]);
        let conf_id = ConferenceId::from("conf");
        f.registry
            .ingest_conference_created(&acc(), None, &conf_id, &ids(&["a", "b", "c"]), "ACTIVE_ATTACHED");
        f.conferences.drain();

        let changed = f
            .registry
            .ingest_conference_changed(&acc(), &conf_id, "ACTIVE_ATTACHED", &[]);
        assert!(changed.is_none());
        assert!(f.registry.conference(&conf_id).is_none());
        for id in ["a", "b", "c"] {
            assert!(f.registry.call(&CallId::from(id)).unwrap().conf_id().is_none());
        }

        let published = f.conferences.drain();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, conf_id);
        assert!(published[0].is_empty());
    }

    #[test]
    fn test_changed_for_unknown_conference_with_unknown_calls_is_ignored() {
        let mut f = fixture();
        let conf_id = ConferenceId::from("conf");
        assert!(f
            .registry
            .ingest_conference_changed(&acc(), &conf_id, "ACTIVE_ATTACHED", &ids(&["ghost"]))
            .is_none());
        assert_eq!(f.registry.conference_count(), 0);
        assert!(f.conferences.drain().is_empty());
    }

    #[test]
    fn test_changed_detaches_missing_participant() {
        let mut f = fixture();
        with_calls(&mut f, &["c1", "c2", "c3"]);
        let conf_id = ConferenceId::from("conf");
        f.registry.ingest_conference_created(
            &acc(),
            None,
            &conf_id,
            &ids(&["c1", "c2", "c3"]),
            "ACTIVE_ATTACHED",
        );
        let snapshot = f
            .registry
            .ingest_conference_changed(&acc(), &conf_id, "ACTIVE_ATTACHED", &ids(&["c1", "c2"]))
            .unwrap();

        assert_eq!(participant_set(&snapshot), ids(&["c1", "c2"]).into_iter().collect());
        assert!(f.registry.call(&CallId::from("c3")).unwrap().conf_id().is_none());
        assert_eq!(
            f.registry.call(&CallId::from("c1")).unwrap().conf_id(),
            Some(&conf_id)
        );
    }

    #[test]
    fn test_split_back_to_implicit_conference() {
        let mut f = fixture();
        with_calls(&mut f, &["a", "b"]);
        let conf_id = ConferenceId::from("conf");
        f.registry
            .ingest_conference_created(&acc(), None, &conf_id, &ids(&["a", "b"]), "ACTIVE_ATTACHED");
        f.conferences.drain();

        f.registry
            .ingest_conference_changed(&acc(), &conf_id, "ACTIVE_ATTACHED", &ids(&["a"]));

        let a = CallId::from("a");
        assert!(f.registry.call(&a).unwrap().conf_id().is_none());
        assert!(f.registry.call(&CallId::from("b")).unwrap().conf_id().is_none());

        let framed = f.registry.conference_of(&a).unwrap();
        assert!(framed.is_simple_call());
        assert_eq!(framed.id, ConferenceId::from(&a));

        let published = f.conferences.drain();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].id, conf_id);
        assert!(published[1].is_simple_call());

        f.registry
            .ingest_call_state_changed(&acc(), &a, "OVER", &HashMap::new());
        assert!(f.registry.conference(&conf_id).is_none());
        assert_eq!(f.registry.conference_count(), 0);
    }

    // The split only fires when the report drops participants down to one.
    // It relies on the remaining call's id framing its implicit conference;
    // if the daemon ever reuses the call id as conference id this is a no-op.
    #[test]
    fn test_split_when_conference_id_equals_call_id() {
        let mut f = fixture();
        with_calls(&mut f, &["a", "b"]);
        let conf_id = ConferenceId::from("a");
        f.registry
            .ingest_conference_created(&acc(), None, &conf_id, &ids(&["a", "b"]), "ACTIVE_ATTACHED");
        f.registry
            .ingest_conference_changed(&acc(), &conf_id, "ACTIVE_ATTACHED", &ids(&["a"]));
        let framed = f.registry.conference_of(&CallId::from("a")).unwrap();
        assert!(framed.is_simple_call());
        assert_eq!(f.registry.conference_count(), 1);
    }

    #[test]
    fn test_changed_report_is_idempotent() {
        let mut f = fixture();
        with_calls(&mut f, &["a", "b", "c"]);
        let conf_id = ConferenceId::from("conf");
        let report = ids(&["a", "b"]);
        f.registry
            .ingest_conference_created(&acc(), None, &conf_id, &ids(&["a", "b", "c"]), "ACTIVE_ATTACHED");

        let first = f
            .registry
            .ingest_conference_changed(&acc(), &conf_id, "ACTIVE_ATTACHED", &report)
            .unwrap();
        let count = f.registry.conference_count();
        let second = f
            .registry
            .ingest_conference_changed(&acc(), &conf_id, "ACTIVE_ATTACHED", &report)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(count, f.registry.conference_count());

        // Same after a split.
        let single = ids(&["a"]);
        f.registry
            .ingest_conference_changed(&acc(), &conf_id, "ACTIVE_ATTACHED", &single);
        let calls_before: Vec<Call> = ["a", "b", "c"]
            .iter()
            .filter_map(|id| f.registry.call(&CallId::from(*id)).cloned())
            .collect();
        let framed_before = f.registry.conference_of(&CallId::from("a"));
        let count = f.registry.conference_count();
        f.registry
            .ingest_conference_changed(&acc(), &conf_id, "ACTIVE_ATTACHED", &single);
        let calls_after: Vec<Call> = ["a", "b", "c"]
            .iter()
            .filter_map(|id| f.registry.call(&CallId::from(*id)).cloned())
            .collect();
        assert_eq!(calls_before, calls_after);
        assert_eq!(framed_before, f.registry.conference_of(&CallId::from("a")));
        assert_eq!(count, f.registry.conference_count());
    }

    #[test]
    fn test_participants_track_latest_report() {
        let mut f = fixture();
        with_calls(&mut f, &["a", "b", "c", "d"]);
        let conf_id = ConferenceId::from("conf");
        f.registry
            .ingest_conference_created(&acc(), None, &conf_id, &ids(&["a", "b"]), "ACTIVE_ATTACHED");

        let reports: [&[&str]; 5] = [
            &["a", "b", "c"],
            &["b", "c", "ghost"],
            &["a", "d"],
            &["a", "b", "c", "d"],
            &["d", "c"],
        ];
        for report in reports {
            let snapshot = f
                .registry
                .ingest_conference_changed(&acc(), &conf_id, "ACTIVE_ATTACHED", &ids(report))
                .unwrap();
            let expected: HashSet<CallId> = ids(report)
                .into_iter()
                .filter(|id| f.registry.call(id).is_some())
                .collect();
            assert_eq!(participant_set(&snapshot), expected);
            for id in &expected {
                assert_eq!(f.registry.call(id).unwrap().conf_id(), Some(&conf_id));
            }
        }
    }

    #[test]
    fn test_call_over_detaches_from_conference() {
        let mut f = fixture();
        with_calls(&mut f, &["a", "b", "c"]);
        let conf_id = ConferenceId::from("conf");
        f.registry
            .ingest_conference_created(&acc(), None, &conf_id, &ids(&["a", "b", "c"]), "ACTIVE_ATTACHED");
        f.registry
            .ingest_call_state_changed(&acc(), &CallId::from("c"), "OVER", &HashMap::new());
        let snapshot = f.registry.conference(&conf_id).unwrap();
        assert_eq!(participant_set(&snapshot), ids(&["a", "b"]).into_iter().collect());
    }

    #[test]
    fn test_conference_removed_clears_membership() {
        let mut f = fixture();
        with_calls(&mut f, &["a", "b"]);
        let conf_id = ConferenceId::from("conf");
        f.registry
            .ingest_conference_created(&acc(), None, &conf_id, &ids(&["a", "b"]), "ACTIVE_ATTACHED");
        f.conferences.drain();

        let last = f.registry.ingest_conference_removed(&conf_id).unwrap();
        assert!(last.is_empty());
        assert!(f.registry.conference(&conf_id).is_none());
        assert!(f.registry.call(&CallId::from("a")).unwrap().conf_id().is_none());
        assert_eq!(f.conferences.drain().len(), 1);
        assert!(f.registry.ingest_conference_removed(&conf_id).is_none());
    }

    #[test]
    fn test_host_call_lifecycle() {
        let mut f = fixture();
        let conversation = ConversationId::from("swarm1");
        let host = Call::provisional(
            acc(),
            Uri::swarm(&conversation),
            Some(conversation.clone()),
            vec![Media::default_audio()],
        );
        f.registry.park_host_call(host);
        assert!(f.registry.pending_host(&conversation).is_some());

        let conf_id = ConferenceId::from("conf");
        let snapshot = f
            .registry
            .ingest_conference_created(&acc(), Some(&conversation), &conf_id, &[], "ACTIVE_ATTACHED")
            .unwrap();
        let host = snapshot.host_call.clone().unwrap();
        assert_eq!(host.conf_id(), Some(&conf_id));
        assert_eq!(snapshot.state(), CallStatus::Current);
        assert!(f.registry.pending_host(&conversation).is_none());

        f.registry
            .ingest_conference_changed(&acc(), &conf_id, "ACTIVE_DETACHED", &[]);
        assert_eq!(f.registry.conference(&conf_id).unwrap().state(), CallStatus::Hold);

        f.calls.drain();
        f.registry.ingest_conference_removed(&conf_id);
        let published = f.calls.drain();
        assert_eq!(published.last().map(|c| c.status), Some(CallStatus::Over));
    }

    #[test]
    fn test_mute_publishing_rules() {
        let mut f = fixture();
        let id = CallId::from("c1");
        f.registry
            .ingest_call_state_changed(&acc(), &id, "RINGING", &HashMap::new());
        f.calls.drain();

        f.registry.ingest_audio_muted("c1", true);
        assert!(f.calls.drain().is_empty());
        assert!(f.registry.call(&id).unwrap().audio_muted);

        f.registry
            .ingest_call_state_changed(&acc(), &id, "CURRENT", &HashMap::new());
        f.calls.drain();
        f.registry.ingest_video_muted("c1", true);
        assert_eq!(f.calls.drain().len(), 1);

        f.registry.get_or_create_implicit_conference(&id);
        f.registry
            .ingest_call_state_changed(&acc(), &CallId::from("c2"), "CURRENT", &HashMap::new());
        f.registry.ingest_conference_created(
            &acc(),
            None,
            &ConferenceId::from("conf"),
            &ids(&["c1", "c2"]),
            "ACTIVE_ATTACHED",
        );
        f.conferences.drain();
        f.registry.ingest_audio_muted("conf", true);
        let published = f.conferences.drain();
        assert_eq!(published.len(), 1);
        assert!(published[0].audio_muted);
    }

    #[test]
    fn test_conference_info_and_recording() {
        let mut f = fixture();
        let mut details = HashMap::new();
        details.insert("PEER_NUMBER".to_string(), "sip:bob".to_string());
        f.registry
            .ingest_call_state_changed(&acc(), &CallId::from("a"), "CURRENT", &details);
        details.insert("PEER_NUMBER".to_string(), "sip:carol".to_string());
        f.registry
            .ingest_call_state_changed(&acc(), &CallId::from("b"), "CURRENT", &details);
        let conf_id = ConferenceId::from("conf");
        f.registry
            .ingest_conference_created(&acc(), None, &conf_id, &ids(&["a", "b"]), "ACTIVE_ATTACHED");

        let entries = vec![
            HashMap::from([
                ("uri".to_string(), String::new()),
                ("device".to_string(), "me".to_string()),
                ("isModerator".to_string(), "true".to_string()),
            ]),
            HashMap::from([("uri".to_string(), "sip:bob".to_string())]),
            HashMap::from([("active".to_string(), "true".to_string())]),
        ];
        let snapshot = f.registry.ingest_conference_info(&conf_id, &entries).unwrap();
        assert!(snapshot.is_moderator);
        assert_eq!(snapshot.info.len(), 2);
        assert_eq!(snapshot.info[1].call_id, Some(CallId::from("a")));

        f.conferences.drain();
        f.registry.ingest_remote_recording("a", "sip:bob", true);
        let published = f.conferences.drain();
        assert_eq!(published.len(), 1);
        assert!(published[0].is_recording());

        assert!(f
            .registry
            .ingest_conference_info(&ConferenceId::from("missing"), &entries)
            .is_none());
    }

    #[test]
    fn test_current_conferences() {
        let mut f = fixture();
        with_calls(&mut f, &["a", "b"]);
        f.registry
            .ingest_call_state_changed(&acc(), &CallId::from("r"), "RINGING", &HashMap::new());
        f.registry.get_or_create_implicit_conference(&CallId::from("a"));
        f.registry.get_or_create_implicit_conference(&CallId::from("r"));
        let current = f.registry.current_conferences();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, ConferenceId::from("a"));
    }
}
