//! The session task.
//!
//! One task owns all call, conference and conversation state. Daemon events
//! and user commands are funnelled through two channels and handled strictly
//! one at a time, so nothing in [`SessionState`] needs a lock.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use confab_net::DaemonBoundary;
use confab_shared::protocol::DaemonEvent;

use crate::capability::CallGate;
use crate::commands::calls::CallCommand;
use crate::commands::conference::ConferenceCommand;
use crate::commands::conversations::ConversationCommand;
use crate::commands::queries::QueryCommand;
use crate::commands::SessionHandle;
use crate::config::SessionConfig;
use crate::events::SessionBus;
use crate::state::SessionState;

/// Commands accepted by the session task.
pub enum SessionCommand {
    Call(CallCommand),
    Conference(ConferenceCommand),
    Conversation(ConversationCommand),
    Query(QueryCommand),
    Shutdown,
}

/// Spawn the session task.
///
/// Returns the handle used to issue commands and the sender the daemon
/// adapter feeds events into. Events are always drained before pending
/// commands, so a command sent after an event observes its effect.
pub async fn spawn_session(
    boundary: Arc<dyn DaemonBoundary>,
    gate: Arc<dyn CallGate>,
    config: SessionConfig,
) -> anyhow::Result<(SessionHandle, mpsc::Sender<DaemonEvent>)> {
    anyhow::ensure!(config.command_capacity > 0, "command capacity must be positive");
    anyhow::ensure!(config.event_capacity > 0, "event capacity must be positive");
    anyhow::ensure!(config.bus_capacity > 0, "bus capacity must be positive");

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SessionCommand>(config.command_capacity);
    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(config.event_capacity);

    let bus = SessionBus::new(config.bus_capacity);
    let handle = SessionHandle::new(cmd_tx.clone(), gate.clone(), bus.clone(), config.load_count);
    let mut state = SessionState::new(boundary, gate, bus, config, cmd_tx.downgrade());
    drop(cmd_tx);

    info!("Session started");

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                event = event_rx.recv() => {
                    match event {
                        Some(event) => state.handle_event(event),
                        None => {
                            info!("Daemon event channel closed, stopping session");
                            break;
                        }
                    }
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Shutdown) => {
                            info!("Shutting down session");
                            break;
                        }
                        Some(cmd) => state.handle_command(cmd),
                        None => {
                            info!("All session handles dropped, stopping session");
                            break;
                        }
                    }
                }
            }
        }
        debug!(
            calls = state.registry.call_count(),
            conferences = state.registry.conference_count(),
            "Session stopped"
        );
    });

    Ok((handle, event_tx))
}

impl SessionState {
    pub fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Call(cmd) => self.handle_call_command(cmd),
            SessionCommand::Conference(cmd) => self.handle_conference_command(cmd),
            SessionCommand::Conversation(cmd) => self.handle_conversation_command(cmd),
            SessionCommand::Query(cmd) => self.handle_query(cmd),
            SessionCommand::Shutdown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use futures::future::{self, BoxFuture, FutureExt};

    use super::*;
    use crate::capability::{AllowAll, GateDecision, PlaceCallRequest};
    use confab_media::{Call, TrackState};
    use confab_net::RecordingBoundary;
    use confab_shared::error::{CallError, LoadError};
    use confab_shared::protocol::{DaemonCommand, RawSwarmMessage};
    use confab_shared::types::{
        AccountId, CallId, CallStatus, ConferenceId, ConversationId, Media, MediaType, Uri,
    };

    fn acc() -> AccountId {
        AccountId::from("acc")
    }

    async fn session(
        gate: Arc<dyn CallGate>,
    ) -> (Arc<RecordingBoundary>, SessionHandle, mpsc::Sender<DaemonEvent>) {
        let boundary = Arc::new(RecordingBoundary::new());
        let (handle, events) = spawn_session(boundary.clone(), gate, SessionConfig::default())
            .await
            .unwrap();
        (boundary, handle, events)
    }

    fn state(call: &str, state: &str) -> DaemonEvent {
        DaemonEvent::CallStateChanged {
            account: acc(),
            call_id: CallId::from(call),
            state: state.to_string(),
            detail_code: 0,
            details: HashMap::new(),
        }
    }

    fn media_map(kind: MediaType, muted: bool) -> HashMap<String, String> {
        let media = match kind {
            MediaType::Audio => Media::default_audio(),
            MediaType::Video => Media::default_video(),
        };
        media.with_muted(muted).to_map()
    }

    struct DenyAll;

    impl CallGate for DenyAll {
        fn request_place_call(&self, _: &PlaceCallRequest) -> BoxFuture<'static, GateDecision> {
            future::ready(GateDecision::Denied).boxed()
        }

        fn request_incoming_call(&self, _: &Call) -> BoxFuture<'static, GateDecision> {
            future::ready(GateDecision::Denied).boxed()
        }
    }

    #[derive(Default)]
    struct Binding {
        bound: Arc<Mutex<Vec<Option<CallId>>>>,
    }

    impl CallGate for Binding {
        fn request_place_call(&self, _: &PlaceCallRequest) -> BoxFuture<'static, GateDecision> {
            let bound = self.bound.clone();
            future::ready(GateDecision::AllowedWithBinding(Box::new(move |call| {
                bound.lock().unwrap().push(call.and_then(|c| c.id));
            })))
            .boxed()
        }

        fn request_incoming_call(&self, _: &Call) -> BoxFuture<'static, GateDecision> {
            future::ready(GateDecision::Allowed).boxed()
        }
    }

    #[tokio::test]
    async fn test_spawn_rejects_zero_capacity() {
        let config = SessionConfig {
            command_capacity: 0,
            ..SessionConfig::default()
        };
        let result = spawn_session(Arc::new(RecordingBoundary::new()), Arc::new(AllowAll), config).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_place_call_lifecycle() {
        let (boundary, handle, events) = session(Arc::new(AllowAll)).await;
        boundary.script_call_id("c1");
        let mut calls = handle.bus().calls.subscribe();

        let call = handle
            .place_call(acc(), None, &Uri::parse("sip:alice"), false)
            .await
            .unwrap();
        assert_eq!(call.id, Some(CallId::from("c1")));
        assert_eq!(call.media.len(), 1);
        assert_eq!(call.media[0].media_type, MediaType::Audio);
        match &boundary.commands()[0] {
            DaemonCommand::PlaceCall { to, media, .. } => {
                assert_eq!(to, &Uri::parse("sip:alice"));
                assert_eq!(media.len(), 1);
            }
            other => panic!("unexpected command {other:?}"),
        }

        for s in ["RINGING", "CURRENT", "OVER"] {
            events.send(state("c1", s)).await.unwrap();
        }
        let statuses: Vec<CallStatus> = vec![
            calls.recv().await.unwrap().status,
            calls.recv().await.unwrap().status,
            calls.recv().await.unwrap().status,
        ];
        assert_eq!(
            statuses,
            vec![CallStatus::Ringing, CallStatus::Current, CallStatus::Over]
        );
        assert!(handle.call(&CallId::from("c1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_place_call_with_video() {
        let (boundary, handle, _events) = session(Arc::new(AllowAll)).await;
        boundary.script_call_id("c1");
        let call = handle
            .place_call(acc(), None, &Uri::parse("sip:alice"), true)
            .await
            .unwrap();
        assert!(call.has_media(MediaType::Video));
        assert_eq!(call.media.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_call_id_without_swarm() {
        let (boundary, handle, _events) = session(Arc::new(AllowAll)).await;
        boundary.script_call_id("");
        let result = handle
            .place_call(acc(), None, &Uri::parse("sip:alice"), false)
            .await;
        assert_eq!(result.unwrap_err(), CallError::EmptyCallId);
    }

    #[tokio::test]
    async fn test_provisional_swarm_call_becomes_host() {
        let (boundary, handle, events) = session(Arc::new(AllowAll)).await;
        boundary.script_call_id("");
        let conversation = ConversationId::from("conv1");
        let target = Uri::swarm(&conversation);

        let call = handle
            .place_call(acc(), Some(&target), &target, false)
            .await
            .unwrap();
        assert!(call.is_provisional());

        let mut conferences = handle.bus().conferences.subscribe();
        events
            .send(DaemonEvent::ConferenceCreated {
                account: acc(),
                conversation: Some(conversation.clone()),
                conf_id: ConferenceId::from("conf1"),
                participants: vec![],
                state: "ACTIVE_ATTACHED".to_string(),
            })
            .await
            .unwrap();

        let snapshot = conferences.recv().await.unwrap();
        assert_eq!(snapshot.id, ConferenceId::from("conf1"));
        let host = snapshot.host_call.unwrap();
        assert_eq!(host.conversation, Some(conversation));
        assert_eq!(host.conf_id(), Some(&ConferenceId::from("conf1")));
    }

    #[tokio::test]
    async fn test_denied_place_issues_nothing() {
        let (boundary, handle, _events) = session(Arc::new(DenyAll)).await;
        let result = handle
            .place_call(acc(), None, &Uri::parse("sip:alice"), false)
            .await;
        assert_eq!(result.unwrap_err(), CallError::NotAllowed);
        assert!(boundary.commands().is_empty());
    }

    #[tokio::test]
    async fn test_binding_receives_placed_call() {
        let gate = Arc::new(Binding::default());
        let bound = gate.bound.clone();
        let (boundary, handle, _events) = session(gate).await;
        boundary.script_call_id("c7");
        handle
            .place_call(acc(), None, &Uri::parse("sip:alice"), false)
            .await
            .unwrap();
        assert_eq!(*bound.lock().unwrap(), vec![Some(CallId::from("c7"))]);
    }

    #[tokio::test]
    async fn test_binding_told_of_failure() {
        let gate = Arc::new(Binding::default());
        let bound = gate.bound.clone();
        let (boundary, handle, _events) = session(gate).await;
        boundary.fail("place-call", "no route");
        let result = handle
            .place_call(acc(), None, &Uri::parse("sip:alice"), false)
            .await;
        assert!(matches!(result, Err(CallError::Boundary(_))));
        assert_eq!(*bound.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn test_denied_incoming_call_is_refused() {
        let (boundary, _handle, events) = session(Arc::new(DenyAll)).await;
        events
            .send(DaemonEvent::IncomingCall {
                account: acc(),
                call_id: CallId::from("in1"),
                from: "sip:mallory".to_string(),
                media: vec![media_map(MediaType::Audio, false)],
            })
            .await
            .unwrap();

        let refused = |c: &DaemonCommand| matches!(c, DaemonCommand::Refuse { call_id, .. } if call_id.as_str() == "in1");
        for _ in 0..50 {
            if boundary.count(refused) == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("incoming call was not refused");
    }

    #[tokio::test]
    async fn test_accept_mutes_declined_video() {
        let (boundary, handle, events) = session(Arc::new(AllowAll)).await;
        events
            .send(DaemonEvent::IncomingCall {
                account: acc(),
                call_id: CallId::from("in1"),
                from: "sip:bob".to_string(),
                media: vec![
                    media_map(MediaType::Audio, false),
                    media_map(MediaType::Video, false),
                ],
            })
            .await
            .unwrap();

        handle.accept(&CallId::from("in1"), false).await.unwrap();
        let accepted = boundary
            .commands()
            .into_iter()
            .find_map(|c| match c {
                DaemonCommand::Accept { media, .. } => Some(media),
                _ => None,
            })
            .unwrap();
        let video = accepted
            .iter()
            .find(|m| m.media_type == MediaType::Video)
            .unwrap();
        assert!(video.muted);

        let call = handle.call(&CallId::from("in1")).await.unwrap().unwrap();
        assert!(call.media.iter().any(|m| m.media_type == MediaType::Video && m.muted));
    }

    #[tokio::test]
    async fn test_media_change_is_answered() {
        let (boundary, handle, events) = session(Arc::new(AllowAll)).await;
        boundary.script_call_id("c1");
        handle
            .place_call(acc(), None, &Uri::parse("sip:alice"), false)
            .await
            .unwrap();
        events.send(state("c1", "CURRENT")).await.unwrap();
        events
            .send(DaemonEvent::MediaChangeRequested {
                account: acc(),
                call_id: CallId::from("c1"),
                media: vec![
                    media_map(MediaType::Audio, false),
                    media_map(MediaType::Video, false),
                ],
            })
            .await
            .unwrap();

        // Queries are handled after pending events.
        handle.call(&CallId::from("c1")).await.unwrap();
        let answer = boundary
            .commands()
            .into_iter()
            .find_map(|c| match c {
                DaemonCommand::AnswerMediaChange { media, .. } => Some(media),
                _ => None,
            })
            .unwrap();
        assert_eq!(answer.len(), 2);
        assert!(answer[1].muted);
        assert!(!answer[0].muted);
    }

    #[tokio::test]
    async fn test_commands_on_unknown_call_are_ignored() {
        let (boundary, handle, _events) = session(Arc::new(AllowAll)).await;
        handle.hang_up(&CallId::from("ghost")).await.unwrap();
        handle.hold(&CallId::from("ghost")).await.unwrap();
        assert!(boundary.commands().is_empty());
    }

    #[tokio::test]
    async fn test_hang_up_any_targets_conference() {
        let (boundary, handle, events) = session(Arc::new(AllowAll)).await;
        for id in ["c1", "c2"] {
            boundary.script_call_id(id);
            handle
                .place_call(acc(), None, &Uri::parse(&format!("sip:{id}")), false)
                .await
                .unwrap();
            events.send(state(id, "CURRENT")).await.unwrap();
        }
        events
            .send(DaemonEvent::ConferenceCreated {
                account: acc(),
                conversation: None,
                conf_id: ConferenceId::from("conf1"),
                participants: vec![CallId::from("c1"), CallId::from("c2")],
                state: "ACTIVE_ATTACHED".to_string(),
            })
            .await
            .unwrap();

        boundary.clear();
        handle.hang_up_any(&CallId::from("c1")).await.unwrap();
        assert_eq!(
            boundary.commands(),
            vec![DaemonCommand::HangUpConference {
                account: acc(),
                conf_id: ConferenceId::from("conf1"),
            }]
        );
    }

    #[tokio::test]
    async fn test_hold_call_or_conference_dispatch() {
        let (boundary, handle, events) = session(Arc::new(AllowAll)).await;
        boundary.script_call_id("c1");
        handle
            .place_call(acc(), None, &Uri::parse("sip:alice"), false)
            .await
            .unwrap();
        events.send(state("c1", "CURRENT")).await.unwrap();

        let observer = handle.observe_conference("c1").await.unwrap();
        assert!(observer.tracker().anchor().is_simple_call());

        boundary.clear();
        handle.hold_call_or_conference("c1").await.unwrap();
        assert_eq!(
            boundary.commands(),
            vec![DaemonCommand::Hold {
                account: acc(),
                call_id: CallId::from("c1"),
            }]
        );
    }

    #[tokio::test]
    async fn test_observe_unknown_conference() {
        let (_boundary, handle, _events) = session(Arc::new(AllowAll)).await;
        let result = handle.observe_conference("nope").await;
        assert!(matches!(result, Err(CallError::UnknownCall(_))));
    }

    #[tokio::test]
    async fn test_observe_follows_merge() {
        let (boundary, handle, events) = session(Arc::new(AllowAll)).await;
        for id in ["c1", "c2"] {
            boundary.script_call_id(id);
            handle
                .place_call(acc(), None, &Uri::parse(&format!("sip:{id}")), false)
                .await
                .unwrap();
            events.send(state(id, "CURRENT")).await.unwrap();
        }

        let mut observer = handle.observe_conference("c1").await.unwrap();
        let first = observer.next().await.unwrap();
        assert_eq!(first.id, ConferenceId::from("c1"));

        events
            .send(DaemonEvent::ConferenceCreated {
                account: acc(),
                conversation: None,
                conf_id: ConferenceId::from("conf1"),
                participants: vec![CallId::from("c1"), CallId::from("c2")],
                state: "ACTIVE_ATTACHED".to_string(),
            })
            .await
            .unwrap();

        let merged = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let snapshot = observer.next().await.unwrap();
                if snapshot.id == ConferenceId::from("conf1") {
                    return snapshot;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(merged.participants.len(), 2);
        assert_eq!(
            observer.tracker().state(),
            &TrackState::Upgraded {
                from: ConferenceId::from("c1"),
                to: ConferenceId::from("conf1"),
            }
        );
    }

    fn ready(conversation: &str) -> DaemonEvent {
        DaemonEvent::ConversationReady {
            account: acc(),
            conversation: ConversationId::from(conversation),
            info: HashMap::from([("mode".to_string(), "2".to_string())]),
            members: vec![],
        }
    }

    fn message(id: &str, parent: &str) -> RawSwarmMessage {
        RawSwarmMessage::new([
            ("id", id),
            ("type", "text/plain"),
            ("author", "peer"),
            ("linearizedParent", parent),
            ("timestamp", "1700000000"),
            ("body", "hi"),
        ])
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_request() {
        let (boundary, handle, events) = session(Arc::new(AllowAll)).await;
        let conversation = ConversationId::from("conv1");
        events.send(ready("conv1")).await.unwrap();

        // Settle the initial page and its follow-up.
        for batch in [vec![message("m2", "m1")], vec![]] {
            handle.conversation(&conversation).await.unwrap();
            let request = boundary.last_request_id().unwrap();
            events
                .send(DaemonEvent::SwarmLoaded {
                    request_id: request,
                    account: acc(),
                    conversation: conversation.clone(),
                    messages: batch,
                })
                .await
                .unwrap();
        }
        handle.conversation(&conversation).await.unwrap();
        let before = boundary.load_requests().len();
        assert_eq!(before, 2);

        let first = handle.load_more_handle(&conversation, Some(10)).await.unwrap();
        let second = handle.load_more_handle(&conversation, Some(10)).await.unwrap();
        assert_eq!(boundary.load_requests().len(), before + 1);

        let request = boundary.last_request_id().unwrap();
        events
            .send(DaemonEvent::SwarmLoaded {
                request_id: request,
                account: acc(),
                conversation: conversation.clone(),
                messages: vec![message("m1", "")],
            })
            .await
            .unwrap();

        let (a, b) = futures::join!(first, second);
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert!(a.interactions.iter().any(|i| i.id.as_str() == "m1"));
    }

    #[tokio::test]
    async fn test_load_on_syncing_conversation_is_noop() {
        let (boundary, handle, events) = session(Arc::new(AllowAll)).await;
        let conversation = ConversationId::from("conv1");
        events
            .send(DaemonEvent::ConversationSyncing {
                account: acc(),
                conversation: conversation.clone(),
            })
            .await
            .unwrap();

        let snapshot = handle.load_more(&conversation, None).await.unwrap();
        assert!(snapshot.interactions.is_empty());
        assert!(boundary.load_requests().is_empty());
    }

    #[tokio::test]
    async fn test_load_unknown_conversation() {
        let (_boundary, handle, _events) = session(Arc::new(AllowAll)).await;
        let result = handle.load_more(&ConversationId::from("nope"), None).await;
        assert!(matches!(result, Err(LoadError::UnknownConversation(_))));
    }

    #[tokio::test]
    async fn test_send_message_reaches_daemon() {
        let (boundary, handle, events) = session(Arc::new(AllowAll)).await;
        let conversation = ConversationId::from("conv1");
        events.send(ready("conv1")).await.unwrap();

        handle
            .send_message(&conversation, "hello", None)
            .await
            .unwrap();
        assert_eq!(
            boundary.count(|c| matches!(c, DaemonCommand::SendMessage { body, .. } if body == "hello")),
            1
        );
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let (_boundary, handle, _events) = session(Arc::new(AllowAll)).await;
        handle.shutdown().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let result = handle.call(&CallId::from("c1")).await;
        assert_eq!(result.unwrap_err(), CallError::SessionClosed);
    }
}
