//! State owned by the session task.
//!
//! [`SessionState`] is never shared: the session loop in [`crate::service`]
//! owns it and applies daemon events and commands to it one at a time, so
//! the registry and the overlay never see concurrent mutation.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use confab_media::{Call, CallRegistry};
use confab_net::{fire_and_forget, DaemonBoundary};
use confab_shared::protocol::{DaemonCommand, DaemonEvent};
use confab_shared::types::{AccountId, CallId, ConferenceId, Media};
use confab_store::SwarmOverlay;

use crate::capability::{CallGate, GateDecision};
use crate::commands::calls::CallCommand;
use crate::config::SessionConfig;
use crate::events::SessionBus;
use crate::service::SessionCommand;

pub struct SessionState {
    pub(crate) registry: CallRegistry,
    pub(crate) overlay: SwarmOverlay,
    pub(crate) boundary: Arc<dyn DaemonBoundary>,
    pub(crate) gate: Arc<dyn CallGate>,
    pub(crate) bus: SessionBus,
    pub(crate) config: SessionConfig,
    /// Lets tasks spawned by the session post follow-up commands without
    /// keeping the session alive.
    pub(crate) commands: mpsc::WeakSender<SessionCommand>,
}

impl SessionState {
    pub fn new(
        boundary: Arc<dyn DaemonBoundary>,
        gate: Arc<dyn CallGate>,
        bus: SessionBus,
        config: SessionConfig,
        commands: mpsc::WeakSender<SessionCommand>,
    ) -> Self {
        Self {
            registry: CallRegistry::new(bus.calls.clone(), bus.conferences.clone()),
            overlay: SwarmOverlay::new(bus.conversations.clone())
                .with_ready_load_count(config.ready_load_count),
            boundary,
            gate,
            bus,
            config,
            commands,
        }
    }

    /// Account owning a call or conference id.
    pub(crate) fn account_for(&self, id: &str) -> Option<AccountId> {
        self.registry
            .call(&CallId::from(id))
            .map(|c| c.account.clone())
            .or_else(|| {
                self.registry
                    .conference(&ConferenceId::from(id))
                    .map(|c| c.account)
            })
    }

    /// Issue a command whose outcome arrives as a later daemon event.
    pub(crate) fn fire(&self, command: DaemonCommand) {
        fire_and_forget(self.boundary.as_ref(), command);
    }

    pub fn handle_event(&mut self, event: DaemonEvent) {
        debug!(event = event.name(), "Daemon event");
        let boundary = self.boundary.clone();
        let boundary = boundary.as_ref();

        match event {
            // --- Calls ---
            DaemonEvent::CallStateChanged {
                account,
                call_id,
                state,
                detail_code,
                details,
            } => {
                debug!(call = %call_id, state = %state, code = detail_code, "Call state");
                self.registry
                    .ingest_call_state_changed(&account, &call_id, &state, &details);
            }
            DaemonEvent::IncomingCall {
                account,
                call_id,
                from,
                media,
            } => {
                let media = media.iter().filter_map(Media::from_map).collect();
                let call = self
                    .registry
                    .ingest_incoming_call(&account, &call_id, &from, media);
                self.gate_incoming(call);
            }
            DaemonEvent::MediaNegotiationStatus {
                call_id,
                event,
                media,
            } => {
                debug!(call = %call_id, event = %event, "Media negotiation");
                let media = media.iter().filter_map(Media::from_map).collect();
                self.registry.ingest_media_negotiation(&call_id, media);
            }
            DaemonEvent::MediaChangeRequested {
                account,
                call_id,
                media,
            } => {
                let proposed: Vec<Media> = media.iter().filter_map(Media::from_map).collect();
                match self.registry.call(&call_id) {
                    Some(call) => {
                        let answer = call.media_change_answer(&proposed);
                        self.fire(DaemonCommand::AnswerMediaChange {
                            account,
                            call_id,
                            media: answer,
                        });
                    }
                    None => debug!(call = %call_id, "Media change for unknown call"),
                }
            }
            DaemonEvent::AudioMuted { id, muted } => self.registry.ingest_audio_muted(&id, muted),
            DaemonEvent::VideoMuted { id, muted } => self.registry.ingest_video_muted(&id, muted),
            DaemonEvent::RemoteRecordingChanged {
                id,
                peer,
                recording,
            } => self.registry.ingest_remote_recording(&id, &peer, recording),

            // --- Conferences ---
            DaemonEvent::ConferenceCreated {
                account,
                conversation,
                conf_id,
                participants,
                state,
            } => {
                self.registry.ingest_conference_created(
                    &account,
                    conversation.as_ref(),
                    &conf_id,
                    &participants,
                    &state,
                );
            }
            DaemonEvent::ConferenceChanged {
                account,
                conf_id,
                state,
                participants,
            } => {
                self.registry
                    .ingest_conference_changed(&account, &conf_id, &state, &participants);
            }
            DaemonEvent::ConferenceRemoved { conf_id, .. } => {
                self.registry.ingest_conference_removed(&conf_id);
            }
            DaemonEvent::ConferenceInfoUpdated { conf_id, info } => {
                self.registry.ingest_conference_info(&conf_id, &info);
            }

            // --- Swarm ---
            DaemonEvent::SwarmLoaded {
                request_id,
                conversation,
                messages,
                ..
            } => {
                self.overlay
                    .ingest_swarm_loaded(boundary, request_id, &conversation, &messages);
            }
            DaemonEvent::SwarmMessageReceived {
                conversation,
                message,
                ..
            } => {
                self.overlay
                    .ingest_message_received(boundary, &conversation, &message);
            }
            DaemonEvent::SwarmMessageUpdated {
                conversation,
                message,
                ..
            } => {
                self.overlay
                    .ingest_message_updated(boundary, &conversation, &message);
            }
            DaemonEvent::MessageStatusChanged {
                conversation,
                message,
                contact,
                status,
                ..
            } => {
                self.overlay
                    .ingest_message_status(&conversation, &message, &contact, status);
            }
            DaemonEvent::ConversationReady {
                account,
                conversation,
                info,
                members,
            } => {
                self.overlay
                    .ingest_conversation_ready(boundary, &account, &conversation, &info, &members);
            }
            DaemonEvent::ConversationSyncing {
                account,
                conversation,
            } => self.overlay.ingest_conversation_syncing(&account, &conversation),
            DaemonEvent::ConversationRemoved { conversation, .. } => {
                self.overlay.ingest_conversation_removed(&conversation)
            }
            DaemonEvent::ConversationRequestReceived {
                account,
                conversation,
                metadata,
            } => self
                .overlay
                .ingest_request_received(&account, &conversation, &metadata),
            DaemonEvent::ConversationRequestDeclined { conversation, .. } => {
                self.overlay.ingest_request_declined(&conversation)
            }
            DaemonEvent::ConversationMemberEvent {
                conversation,
                uri,
                event,
                ..
            } => self.overlay.ingest_member_event(&conversation, &uri, event),
            DaemonEvent::ConversationProfileUpdated {
                conversation,
                profile,
                ..
            } => self.overlay.ingest_profile_updated(&conversation, &profile),
        }
    }

    /// Ask the gate about an incoming call. A denial refuses the call
    /// through the session so the refusal is ordered with other commands.
    fn gate_incoming(&self, call: Call) {
        let decision = self.gate.request_incoming_call(&call);
        let commands = self.commands.clone();
        tokio::spawn(async move {
            match decision.await {
                GateDecision::Denied => {
                    let Some(id) = call.id.clone() else {
                        return;
                    };
                    info!(call = %id, "Incoming call denied");
                    let Some(tx) = commands.upgrade() else {
                        return;
                    };
                    let (reply, _) = oneshot::channel();
                    let _ = tx
                        .send(SessionCommand::Call(CallCommand::Refuse { call: id, reply }))
                        .await;
                }
                decision => decision.bind(Some(call)),
            }
        });
    }
}
