use serde::Serialize;
use tokio::task::JoinHandle;

use confab_media::{Call, ConferenceSnapshot};
use confab_net::EventBus;
use confab_store::ConversationEvent;

pub const EVENT_CALL_UPDATED: &str = "call-updated";
pub const EVENT_CONFERENCE_UPDATED: &str = "conference-updated";
pub const EVENT_CONVERSATION_CHANGED: &str = "conversation-changed";

/// The three published topics of a session.
#[derive(Debug, Clone)]
pub struct SessionBus {
    pub calls: EventBus<Call>,
    pub conferences: EventBus<ConferenceSnapshot>,
    pub conversations: EventBus<ConversationEvent>,
}

impl SessionBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            calls: EventBus::new(capacity),
            conferences: EventBus::new(capacity),
            conversations: EventBus::new(capacity),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventPayload {
    pub event: &'static str,
    pub payload: serde_json::Value,
}

pub fn to_payload<S: Serialize>(event: &'static str, value: &S) -> Option<EventPayload> {
    match serde_json::to_value(value) {
        Ok(payload) => Some(EventPayload { event, payload }),
        Err(e) => {
            tracing::error!(event, error = %e, "Failed to serialize event");
            None
        }
    }
}

/// Forward every topic to `sink` as named JSON payloads. The task ends once
/// every publisher of the bus is gone.
pub fn spawn_forwarder<F>(bus: &SessionBus, mut sink: F) -> JoinHandle<()>
where
    F: FnMut(EventPayload) + Send + 'static,
{
    let mut calls = bus.calls.subscribe();
    let mut conferences = bus.conferences.subscribe();
    let mut conversations = bus.conversations.subscribe();

    tokio::spawn(async move {
        loop {
            let payload = tokio::select! {
                Some(call) = calls.recv() => to_payload(EVENT_CALL_UPDATED, &call),
                Some(conf) = conferences.recv() => to_payload(EVENT_CONFERENCE_UPDATED, &conf),
                Some(event) = conversations.recv() => to_payload(EVENT_CONVERSATION_CHANGED, &event),
                else => break,
            };
            if let Some(payload) = payload {
                sink(payload);
            }
        }
        tracing::debug!("Event forwarder stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use confab_shared::types::{AccountId, CallId, CallStatus, Direction, Uri};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_forwarder_names_payloads() {
        let bus = SessionBus::new(16);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = spawn_forwarder(&bus, move |p| {
            let _ = tx.send(p);
        });

        let mut call = Call::new(
            CallId::from("c1"),
            AccountId::from("acc"),
            Direction::Incoming,
            Uri::parse("sip:bob"),
            None,
        );
        call.set_status(CallStatus::Ringing);
        bus.calls.publish(call);

        let payload = rx.recv().await.unwrap();
        assert_eq!(payload.event, EVENT_CALL_UPDATED);
        assert_eq!(payload.payload["status"], "Ringing");
        assert_eq!(payload.payload["id"], "c1");

        drop(bus);
        task.await.unwrap();
    }
}
