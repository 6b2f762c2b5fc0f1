//! A [`DaemonBoundary`] that records every command instead of talking to a
//! daemon. Replies can be scripted per command kind.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use confab_shared::error::BoundaryError;
use confab_shared::protocol::{CommandReply, DaemonCommand};
use confab_shared::types::ConversationId;
use tracing::debug;

use crate::boundary::DaemonBoundary;

#[derive(Debug, Default)]
pub struct RecordingBoundary {
    commands: Mutex<Vec<DaemonCommand>>,
    call_ids: Mutex<VecDeque<String>>,
    failures: Mutex<HashMap<&'static str, BoundaryError>>,
    requests: Mutex<Vec<(u32, DaemonCommand)>>,
    next_request: AtomicU32,
}

impl RecordingBoundary {
    pub fn new() -> Self {
        Self {
            next_request: AtomicU32::new(1),
            ..Default::default()
        }
    }

    /// Queue the id returned by the next place-call. An empty string
    /// simulates a daemon that has not assigned an id yet.
    pub fn script_call_id(&self, id: impl Into<String>) {
        lock(&self.call_ids).push_back(id.into());
    }

    /// Make every command named `command` fail until cleared.
    pub fn fail(&self, command: &'static str, reason: impl Into<String>) {
        lock(&self.failures).insert(
            command,
            BoundaryError::Rejected {
                command,
                reason: reason.into(),
            },
        );
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    pub fn commands(&self) -> Vec<DaemonCommand> {
        lock(&self.commands).clone()
    }

    pub fn count<F: Fn(&DaemonCommand) -> bool>(&self, f: F) -> usize {
        lock(&self.commands).iter().filter(|c| f(c)).count()
    }

    /// Request ids handed out so far for history loads, oldest first.
    pub fn load_requests(&self) -> Vec<(u32, DaemonCommand)> {
        lock(&self.requests).clone()
    }

    /// Id of the most recent history load.
    pub fn last_request_id(&self) -> Option<u32> {
        lock(&self.requests).last().map(|(id, _)| *id)
    }

    pub fn clear(&self) {
        lock(&self.commands).clear();
    }
}

impl DaemonBoundary for RecordingBoundary {
    fn execute(&self, command: DaemonCommand) -> Result<CommandReply, BoundaryError> {
        debug!(command = command.name(), "Recorded daemon command");
        lock(&self.commands).push(command.clone());

        if let Some(err) = lock(&self.failures).get(command.name()) {
            return Err(err.clone());
        }

        let reply = match command {
            DaemonCommand::PlaceCall { .. } => {
                let id = lock(&self.call_ids)
                    .pop_front()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
                CommandReply::CallId(id)
            }
            DaemonCommand::LoadConversation { .. } | DaemonCommand::LoadConversationUntil { .. } => {
                let id = self.next_request.fetch_add(1, Ordering::SeqCst);
                lock(&self.requests).push((id, command));
                CommandReply::RequestId(id)
            }
            DaemonCommand::StartConversation { .. } => CommandReply::ConversationId(
                ConversationId::new(uuid::Uuid::new_v4().simple().to_string()),
            ),
            DaemonCommand::Transfer { .. }
            | DaemonCommand::AttendedTransfer { .. }
            | DaemonCommand::JoinParticipant { .. } => CommandReply::Accepted(true),
            _ => CommandReply::Done,
        };
        Ok(reply)
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
