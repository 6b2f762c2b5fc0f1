//! Read-side queries. Answers are copies taken inside the session task, so
//! they reflect every event handled before the query.

use tokio::sync::oneshot;

use confab_media::{Call, ConferenceSnapshot};
use confab_shared::error::{CallError, ConversationError};
use confab_shared::types::{CallId, ConferenceId, ConversationId};
use confab_store::ConversationSnapshot;

use super::SessionHandle;
use crate::service::SessionCommand;
use crate::state::SessionState;

pub enum QueryCommand {
    Call {
        id: CallId,
        reply: oneshot::Sender<Option<Call>>,
    },
    Calls {
        reply: oneshot::Sender<Vec<Call>>,
    },
    Conference {
        id: ConferenceId,
        reply: oneshot::Sender<Option<ConferenceSnapshot>>,
    },
    CurrentConferences {
        reply: oneshot::Sender<Vec<ConferenceSnapshot>>,
    },
    Conversation {
        id: ConversationId,
        reply: oneshot::Sender<Option<ConversationSnapshot>>,
    },
    Conversations {
        reply: oneshot::Sender<Vec<ConversationId>>,
    },
}

impl SessionHandle {
    pub async fn call(&self, id: &CallId) -> Result<Option<Call>, CallError> {
        let id = id.clone();
        self.ask(|reply| SessionCommand::Query(QueryCommand::Call { id, reply }))
            .await
            .ok_or(CallError::SessionClosed)
    }

    pub async fn calls(&self) -> Result<Vec<Call>, CallError> {
        self.ask(|reply| SessionCommand::Query(QueryCommand::Calls { reply }))
            .await
            .ok_or(CallError::SessionClosed)
    }

    pub async fn conference(&self, id: &ConferenceId) -> Result<Option<ConferenceSnapshot>, CallError> {
        let id = id.clone();
        self.ask(|reply| SessionCommand::Query(QueryCommand::Conference { id, reply }))
            .await
            .ok_or(CallError::SessionClosed)
    }

    /// Conferences whose aggregate state is CURRENT.
    pub async fn current_conferences(&self) -> Result<Vec<ConferenceSnapshot>, CallError> {
        self.ask(|reply| SessionCommand::Query(QueryCommand::CurrentConferences { reply }))
            .await
            .ok_or(CallError::SessionClosed)
    }

    pub async fn conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Option<ConversationSnapshot>, ConversationError> {
        let id = id.clone();
        self.ask(|reply| SessionCommand::Query(QueryCommand::Conversation { id, reply }))
            .await
            .ok_or(ConversationError::SessionClosed)
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationId>, ConversationError> {
        self.ask(|reply| SessionCommand::Query(QueryCommand::Conversations { reply }))
            .await
            .ok_or(ConversationError::SessionClosed)
    }
}

impl SessionState {
    pub(crate) fn handle_query(&self, query: QueryCommand) {
        match query {
            QueryCommand::Call { id, reply } => {
                let _ = reply.send(self.registry.call(&id).cloned());
            }
            QueryCommand::Calls { reply } => {
                let _ = reply.send(self.registry.calls().cloned().collect());
            }
            QueryCommand::Conference { id, reply } => {
                let _ = reply.send(self.registry.conference(&id));
            }
            QueryCommand::CurrentConferences { reply } => {
                let _ = reply.send(self.registry.current_conferences());
            }
            QueryCommand::Conversation { id, reply } => {
                let _ = reply.send(self.overlay.snapshot(&id));
            }
            QueryCommand::Conversations { reply } => {
                let _ = reply.send(self.overlay.conversation_ids().cloned().collect());
            }
        }
    }
}
