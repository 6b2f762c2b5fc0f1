use tokio::sync::oneshot;
use tracing::debug;

use confab_shared::error::{ConversationError, LoadError};
use confab_shared::types::{AccountId, ConversationId, MessageId, Uri};
use confab_store::{ConversationSnapshot, Interaction, LoadHandle, UntilHandle};

use super::SessionHandle;
use crate::service::SessionCommand;
use crate::state::SessionState;

type Reply<T> = oneshot::Sender<Result<T, ConversationError>>;

pub enum ConversationCommand {
    LoadMore {
        conversation: ConversationId,
        count: u32,
        reply: oneshot::Sender<LoadHandle>,
    },
    LoadUntil {
        conversation: ConversationId,
        from: MessageId,
        until: MessageId,
        reply: oneshot::Sender<UntilHandle>,
    },
    Send {
        conversation: ConversationId,
        text: String,
        reply_to: Option<MessageId>,
        reply: Reply<()>,
    },
    Edit {
        conversation: ConversationId,
        target: MessageId,
        text: String,
        reply: Reply<()>,
    },
    Delete {
        conversation: ConversationId,
        target: MessageId,
        reply: Reply<()>,
    },
    React {
        conversation: ConversationId,
        target: MessageId,
        emoji: String,
        reply: Reply<()>,
    },
    SetDisplayed {
        conversation: ConversationId,
        message: MessageId,
        reply: Reply<()>,
    },
    SetLastNotified {
        conversation: ConversationId,
        message: Option<MessageId>,
    },
    AcceptRequest {
        conversation: ConversationId,
        reply: Reply<()>,
    },
    DeclineRequest {
        conversation: ConversationId,
        reply: Reply<()>,
    },
    Start {
        account: AccountId,
        members: Vec<Uri>,
        reply: Reply<ConversationId>,
    },
    Remove {
        conversation: ConversationId,
        reply: Reply<()>,
    },
}

// ---------------------------------------------------------------------------
// Handle side
// ---------------------------------------------------------------------------

impl SessionHandle {
    /// Shared handle of the conversation's "load older" operation. Callers
    /// arriving while a load is in flight get the same handle; dropping it
    /// does not cancel the daemon request.
    pub async fn load_more_handle(
        &self,
        conversation: &ConversationId,
        count: Option<u32>,
    ) -> Result<LoadHandle, LoadError> {
        let conversation = conversation.clone();
        let count = count.unwrap_or(self.load_count);
        self.ask(|reply| {
            SessionCommand::Conversation(ConversationCommand::LoadMore {
                conversation,
                count,
                reply,
            })
        })
        .await
        .ok_or(LoadError::SessionClosed)
    }

    /// Load older messages and wait for the conversation to settle.
    pub async fn load_more(
        &self,
        conversation: &ConversationId,
        count: Option<u32>,
    ) -> Result<ConversationSnapshot, LoadError> {
        self.load_more_handle(conversation, count).await?.await
    }

    /// Fetch the messages between `from` and `until`.
    pub async fn load_until(
        &self,
        conversation: &ConversationId,
        from: &MessageId,
        until: &MessageId,
    ) -> Result<Vec<Interaction>, LoadError> {
        let (conversation, from, until) = (conversation.clone(), from.clone(), until.clone());
        let handle = self
            .ask(|reply| {
                SessionCommand::Conversation(ConversationCommand::LoadUntil {
                    conversation,
                    from,
                    until,
                    reply,
                })
            })
            .await
            .ok_or(LoadError::SessionClosed)?;
        handle.await
    }

    pub async fn send_message(
        &self,
        conversation: &ConversationId,
        text: &str,
        reply_to: Option<&MessageId>,
    ) -> Result<(), ConversationError> {
        let (conversation, text, reply_to) = (conversation.clone(), text.to_string(), reply_to.cloned());
        self.conversation_command(|reply| ConversationCommand::Send {
            conversation,
            text,
            reply_to,
            reply,
        })
        .await
    }

    pub async fn edit_message(
        &self,
        conversation: &ConversationId,
        target: &MessageId,
        text: &str,
    ) -> Result<(), ConversationError> {
        let (conversation, target, text) = (conversation.clone(), target.clone(), text.to_string());
        self.conversation_command(|reply| ConversationCommand::Edit {
            conversation,
            target,
            text,
            reply,
        })
        .await
    }

    pub async fn delete_message(
        &self,
        conversation: &ConversationId,
        target: &MessageId,
    ) -> Result<(), ConversationError> {
        let (conversation, target) = (conversation.clone(), target.clone());
        self.conversation_command(|reply| ConversationCommand::Delete {
            conversation,
            target,
            reply,
        })
        .await
    }

    pub async fn send_reaction(
        &self,
        conversation: &ConversationId,
        target: &MessageId,
        emoji: &str,
    ) -> Result<(), ConversationError> {
        let (conversation, target, emoji) = (conversation.clone(), target.clone(), emoji.to_string());
        self.conversation_command(|reply| ConversationCommand::React {
            conversation,
            target,
            emoji,
            reply,
        })
        .await
    }

    pub async fn set_message_displayed(
        &self,
        conversation: &ConversationId,
        message: &MessageId,
    ) -> Result<(), ConversationError> {
        let (conversation, message) = (conversation.clone(), message.clone());
        self.conversation_command(|reply| ConversationCommand::SetDisplayed {
            conversation,
            message,
            reply,
        })
        .await
    }

    pub async fn set_last_notified(
        &self,
        conversation: &ConversationId,
        message: Option<&MessageId>,
    ) -> Result<(), ConversationError> {
        self.tx
            .send(SessionCommand::Conversation(ConversationCommand::SetLastNotified {
                conversation: conversation.clone(),
                message: message.cloned(),
            }))
            .await
            .map_err(|_| ConversationError::SessionClosed)
    }

    pub async fn accept_conversation_request(
        &self,
        conversation: &ConversationId,
    ) -> Result<(), ConversationError> {
        let conversation = conversation.clone();
        self.conversation_command(|reply| ConversationCommand::AcceptRequest { conversation, reply })
            .await
    }

    pub async fn decline_conversation_request(
        &self,
        conversation: &ConversationId,
    ) -> Result<(), ConversationError> {
        let conversation = conversation.clone();
        self.conversation_command(|reply| ConversationCommand::DeclineRequest { conversation, reply })
            .await
    }

    pub async fn start_conversation(
        &self,
        account: AccountId,
        members: Vec<Uri>,
    ) -> Result<ConversationId, ConversationError> {
        self.request(
            |reply| {
                SessionCommand::Conversation(ConversationCommand::Start {
                    account,
                    members,
                    reply,
                })
            },
            ConversationError::SessionClosed,
        )
        .await
    }

    pub async fn remove_conversation(&self, conversation: &ConversationId) -> Result<(), ConversationError> {
        let conversation = conversation.clone();
        self.conversation_command(|reply| ConversationCommand::Remove { conversation, reply })
            .await
    }

    async fn conversation_command(
        &self,
        make: impl FnOnce(Reply<()>) -> ConversationCommand,
    ) -> Result<(), ConversationError> {
        self.request(
            |reply| SessionCommand::Conversation(make(reply)),
            ConversationError::SessionClosed,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Session side
// ---------------------------------------------------------------------------

impl SessionState {
    pub(crate) fn handle_conversation_command(&mut self, cmd: ConversationCommand) {
        let boundary = self.boundary.as_ref();
        let overlay = &mut self.overlay;

        match cmd {
            ConversationCommand::LoadMore {
                conversation,
                count,
                reply,
            } => {
                debug!(conversation = %conversation, count, "Load more requested");
                let _ = reply.send(overlay.load_more(boundary, &conversation, count));
            }
            ConversationCommand::LoadUntil {
                conversation,
                from,
                until,
                reply,
            } => {
                let _ = reply.send(overlay.load_until(boundary, &conversation, &from, &until));
            }
            ConversationCommand::Send {
                conversation,
                text,
                reply_to,
                reply,
            } => {
                let _ = reply.send(overlay.send_message(boundary, &conversation, &text, reply_to));
            }
            ConversationCommand::Edit {
                conversation,
                target,
                text,
                reply,
            } => {
                let _ = reply.send(overlay.edit_message(boundary, &conversation, &target, &text));
            }
            ConversationCommand::Delete {
                conversation,
                target,
                reply,
            } => {
                let _ = reply.send(overlay.delete_message(boundary, &conversation, &target));
            }
            ConversationCommand::React {
                conversation,
                target,
                emoji,
                reply,
            } => {
                let _ = reply.send(overlay.send_reaction(boundary, &conversation, &target, &emoji));
            }
            ConversationCommand::SetDisplayed {
                conversation,
                message,
                reply,
            } => {
                let _ = reply.send(overlay.set_message_displayed(boundary, &conversation, &message));
            }
            ConversationCommand::SetLastNotified {
                conversation,
                message,
            } => overlay.set_last_notified(&conversation, message),
            ConversationCommand::AcceptRequest { conversation, reply } => {
                let _ = reply.send(overlay.accept_request(boundary, &conversation));
            }
            ConversationCommand::DeclineRequest { conversation, reply } => {
                let _ = reply.send(overlay.decline_request(boundary, &conversation));
            }
            ConversationCommand::Start {
                account,
                members,
                reply,
            } => {
                let _ = reply.send(overlay.start_conversation(boundary, &account, &members));
            }
            ConversationCommand::Remove { conversation, reply } => {
                let _ = reply.send(overlay.remove_conversation(boundary, &conversation));
            }
        }
    }
}
