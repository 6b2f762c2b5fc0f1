//! Command surface of a running session.
//!
//! [`SessionHandle`] is the cloneable front end; each sub-module groups the
//! commands of one domain together with the code that executes them inside
//! the session task.

pub mod calls;
pub mod conference;
pub mod conversations;
pub mod queries;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use confab_net::Subscription;
use confab_shared::types::ConversationId;
use confab_store::ConversationEvent;

use crate::capability::CallGate;
use crate::events::SessionBus;
use crate::service::SessionCommand;

/// Cloneable handle to the session task.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    gate: Arc<dyn CallGate>,
    bus: SessionBus,
    load_count: u32,
}

impl SessionHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<SessionCommand>,
        gate: Arc<dyn CallGate>,
        bus: SessionBus,
        load_count: u32,
    ) -> Self {
        Self {
            tx,
            gate,
            bus,
            load_count,
        }
    }

    pub fn bus(&self) -> &SessionBus {
        &self.bus
    }

    /// Changes of one conversation only.
    pub fn subscribe_conversation(&self, id: &ConversationId) -> Subscription<ConversationEvent> {
        let id = id.clone();
        self.bus
            .conversations
            .subscribe_filtered(move |event| event.conversation == id)
    }

    /// Stop the session task. Pending commands are dropped.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(SessionCommand::Shutdown).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Send a command and wait for its reply. `None` once the session is gone.
    async fn ask<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.ok()?;
        rx.await.ok()
    }

    async fn request<T, E>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T, E>>) -> SessionCommand,
        closed: E,
    ) -> Result<T, E> {
        self.ask(make).await.unwrap_or(Err(closed))
    }
}
