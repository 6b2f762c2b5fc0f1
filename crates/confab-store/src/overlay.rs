//! Swarm sync overlay: conversation lifecycle and paginated history loads.
//!
//! History requests are asynchronous on the daemon side. A `load-conversation`
//! command returns a request id right away and the batch arrives later as a
//! `swarm-loaded` event echoing that id. The overlay keeps at most one
//! "load older" operation per conversation and hands every concurrent caller
//! the same shared handle. Range fetches (`load_until`) are keyed by request
//! id and never deduplicated.

use std::collections::{HashMap, HashSet};

use futures::future::{self, BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use confab_net::{DaemonBoundary, EventBus, Subscription};
use confab_shared::constants::{
    CONV_KEY_MEMBER_ROLE, CONV_KEY_MEMBER_URI, CONV_KEY_MODE, DEFAULT_READY_LOAD_COUNT,
    READY_FOLLOWUP_LOAD_COUNT,
};
use confab_shared::error::{BoundaryError, ConversationError, LoadError};
use confab_shared::protocol::{CommandReply, DaemonCommand, MessageFlag, RawSwarmMessage};
use confab_shared::types::{
    AccountId, ConversationId, ConversationKind, ConversationMode, MemberEvent, MemberRole,
    MessageId, SyncState, Uri,
};

use crate::conversation::{Conversation, ConversationSnapshot, ElementChange, Member, Profile};
use crate::convert::convert;
use crate::interaction::{Interaction, InteractionStatus};

/// Resolves once the in-flight history load of a conversation completes.
/// Clones resolve from the same completion; dropping one does not cancel
/// the daemon request.
pub type LoadHandle = Shared<BoxFuture<'static, Result<ConversationSnapshot, LoadError>>>;

/// Resolves with the interactions of one range fetch.
pub type UntilHandle = BoxFuture<'static, Result<Vec<Interaction>, LoadError>>;

// ---------------------------------------------------------------------------
// Published events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConversationChange {
    /// The conversation became known locally.
    Opened(ConversationMode),
    Added(Interaction),
    Updated(Interaction),
    Removed(MessageId),
    /// History dropped ahead of a resync.
    Cleared,
    ModeChanged(ConversationMode),
    MembersChanged(Vec<Member>),
    ProfileChanged(Profile),
    Closed,
}

impl From<ElementChange> for ConversationChange {
    fn from(change: ElementChange) -> Self {
        match change {
            ElementChange::Added(i) => Self::Added(i),
            ElementChange::Updated(i) => Self::Updated(i),
            ElementChange::Removed(id) => Self::Removed(id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationEvent {
    pub account: AccountId,
    pub conversation: ConversationId,
    pub change: ConversationChange,
}

// ---------------------------------------------------------------------------
// Request bookkeeping
// ---------------------------------------------------------------------------

struct InFlight {
    handle: LoadHandle,
    tx: oneshot::Sender<Result<ConversationSnapshot, LoadError>>,
    outstanding: HashSet<u32>,
    /// Page size of a follow-up load issued once this one completes.
    then: Option<u32>,
}

enum PendingRequest {
    History(ConversationId),
    Until {
        conversation: ConversationId,
        /// Reply target this fetch was issued for, if automatic.
        target: Option<MessageId>,
        reply: Option<oneshot::Sender<Result<Vec<Interaction>, LoadError>>>,
    },
}

fn ready_handle(result: Result<ConversationSnapshot, LoadError>) -> LoadHandle {
    future::ready(result).boxed().shared()
}

fn pending_handle() -> (
    oneshot::Sender<Result<ConversationSnapshot, LoadError>>,
    LoadHandle,
) {
    let (tx, rx) = oneshot::channel();
    let handle = rx
        .map(|r| r.unwrap_or(Err(LoadError::SessionClosed)))
        .boxed()
        .shared();
    (tx, handle)
}

// ---------------------------------------------------------------------------
// Overlay
// ---------------------------------------------------------------------------

pub struct SwarmOverlay {
    conversations: HashMap<ConversationId, Conversation>,
    in_flight: HashMap<ConversationId, InFlight>,
    requests: HashMap<u32, PendingRequest>,
    reply_fetches: HashSet<(ConversationId, MessageId)>,
    bus: EventBus<ConversationEvent>,
    ready_load_count: u32,
}

impl SwarmOverlay {
    pub fn new(bus: EventBus<ConversationEvent>) -> Self {
        Self {
            conversations: HashMap::new(),
            in_flight: HashMap::new(),
            requests: HashMap::new(),
            reply_fetches: HashSet::new(),
            bus,
            ready_load_count: DEFAULT_READY_LOAD_COUNT,
        }
    }

    pub fn with_ready_load_count(mut self, count: u32) -> Self {
        self.ready_load_count = count;
        self
    }

    pub fn bus(&self) -> &EventBus<ConversationEvent> {
        &self.bus
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn snapshot(&self, id: &ConversationId) -> Option<ConversationSnapshot> {
        self.conversations.get(id).map(Conversation::snapshot)
    }

    pub fn conversation_ids(&self) -> impl Iterator<Item = &ConversationId> {
        self.conversations.keys()
    }

    pub fn is_loading(&self, id: &ConversationId) -> bool {
        self.in_flight.contains_key(id)
    }

    /// Changes of one conversation only.
    pub fn subscribe(&self, id: &ConversationId) -> Subscription<ConversationEvent> {
        let id = id.clone();
        self.bus
            .subscribe_filtered(move |event: &ConversationEvent| event.conversation == id)
    }

    fn publish(&self, account: &AccountId, conversation: &ConversationId, change: ConversationChange) {
        self.bus.publish(ConversationEvent {
            account: account.clone(),
            conversation: conversation.clone(),
            change,
        });
    }

    fn publish_changes(&self, id: &ConversationId, changes: Vec<ElementChange>) {
        let Some(account) = self.conversations.get(id).map(|c| c.account.clone()) else {
            return;
        };
        for change in changes {
            self.publish(&account, id, change.into());
        }
    }

    fn known(&self, id: &ConversationId) -> Result<&Conversation, ConversationError> {
        self.conversations
            .get(id)
            .ok_or_else(|| ConversationError::UnknownConversation(id.to_string()))
    }

    // -----------------------------------------------------------------------
    // History loads
    // -----------------------------------------------------------------------

    /// Load `count` messages older than the earliest known ones.
    pub fn load_more(
        &mut self,
        boundary: &dyn DaemonBoundary,
        id: &ConversationId,
        count: u32,
    ) -> LoadHandle {
        let Some(conversation) = self.conversations.get(id) else {
            return ready_handle(Err(LoadError::UnknownConversation(id.to_string())));
        };
        if conversation.mode().is_pending() || conversation.is_fully_loaded() {
            debug!(conversation = %id, mode = ?conversation.mode(), "Nothing to load");
            return ready_handle(Ok(conversation.snapshot()));
        }
        if let Some(in_flight) = self.in_flight.get(id) {
            debug!(conversation = %id, "Joining in-flight load");
            return in_flight.handle.clone();
        }

        let account = conversation.account.clone();
        let roots: Vec<String> = if conversation.roots().is_empty() {
            vec![String::new()]
        } else {
            conversation.roots().iter().map(ToString::to_string).collect()
        };

        let mut outstanding = HashSet::new();
        for from in roots {
            let command = DaemonCommand::LoadConversation {
                account: account.clone(),
                conversation: id.clone(),
                from,
                count,
            };
            match boundary.execute(command).and_then(CommandReply::into_request_id) {
                Ok(request) => {
                    outstanding.insert(request);
                    self.requests
                        .insert(request, PendingRequest::History(id.clone()));
                }
                Err(e) => {
                    warn!(conversation = %id, error = %e, "History load failed");
                    for request in outstanding {
                        self.requests.remove(&request);
                    }
                    return ready_handle(Err(e.into()));
                }
            }
        }

        debug!(conversation = %id, requests = outstanding.len(), count, "History load issued");
        let (tx, handle) = pending_handle();
        self.in_flight.insert(
            id.clone(),
            InFlight {
                handle: handle.clone(),
                tx,
                outstanding,
                then: None,
            },
        );
        handle
    }

    /// Fetch the messages between `from` and `until`. Every call issues its
    /// own request.
    pub fn load_until(
        &mut self,
        boundary: &dyn DaemonBoundary,
        id: &ConversationId,
        from: &MessageId,
        until: &MessageId,
    ) -> UntilHandle {
        let Some(conversation) = self.conversations.get(id) else {
            return future::ready(Err(LoadError::UnknownConversation(id.to_string()))).boxed();
        };
        if conversation.mode().is_pending() {
            return future::ready(Ok(Vec::new())).boxed();
        }
        let account = conversation.account.clone();
        let (tx, rx) = oneshot::channel();
        match self.issue_until(boundary, &account, id, from, until, None, Some(tx)) {
            Ok(_) => rx
                .map(|r| r.unwrap_or(Err(LoadError::SessionClosed)))
                .boxed(),
            Err(e) => future::ready(Err(e.into())).boxed(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn issue_until(
        &mut self,
        boundary: &dyn DaemonBoundary,
        account: &AccountId,
        id: &ConversationId,
        from: &MessageId,
        until: &MessageId,
        target: Option<MessageId>,
        reply: Option<oneshot::Sender<Result<Vec<Interaction>, LoadError>>>,
    ) -> Result<u32, BoundaryError> {
        let command = DaemonCommand::LoadConversationUntil {
            account: account.clone(),
            conversation: id.clone(),
            from: from.to_string(),
            until: until.clone(),
        };
        let request = boundary
            .execute(command)
            .and_then(CommandReply::into_request_id)?;
        self.requests.insert(
            request,
            PendingRequest::Until {
                conversation: id.clone(),
                target,
                reply,
            },
        );
        Ok(request)
    }

    /// Issue one narrow fetch per reply target that is not loaded yet.
    fn fetch_reply_targets(&mut self, boundary: &dyn DaemonBoundary, id: &ConversationId) {
        let Some(conversation) = self.conversations.get_mut(id) else {
            return;
        };
        let account = conversation.account.clone();
        for (from, target) in conversation.take_reply_fetches() {
            if !self.reply_fetches.insert((id.clone(), target.clone())) {
                continue;
            }
            if let Err(e) = self.issue_until(boundary, &account, id, &from, &target, Some(target.clone()), None) {
                warn!(conversation = %id, reply_to = %target, error = %e, "Reply target fetch failed");
                self.reply_fetches.remove(&(id.clone(), target));
            }
        }
    }

    /// Fail every pending load of a conversation.
    fn interrupt(&mut self, id: &ConversationId) {
        if let Some(in_flight) = self.in_flight.remove(id) {
            for request in &in_flight.outstanding {
                self.requests.remove(request);
            }
            let _ = in_flight.tx.send(Err(LoadError::Interrupted));
            debug!(conversation = %id, "History load interrupted");
        }
        self.requests.retain(|_, request| match request {
            PendingRequest::History(c) => c != id,
            PendingRequest::Until {
                conversation,
                reply,
                ..
            } if conversation == id => {
                if let Some(tx) = reply.take() {
                    let _ = tx.send(Err(LoadError::Interrupted));
                }
                false
            }
            PendingRequest::Until { .. } => true,
        });
        self.reply_fetches.retain(|(c, _)| c != id);
    }

    fn add_batch(&mut self, id: &ConversationId, messages: &[RawSwarmMessage], live: bool) -> Vec<Interaction> {
        let Some(conversation) = self.conversations.get_mut(id) else {
            return Vec::new();
        };
        let kind = conversation.kind();
        let mut added = Vec::new();
        let mut changes = Vec::new();
        for raw in messages {
            let Some(interaction) = convert(id, kind, raw) else {
                continue;
            };
            added.push(interaction.clone());
            changes.extend(conversation.add_interaction(interaction, live));
        }
        self.publish_changes(id, changes);
        added
    }

    pub fn ingest_swarm_loaded(
        &mut self,
        boundary: &dyn DaemonBoundary,
        request_id: u32,
        id: &ConversationId,
        messages: &[RawSwarmMessage],
    ) {
        let Some(mode) = self.conversations.get(id).map(Conversation::mode) else {
            debug!(conversation = %id, request = request_id, "Batch for unknown conversation");
            return;
        };

        match self.requests.remove(&request_id) {
            Some(PendingRequest::History(_)) => {
                self.add_batch(id, messages, false);
                self.fetch_reply_targets(boundary, id);
                self.complete_history_request(boundary, id, request_id);
            }
            Some(PendingRequest::Until { target, reply, .. }) => {
                let interactions = self.add_batch(id, messages, false);
                self.fetch_reply_targets(boundary, id);
                if let Some(target) = target {
                    self.reply_fetches.remove(&(id.clone(), target));
                }
                if let Some(tx) = reply {
                    let _ = tx.send(Ok(interactions));
                }
            }
            None if mode.is_pending() => {
                debug!(conversation = %id, request = request_id, "Stale batch dropped");
            }
            None => {
                debug!(conversation = %id, request = request_id, "Unsolicited batch");
                self.add_batch(id, messages, false);
                self.fetch_reply_targets(boundary, id);
            }
        }
    }

    fn complete_history_request(&mut self, boundary: &dyn DaemonBoundary, id: &ConversationId, request_id: u32) {
        let done = match self.in_flight.get_mut(id) {
            Some(in_flight) => {
                in_flight.outstanding.remove(&request_id);
                in_flight.outstanding.is_empty()
            }
            None => false,
        };
        if !done {
            return;
        }
        let Some(in_flight) = self.in_flight.remove(id) else {
            return;
        };
        if let Some(snapshot) = self.snapshot(id) {
            debug!(conversation = %id, interactions = snapshot.interactions.len(), "History load complete");
            let _ = in_flight.tx.send(Ok(snapshot));
        }
        if let Some(count) = in_flight.then {
            let _ = self.load_more(boundary, id, count);
        }
    }

    // -----------------------------------------------------------------------
    // Live messages
    // -----------------------------------------------------------------------

    pub fn ingest_message_received(
        &mut self,
        boundary: &dyn DaemonBoundary,
        id: &ConversationId,
        raw: &RawSwarmMessage,
    ) {
        if !self.conversations.contains_key(id) {
            debug!(conversation = %id, "Message for unknown conversation");
            return;
        }
        self.add_batch(id, std::slice::from_ref(raw), true);
        self.fetch_reply_targets(boundary, id);
    }

    pub fn ingest_message_updated(
        &mut self,
        boundary: &dyn DaemonBoundary,
        id: &ConversationId,
        raw: &RawSwarmMessage,
    ) {
        let Some(conversation) = self.conversations.get_mut(id) else {
            debug!(conversation = %id, "Update for unknown conversation");
            return;
        };
        let Some(interaction) = convert(id, conversation.kind(), raw) else {
            return;
        };
        let changes = conversation.update_interaction(interaction);
        self.publish_changes(id, changes);
        self.fetch_reply_targets(boundary, id);
    }

    pub fn ingest_message_status(
        &mut self,
        id: &ConversationId,
        message: &MessageId,
        contact: &str,
        status: i32,
    ) {
        let Some(conversation) = self.conversations.get_mut(id) else {
            return;
        };
        let changes =
            conversation.set_message_status(message, contact, InteractionStatus::from_code(status));
        self.publish_changes(id, changes);
    }

    pub fn ingest_member_event(&mut self, id: &ConversationId, uri: &str, event: i32) {
        let Some(event) = MemberEvent::from_code(event) else {
            debug!(conversation = %id, event, "Unknown member event");
            return;
        };
        let Some(conversation) = self.conversations.get_mut(id) else {
            return;
        };
        if conversation.apply_member_event(Uri::parse(uri), event) {
            let (account, members) = (conversation.account.clone(), conversation.members());
            self.publish(&account, id, ConversationChange::MembersChanged(members));
        }
    }

    pub fn set_last_notified(&mut self, id: &ConversationId, message: Option<MessageId>) {
        if let Some(conversation) = self.conversations.get_mut(id) {
            let changes = conversation.set_last_notified(message);
            self.publish_changes(id, changes);
        }
    }

    // -----------------------------------------------------------------------
    // Conversation lifecycle
    // -----------------------------------------------------------------------

    /// The daemon finished cloning or syncing a conversation. An existing
    /// conversation is reset and reloaded.
    pub fn ingest_conversation_ready(
        &mut self,
        boundary: &dyn DaemonBoundary,
        account: &AccountId,
        id: &ConversationId,
        info: &HashMap<String, String>,
        members: &[HashMap<String, String>],
    ) {
        let kind = kind_from_info(info);
        let existed = self.conversations.contains_key(id);
        if existed {
            self.interrupt(id);
        }
        let conversation = self.conversations.entry(id.clone()).or_insert_with(|| {
            Conversation::new(id.clone(), account.clone(), kind, SyncState::Ready)
        });
        if existed {
            conversation.clear_history();
        }
        conversation.set_kind(kind);
        conversation.set_sync_state(SyncState::Ready);
        conversation.update_profile(Profile::from_map(info));
        conversation.set_members(members.iter().filter_map(member_from_map));

        let mode = conversation.mode();
        let (members, profile) = (conversation.members(), conversation.profile().clone());
        info!(conversation = %id, ?mode, members = members.len(), "Conversation ready");
        if existed {
            self.publish(account, id, ConversationChange::Cleared);
            self.publish(account, id, ConversationChange::ModeChanged(mode));
        } else {
            self.publish(account, id, ConversationChange::Opened(mode));
        }
        self.publish(account, id, ConversationChange::MembersChanged(members));
        self.publish(account, id, ConversationChange::ProfileChanged(profile));

        let _ = self.load_more(boundary, id, self.ready_load_count);
        if let Some(in_flight) = self.in_flight.get_mut(id) {
            in_flight.then = Some(READY_FOLLOWUP_LOAD_COUNT);
        }
    }

    /// Full resync: history is dropped and pending loads fail.
    pub fn ingest_conversation_syncing(&mut self, account: &AccountId, id: &ConversationId) {
        self.interrupt(id);
        match self.conversations.get_mut(id) {
            Some(conversation) => {
                conversation.clear_history();
                conversation.set_sync_state(SyncState::Syncing);
                let mode = conversation.mode();
                self.publish(account, id, ConversationChange::Cleared);
                self.publish(account, id, ConversationChange::ModeChanged(mode));
            }
            None => {
                let conversation = Conversation::new(
                    id.clone(),
                    account.clone(),
                    ConversationKind::InvitesOnly,
                    SyncState::Syncing,
                );
                let mode = conversation.mode();
                self.conversations.insert(id.clone(), conversation);
                self.publish(account, id, ConversationChange::Opened(mode));
            }
        }
    }

    pub fn ingest_conversation_removed(&mut self, id: &ConversationId) {
        self.interrupt(id);
        if let Some(conversation) = self.conversations.remove(id) {
            info!(conversation = %id, "Conversation removed");
            self.publish(&conversation.account, id, ConversationChange::Closed);
        }
    }

    pub fn ingest_request_received(
        &mut self,
        account: &AccountId,
        id: &ConversationId,
        metadata: &HashMap<String, String>,
    ) {
        if self.conversations.contains_key(id) {
            debug!(conversation = %id, "Request for known conversation ignored");
            return;
        }
        let mut conversation = Conversation::new(
            id.clone(),
            account.clone(),
            kind_from_info(metadata),
            SyncState::Request,
        );
        conversation.update_profile(Profile::from_map(metadata));
        let (mode, profile) = (conversation.mode(), conversation.profile().clone());
        self.conversations.insert(id.clone(), conversation);
        info!(conversation = %id, "Conversation request received");
        self.publish(account, id, ConversationChange::Opened(mode));
        self.publish(account, id, ConversationChange::ProfileChanged(profile));
    }

    pub fn ingest_request_declined(&mut self, id: &ConversationId) {
        let is_request = self
            .conversations
            .get(id)
            .is_some_and(|c| c.sync_state() == SyncState::Request);
        if is_request {
            self.ingest_conversation_removed(id);
        }
    }

    pub fn ingest_profile_updated(&mut self, id: &ConversationId, profile: &HashMap<String, String>) {
        let Some(conversation) = self.conversations.get_mut(id) else {
            return;
        };
        conversation.update_profile(Profile::from_map(profile));
        let (account, profile) = (conversation.account.clone(), conversation.profile().clone());
        self.publish(&account, id, ConversationChange::ProfileChanged(profile));
    }

    // -----------------------------------------------------------------------
    // Local operations
    // -----------------------------------------------------------------------

    pub fn accept_request(
        &mut self,
        boundary: &dyn DaemonBoundary,
        id: &ConversationId,
    ) -> Result<(), ConversationError> {
        let account = self.known(id)?.account.clone();
        boundary.execute(DaemonCommand::AcceptConversationRequest {
            account: account.clone(),
            conversation: id.clone(),
        })?;
        if let Some(conversation) = self.conversations.get_mut(id) {
            conversation.set_sync_state(SyncState::Ready);
            let mode = conversation.mode();
            self.publish(&account, id, ConversationChange::ModeChanged(mode));
        }
        Ok(())
    }

    /// The conversation is removed once the daemon confirms.
    pub fn decline_request(
        &self,
        boundary: &dyn DaemonBoundary,
        id: &ConversationId,
    ) -> Result<(), ConversationError> {
        let account = self.known(id)?.account.clone();
        boundary.execute(DaemonCommand::DeclineConversationRequest {
            account,
            conversation: id.clone(),
        })?;
        Ok(())
    }

    pub fn start_conversation(
        &mut self,
        boundary: &dyn DaemonBoundary,
        account: &AccountId,
        members: &[Uri],
    ) -> Result<ConversationId, ConversationError> {
        let id = boundary
            .execute(DaemonCommand::StartConversation {
                account: account.clone(),
            })?
            .into_conversation_id()?;
        for member in members {
            boundary.execute(DaemonCommand::AddConversationMember {
                account: account.clone(),
                conversation: id.clone(),
                member: member.clone(),
            })?;
        }

        let kind = if members.len() == 1 {
            ConversationKind::OneToOne
        } else {
            ConversationKind::InvitesOnly
        };
        let mut conversation = Conversation::new(id.clone(), account.clone(), kind, SyncState::Ready);
        conversation.set_members(members.iter().map(|m| (m.clone(), MemberRole::Invited)));
        let (mode, list) = (conversation.mode(), conversation.members());
        self.conversations.insert(id.clone(), conversation);
        info!(conversation = %id, members = members.len(), "Conversation started");
        self.publish(account, &id, ConversationChange::Opened(mode));
        self.publish(account, &id, ConversationChange::MembersChanged(list));
        Ok(id)
    }

    /// The conversation is dropped once the daemon confirms.
    pub fn remove_conversation(
        &self,
        boundary: &dyn DaemonBoundary,
        id: &ConversationId,
    ) -> Result<(), ConversationError> {
        let account = self.known(id)?.account.clone();
        boundary.execute(DaemonCommand::RemoveConversation {
            account,
            conversation: id.clone(),
        })?;
        Ok(())
    }

    fn send(
        &self,
        boundary: &dyn DaemonBoundary,
        id: &ConversationId,
        body: String,
        parent: Option<MessageId>,
        flag: MessageFlag,
    ) -> Result<(), ConversationError> {
        let account = self.known(id)?.account.clone();
        boundary.execute(DaemonCommand::SendMessage {
            account,
            conversation: id.clone(),
            body,
            parent,
            flag,
        })?;
        Ok(())
    }

    pub fn send_message(
        &self,
        boundary: &dyn DaemonBoundary,
        id: &ConversationId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<(), ConversationError> {
        self.send(boundary, id, text.to_string(), reply_to, MessageFlag::Plain)
    }

    pub fn edit_message(
        &self,
        boundary: &dyn DaemonBoundary,
        id: &ConversationId,
        target: &MessageId,
        text: &str,
    ) -> Result<(), ConversationError> {
        self.send(boundary, id, text.to_string(), Some(target.clone()), MessageFlag::Edit)
    }

    pub fn delete_message(
        &self,
        boundary: &dyn DaemonBoundary,
        id: &ConversationId,
        target: &MessageId,
    ) -> Result<(), ConversationError> {
        self.send(boundary, id, String::new(), Some(target.clone()), MessageFlag::Edit)
    }

    pub fn send_reaction(
        &self,
        boundary: &dyn DaemonBoundary,
        id: &ConversationId,
        target: &MessageId,
        emoji: &str,
    ) -> Result<(), ConversationError> {
        self.send(boundary, id, emoji.to_string(), Some(target.clone()), MessageFlag::Reaction)
    }

    pub fn set_message_displayed(
        &self,
        boundary: &dyn DaemonBoundary,
        id: &ConversationId,
        message: &MessageId,
    ) -> Result<(), ConversationError> {
        let account = self.known(id)?.account.clone();
        boundary.execute(DaemonCommand::SetMessageDisplayed {
            account,
            conversation: id.clone(),
            message: message.clone(),
        })?;
        Ok(())
    }
}

fn kind_from_info(info: &HashMap<String, String>) -> ConversationKind {
    info.get(CONV_KEY_MODE)
        .and_then(|m| m.parse::<i32>().ok())
        .and_then(ConversationKind::from_code)
        .unwrap_or(ConversationKind::InvitesOnly)
}

fn member_from_map(map: &HashMap<String, String>) -> Option<(Uri, MemberRole)> {
    let uri = map.get(CONV_KEY_MEMBER_URI).filter(|u| !u.is_empty())?;
    let role = map
        .get(CONV_KEY_MEMBER_ROLE)
        .map(|r| MemberRole::from_daemon(r))
        .unwrap_or(MemberRole::Member);
    Some((Uri::parse(uri), role))
}
