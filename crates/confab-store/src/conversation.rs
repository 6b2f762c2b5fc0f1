//! Ordered interaction store of one swarm conversation.
//!
//! Messages are placed along their linearized parent links and never moved
//! once placed: new leaves go at the end, older history goes in front of
//! the child that references it. Parents that have not been loaded yet
//! form the root frontier that the next history page starts from.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use confab_shared::constants::{CONV_KEY_AVATAR, CONV_KEY_DESCRIPTION, CONV_KEY_TITLE};
use confab_shared::types::{
    AccountId, ConferenceId, ConversationId, ConversationKind, ConversationMode, MemberEvent,
    MemberRole, MessageId, SyncState, Uri,
};

use crate::interaction::{Interaction, InteractionBody, InteractionStatus};

/// A change to the ordered store, as published to observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ElementChange {
    Added(Interaction),
    Updated(Interaction),
    Removed(MessageId),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub title: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
}

impl Profile {
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| map.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            title: get(CONV_KEY_TITLE),
            description: get(CONV_KEY_DESCRIPTION),
            avatar: get(CONV_KEY_AVATAR),
        }
    }

    /// Overlay the non-empty fields of `other`.
    pub fn update(&mut self, other: Profile) {
        if other.title.is_some() {
            self.title = other.title;
        }
        if other.description.is_some() {
            self.description = other.description;
        }
        if other.avatar.is_some() {
            self.avatar = other.avatar;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub uri: Uri,
    pub role: MemberRole,
}

/// Read-only copy of a conversation handed out of the session task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSnapshot {
    pub id: ConversationId,
    pub account: AccountId,
    pub mode: ConversationMode,
    pub members: Vec<Member>,
    pub profile: Profile,
    /// Visible timeline, oldest first.
    pub interactions: Vec<Interaction>,
    pub fully_loaded: bool,
}

pub struct Conversation {
    pub id: ConversationId,
    pub account: AccountId,
    kind: ConversationKind,
    sync: SyncState,
    profile: Profile,
    members: BTreeMap<Uri, MemberRole>,
    order: Vec<MessageId>,
    messages: HashMap<MessageId, Interaction>,
    /// Parents referenced but not loaded yet.
    roots: BTreeSet<MessageId>,
    pending_edits: HashMap<MessageId, Vec<Interaction>>,
    pending_reactions: HashMap<MessageId, Vec<Interaction>>,
    /// Reaction id to the message it reacts to.
    reaction_targets: HashMap<MessageId, MessageId>,
    /// Reply target to the replies waiting for it.
    waiting_replies: HashMap<MessageId, Vec<MessageId>>,
    reply_fetches: Vec<(MessageId, MessageId)>,
    calls_started: HashMap<ConferenceId, MessageId>,
    calls_ended: HashMap<ConferenceId, MessageId>,
    last_displayed: HashMap<String, MessageId>,
    last_notified: Option<MessageId>,
}

impl Conversation {
    pub fn new(id: ConversationId, account: AccountId, kind: ConversationKind, sync: SyncState) -> Self {
        Self {
            id,
            account,
            kind,
            sync,
            profile: Profile::default(),
            members: BTreeMap::new(),
            order: Vec::new(),
            messages: HashMap::new(),
            roots: BTreeSet::new(),
            pending_edits: HashMap::new(),
            pending_reactions: HashMap::new(),
            reaction_targets: HashMap::new(),
            waiting_replies: HashMap::new(),
            reply_fetches: Vec::new(),
            calls_started: HashMap::new(),
            calls_ended: HashMap::new(),
            last_displayed: HashMap::new(),
            last_notified: None,
        }
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    pub fn kind(&self) -> ConversationKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: ConversationKind) {
        self.kind = kind;
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync
    }

    pub fn set_sync_state(&mut self, sync: SyncState) {
        self.sync = sync;
    }

    pub fn mode(&self) -> ConversationMode {
        ConversationMode::of(self.kind, self.sync)
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn update_profile(&mut self, profile: Profile) {
        self.profile.update(profile);
    }

    pub fn roots(&self) -> &BTreeSet<MessageId> {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every message down to the initial commit is present.
    pub fn is_fully_loaded(&self) -> bool {
        !self.order.is_empty() && self.roots.is_empty()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Interaction> {
        self.messages.get(id)
    }

    /// Visible timeline, oldest first.
    pub fn timeline(&self) -> impl Iterator<Item = &Interaction> {
        self.order
            .iter()
            .filter_map(|id| self.messages.get(id))
            .filter(|i| i.is_visible())
    }

    /// Every placed entry, placeholders included.
    pub fn history_ids(&self) -> &[MessageId] {
        &self.order
    }

    pub fn members(&self) -> Vec<Member> {
        self.members
            .iter()
            .map(|(uri, role)| Member {
                uri: uri.clone(),
                role: *role,
            })
            .collect()
    }

    pub fn role_of(&self, uri: &Uri) -> Option<MemberRole> {
        self.members.get(uri).copied()
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            id: self.id.clone(),
            account: self.account.clone(),
            mode: self.mode(),
            members: self.members(),
            profile: self.profile.clone(),
            interactions: self.timeline().cloned().collect(),
            fully_loaded: self.is_fully_loaded(),
        }
    }

    /// Drop all history; members and profile are kept.
    pub fn clear_history(&mut self) {
        self.order.clear();
        self.messages.clear();
        self.roots.clear();
        self.pending_edits.clear();
        self.pending_reactions.clear();
        self.reaction_targets.clear();
        self.waiting_replies.clear();
        self.reply_fetches.clear();
        self.calls_started.clear();
        self.calls_ended.clear();
        self.last_displayed.clear();
    }

    /// Reply targets that need a narrow fetch, as `(from, until)` pairs.
    pub fn take_reply_fetches(&mut self) -> Vec<(MessageId, MessageId)> {
        std::mem::take(&mut self.reply_fetches)
    }

    // -----------------------------------------------------------------------
    // Members
    // -----------------------------------------------------------------------

    pub fn set_members(&mut self, members: impl IntoIterator<Item = (Uri, MemberRole)>) {
        self.members = members.into_iter().collect();
    }

    /// Returns whether the member map changed. One-to-one conversations
    /// never evict their peer.
    pub fn apply_member_event(&mut self, uri: Uri, event: MemberEvent) -> bool {
        let before = self.members.get(&uri).copied();
        match event {
            MemberEvent::Add => {
                self.members.entry(uri.clone()).or_insert(MemberRole::Invited);
            }
            MemberEvent::Join | MemberEvent::Unblock => {
                self.members.insert(uri.clone(), MemberRole::Member);
            }
            MemberEvent::Remove | MemberEvent::Block if !self.kind.is_one_to_one() => {
                self.members.remove(&uri);
            }
            MemberEvent::Block => {
                self.members.insert(uri.clone(), MemberRole::Blocked);
            }
            MemberEvent::Remove => {}
        }
        before != self.members.get(&uri).copied()
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    pub fn set_last_notified(&mut self, id: Option<MessageId>) -> Vec<ElementChange> {
        self.last_notified = id.clone();
        match id.and_then(|id| self.messages.get_mut(&id)) {
            Some(msg) if !msg.notified => {
                msg.notified = true;
                vec![ElementChange::Updated(msg.clone())]
            }
            _ => Vec::new(),
        }
    }

    /// Add one interaction. `live` is true for messages received in real
    /// time, false for history loads.
    pub fn add_interaction(&mut self, interaction: Interaction, live: bool) -> Vec<ElementChange> {
        let mut changes = Vec::new();

        if self.messages.contains_key(&interaction.id) {
            if !interaction.is_edit() && !interaction.is_reaction() {
                self.update_existing(interaction, &mut changes);
            }
            return changes;
        }

        if let Some(target) = interaction.edit_of.clone() {
            self.apply_edit(&target, &interaction, live, &mut changes);
            self.place(interaction.placeholder(), &mut changes);
        } else if let Some(target) = interaction.react_to.clone() {
            self.apply_reaction(&target, &interaction, &mut changes);
            self.place(interaction.placeholder(), &mut changes);
        } else {
            let mut interaction = interaction;
            self.attach_pending(&mut interaction);
            self.pair_call_record(&mut interaction, &mut changes);
            self.link_reply(&mut interaction);
            if self.last_notified.as_ref() == Some(&interaction.id) {
                interaction.notified = true;
            }
            let id = interaction.id.clone();
            self.place(interaction, &mut changes);
            self.resolve_waiting_replies(&id, &mut changes);
        }
        changes
    }

    /// Merge an updated copy of a known message in place.
    pub fn update_interaction(&mut self, interaction: Interaction) -> Vec<ElementChange> {
        let mut changes = Vec::new();
        if self.messages.contains_key(&interaction.id) {
            self.update_existing(interaction, &mut changes);
        } else {
            changes = self.add_interaction(interaction, true);
        }
        changes
    }

    fn update_existing(&mut self, interaction: Interaction, changes: &mut Vec<ElementChange>) {
        if let Some(existing) = self.messages.get_mut(&interaction.id) {
            if !existing.is_visible() && !existing.hidden {
                return;
            }
            existing.merge_from(interaction);
            changes.push(ElementChange::Updated(existing.clone()));
        }
    }

    fn place(&mut self, interaction: Interaction, changes: &mut Vec<ElementChange>) {
        let id = interaction.id.clone();
        self.roots.remove(&id);
        if let Some(parent) = &interaction.parent {
            if !self.messages.contains_key(parent) {
                self.roots.insert(parent.clone());
            }
        }

        let position = self.position_for(&interaction);
        let position = match position {
            Some(p) => p,
            None => {
                warn!(conversation = %self.id, message = %id, "No attach point, placing at edge");
                let older = self
                    .order
                    .first()
                    .and_then(|first| self.messages.get(first))
                    .is_some_and(|first| interaction.timestamp < first.timestamp);
                if older {
                    0
                } else {
                    self.order.len()
                }
            }
        };

        let visible = interaction.is_visible();
        self.order.insert(position, id.clone());
        self.messages.insert(id, interaction.clone());
        if visible {
            changes.push(ElementChange::Added(interaction));
        }
    }

    fn position_for(&self, interaction: &Interaction) -> Option<usize> {
        let last_is_parent = match (self.order.last(), &interaction.parent) {
            (Some(last), Some(parent)) => last == parent,
            _ => false,
        };
        if self.order.is_empty() || last_is_parent {
            return Some(self.order.len());
        }
        let child = self.order.iter().rposition(|id| {
            self.messages
                .get(id)
                .and_then(|m| m.parent.as_ref())
                .is_some_and(|p| p == &interaction.id)
        });
        if child.is_some() {
            return child;
        }
        let parent = interaction.parent.as_ref()?;
        self.order
            .iter()
            .rposition(|id| id == parent)
            .map(|p| p + 1)
    }

    // -----------------------------------------------------------------------
    // Overlays
    // -----------------------------------------------------------------------

    fn apply_edit(
        &mut self,
        target: &MessageId,
        edit: &Interaction,
        live: bool,
        changes: &mut Vec<ElementChange>,
    ) {
        // An edit of a reaction changes or deletes the reaction.
        if let Some(message) = self.reaction_targets.get(target).cloned() {
            let body = edit.raw_text().unwrap_or_default();
            if let Some(msg) = self.messages.get_mut(&message) {
                if body.is_empty() {
                    msg.reactions.retain(|r| &r.id != target);
                    self.reaction_targets.remove(target);
                } else if let Some(r) = msg.reactions.iter_mut().find(|r| &r.id == target) {
                    r.emoji = body.to_string();
                }
                changes.push(ElementChange::Updated(msg.clone()));
            } else if let Some(pending) = self.pending_reactions.get_mut(&message) {
                if body.is_empty() {
                    pending.retain(|r| &r.id != target);
                    self.reaction_targets.remove(target);
                } else if let Some(r) = pending.iter_mut().find(|r| &r.id == target) {
                    r.body = InteractionBody::Text {
                        body: body.to_string(),
                    };
                }
            }
            return;
        }

        match self.messages.get_mut(target) {
            Some(msg) if msg.is_visible() => {
                if live {
                    msg.edits.push(edit.as_edit());
                } else {
                    msg.edits.insert(0, edit.as_edit());
                }
                changes.push(ElementChange::Updated(msg.clone()));
            }
            Some(_) => debug!(message = %target, "Edit of a non-editable entry ignored"),
            None => {
                let pending = self.pending_edits.entry(target.clone()).or_default();
                if live {
                    pending.push(edit.clone());
                } else {
                    pending.insert(0, edit.clone());
                }
            }
        }
    }

    fn apply_reaction(&mut self, target: &MessageId, reaction: &Interaction, changes: &mut Vec<ElementChange>) {
        // Edits of this reaction may have been loaded before it.
        let mut reaction_entry = reaction.as_reaction();
        if let Some(edits) = self.pending_edits.remove(&reaction.id) {
            match edits.last().and_then(|e| e.raw_text()) {
                Some("") => return,
                Some(emoji) => reaction_entry.emoji = emoji.to_string(),
                None => {}
            }
        }

        match self.messages.get_mut(target) {
            Some(msg) => {
                self.reaction_targets.insert(reaction.id.clone(), target.clone());
                msg.reactions.push(reaction_entry);
                changes.push(ElementChange::Updated(msg.clone()));
            }
            None => {
                self.reaction_targets.insert(reaction.id.clone(), target.clone());
                let mut pending = reaction.clone();
                pending.body = InteractionBody::Text {
                    body: reaction_entry.emoji,
                };
                self.pending_reactions
                    .entry(target.clone())
                    .or_default()
                    .push(pending);
            }
        }
    }

    /// Fold overlays that arrived before their target.
    fn attach_pending(&mut self, interaction: &mut Interaction) {
        if let Some(edits) = self.pending_edits.remove(&interaction.id) {
            interaction.edits.extend(edits.iter().map(Interaction::as_edit));
        }
        if let Some(reactions) = self.pending_reactions.remove(&interaction.id) {
            for r in reactions {
                self.reaction_targets
                    .insert(r.id.clone(), interaction.id.clone());
                interaction.reactions.push(r.as_reaction());
            }
        }
    }

    /// Pair "call started" and "call ended" records of the same conference.
    /// The completion record is hidden and its duration carried by the
    /// start record.
    fn pair_call_record(&mut self, interaction: &mut Interaction, changes: &mut Vec<ElementChange>) {
        let Some((duration, Some(conf_id))) = interaction
            .call_record()
            .map(|(d, c)| (d, c.cloned()))
        else {
            return;
        };

        if duration == 0 {
            if let Some(end_id) = self.calls_ended.remove(&conf_id) {
                let end_duration = self.messages.get_mut(&end_id).and_then(|end| {
                    end.hidden = true;
                    end.call_record().map(|(d, _)| d)
                });
                if let Some(d) = end_duration {
                    set_duration(interaction, d);
                    changes.push(ElementChange::Removed(end_id));
                }
            } else {
                self.calls_started.insert(conf_id, interaction.id.clone());
            }
        } else if let Some(start_id) = self.calls_started.remove(&conf_id) {
            if let Some(start) = self.messages.get_mut(&start_id) {
                set_duration(start, duration);
                changes.push(ElementChange::Updated(start.clone()));
                interaction.hidden = true;
            }
        } else {
            self.calls_ended.insert(conf_id, interaction.id.clone());
        }
    }

    fn link_reply(&mut self, interaction: &mut Interaction) {
        let Some(target) = interaction.reply_to.clone() else {
            return;
        };
        match self.messages.get(&target) {
            Some(t) => interaction.reply_preview = Some(t.as_reply_preview()),
            None => {
                let waiting = self.waiting_replies.entry(target.clone()).or_default();
                if waiting.is_empty() {
                    self.reply_fetches.push((interaction.id.clone(), target));
                }
                waiting.push(interaction.id.clone());
            }
        }
    }

    fn resolve_waiting_replies(&mut self, target: &MessageId, changes: &mut Vec<ElementChange>) {
        let Some(waiting) = self.waiting_replies.remove(target) else {
            return;
        };
        let Some(preview) = self.messages.get(target).map(Interaction::as_reply_preview) else {
            return;
        };
        for id in waiting {
            if let Some(reply) = self.messages.get_mut(&id) {
                reply.reply_preview = Some(preview.clone());
                changes.push(ElementChange::Updated(reply.clone()));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Delivery status
    // -----------------------------------------------------------------------

    pub fn set_message_status(
        &mut self,
        message: &MessageId,
        contact: &str,
        status: InteractionStatus,
    ) -> Vec<ElementChange> {
        let mut changes = Vec::new();
        let Some(msg) = self.messages.get_mut(message) else {
            debug!(conversation = %self.id, message = %message, "Status for unknown message");
            return changes;
        };
        msg.statuses.insert(contact.to_string(), status);
        msg.status = status;

        if status == InteractionStatus::Displayed {
            msg.displayed_by.insert(contact.to_string());
            let updated = msg.clone();
            let previous = self
                .last_displayed
                .insert(contact.to_string(), message.clone())
                .filter(|p| p != message);
            if let Some(prev) = previous.and_then(|p| self.messages.get_mut(&p)) {
                prev.displayed_by.remove(contact);
                changes.push(ElementChange::Updated(prev.clone()));
            }
            changes.push(ElementChange::Updated(updated));
        } else {
            changes.push(ElementChange::Updated(msg.clone()));
        }
        changes
    }
}

fn set_duration(interaction: &mut Interaction, duration: u64) {
    if let InteractionBody::Call { duration_ms, .. } = &mut interaction.body {
        *duration_ms = duration;
    }
}
