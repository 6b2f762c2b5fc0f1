//! Following one conference across merges and splits.
//!
//! Conference ids are not stable: a call's implicit conference disappears
//! when the call is merged into a daemon conference, and comes back when
//! the conference splits. Only participant identity survives, so the
//! tracker re-anchors on the participant relationship.

use futures::stream::{self, Stream};
use tracing::debug;

use confab_net::Subscription;
use confab_shared::types::{CallId, ConferenceId};

use crate::call::Call;
use crate::conference::ConferenceSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackState {
    Tracking(ConferenceId),
    /// The tracked conference was merged into a larger one.
    Upgraded { from: ConferenceId, to: ConferenceId },
    /// The tracked conference shrank back to a single call.
    Downgraded { from: ConferenceId, to: ConferenceId },
}

#[derive(Debug, Clone)]
pub struct ConferenceTracker {
    anchor: ConferenceSnapshot,
    state: TrackState,
}

impl ConferenceTracker {
    pub fn new(anchor: ConferenceSnapshot) -> Self {
        let state = TrackState::Tracking(anchor.id.clone());
        Self { anchor, state }
    }

    pub fn anchor(&self) -> &ConferenceSnapshot {
        &self.anchor
    }

    pub fn state(&self) -> &TrackState {
        &self.state
    }

    /// Decide whether `reported` concerns the tracked conference, and how.
    pub fn transition(&self, reported: &ConferenceSnapshot) -> Option<TrackState> {
        let tracked = &self.anchor;
        if reported.id == tracked.id {
            return Some(TrackState::Tracking(reported.id.clone()));
        }

        let upgraded = reported.contains(&CallId::new(tracked.id.as_str()));
        if upgraded {
            return Some(TrackState::Upgraded {
                from: tracked.id.clone(),
                to: reported.id.clone(),
            });
        }

        let same_sole_call = match (tracked.sole_call(), reported.sole_call()) {
            (Some(a), Some(b)) => a.id.is_some() && a.id == b.id,
            _ => false,
        };
        let reported_is_call = reported
            .sole_call()
            .and_then(|c| c.id.as_ref())
            .is_some_and(|id| reported.id.is_call(id));
        if same_sole_call && reported_is_call {
            return Some(TrackState::Downgraded {
                from: tracked.id.clone(),
                to: reported.id.clone(),
            });
        }
        None
    }

    /// Feed a published conference. Returns the new anchor when it applies.
    pub fn observe(&mut self, reported: &ConferenceSnapshot) -> Option<&ConferenceSnapshot> {
        let next = self.transition(reported)?;
        if !matches!(next, TrackState::Tracking(_)) {
            debug!(state = ?next, "Conference tracking re-anchored");
        }
        self.state = next;
        self.anchor = reported.clone();
        Some(&self.anchor)
    }

    /// Feed a published call. A participant or host call update refreshes
    /// the anchored snapshot.
    pub fn observe_call(&mut self, call: &Call) -> Option<&ConferenceSnapshot> {
        let id = call.id.as_ref()?;
        if let Some(slot) = self
            .anchor
            .participants
            .iter_mut()
            .find(|c| c.id.as_ref() == Some(id))
        {
            *slot = call.clone();
            return Some(&self.anchor);
        }
        match self.anchor.host_call.as_mut() {
            Some(host) if host.id.as_ref() == Some(id) => {
                *host = call.clone();
                Some(&self.anchor)
            }
            _ => None,
        }
    }
}

/// Live sequence of snapshots for one conference, starting with its
/// current state.
pub struct ConferenceObserver {
    tracker: ConferenceTracker,
    conferences: Subscription<ConferenceSnapshot>,
    calls: Subscription<Call>,
    initial_sent: bool,
}

impl ConferenceObserver {
    pub fn new(
        initial: ConferenceSnapshot,
        conferences: Subscription<ConferenceSnapshot>,
        calls: Subscription<Call>,
    ) -> Self {
        Self {
            tracker: ConferenceTracker::new(initial),
            conferences,
            calls,
            initial_sent: false,
        }
    }

    pub fn tracker(&self) -> &ConferenceTracker {
        &self.tracker
    }

    /// Next snapshot of the tracked conference. `None` once the session
    /// has shut down.
    pub async fn next(&mut self) -> Option<ConferenceSnapshot> {
        if !self.initial_sent {
            self.initial_sent = true;
            return Some(self.tracker.anchor().clone());
        }
        loop {
            tokio::select! {
                conf = self.conferences.recv() => {
                    let conf = conf?;
                    if let Some(anchor) = self.tracker.observe(&conf) {
                        return Some(anchor.clone());
                    }
                }
                call = self.calls.recv() => {
                    let call = call?;
                    if let Some(anchor) = self.tracker.observe_call(&call) {
                        return Some(anchor.clone());
                    }
                }
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ConferenceSnapshot> {
        stream::unfold(self, |mut observer| async move {
            let next = observer.next().await?;
            Some((next, observer))
        })
    }
}
