use tokio::sync::oneshot;
use tracing::{debug, info};

use confab_media::ConferenceObserver;
use confab_shared::error::CallError;
use confab_shared::protocol::DaemonCommand;
use confab_shared::types::{AccountId, CallId, ConferenceId};

use super::calls::Reply;
use super::SessionHandle;
use crate::service::SessionCommand;
use crate::state::SessionState;

/// Remote participant addressed by a moderator action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRef {
    pub peer: String,
    pub device: String,
}

pub enum ConferenceCommand {
    Hold {
        conf: ConferenceId,
        reply: Reply<()>,
    },
    Unhold {
        conf: ConferenceId,
        reply: Reply<()>,
    },
    HangUp {
        conf: ConferenceId,
        reply: Reply<()>,
    },
    AddParticipant {
        call: CallId,
        conf: ConferenceId,
        reply: Reply<()>,
    },
    AddMainParticipant {
        conf: ConferenceId,
        reply: Reply<()>,
    },
    JoinParticipant {
        selected: CallId,
        dragged: CallId,
        reply: Reply<()>,
    },
    JoinConference {
        selected: ConferenceId,
        dragged: ConferenceId,
        reply: Reply<()>,
    },
    Detach {
        call: CallId,
        reply: Reply<()>,
    },
    MuteStream {
        conf: ConferenceId,
        participant: ParticipantRef,
        stream: String,
        mute: bool,
        reply: Reply<()>,
    },
    HangUpParticipant {
        conf: ConferenceId,
        participant: ParticipantRef,
        reply: Reply<()>,
    },
    RaiseHand {
        conf: ConferenceId,
        participant: ParticipantRef,
        raised: bool,
        reply: Reply<()>,
    },
    SetLayout {
        conf: ConferenceId,
        layout: u32,
        reply: Reply<()>,
    },
    SetActiveParticipant {
        conf: ConferenceId,
        peer: String,
        reply: Reply<()>,
    },
    /// `id` is a call id or a conference id.
    HoldCallOrConference {
        id: String,
        hold: bool,
        reply: Reply<()>,
    },
    Observe {
        id: String,
        reply: oneshot::Sender<Result<ConferenceObserver, CallError>>,
    },
}

// ---------------------------------------------------------------------------
// Handle side
// ---------------------------------------------------------------------------

impl SessionHandle {
    pub async fn hold_conference(&self, conf: &ConferenceId) -> Result<(), CallError> {
        let conf = conf.clone();
        self.conference_command(|reply| ConferenceCommand::Hold { conf, reply })
            .await
    }

    pub async fn unhold_conference(&self, conf: &ConferenceId) -> Result<(), CallError> {
        let conf = conf.clone();
        self.conference_command(|reply| ConferenceCommand::Unhold { conf, reply })
            .await
    }

    pub async fn hang_up_conference(&self, conf: &ConferenceId) -> Result<(), CallError> {
        let conf = conf.clone();
        self.conference_command(|reply| ConferenceCommand::HangUp { conf, reply })
            .await
    }

    pub async fn add_participant(&self, call: &CallId, conf: &ConferenceId) -> Result<(), CallError> {
        let (call, conf) = (call.clone(), conf.clone());
        self.conference_command(|reply| ConferenceCommand::AddParticipant { call, conf, reply })
            .await
    }

    /// Bring the local user back into a conference it detached from.
    pub async fn add_main_participant(&self, conf: &ConferenceId) -> Result<(), CallError> {
        let conf = conf.clone();
        self.conference_command(|reply| ConferenceCommand::AddMainParticipant { conf, reply })
            .await
    }

    /// Merge two calls into a new conference.
    pub async fn join_participant(&self, selected: &CallId, dragged: &CallId) -> Result<(), CallError> {
        let (selected, dragged) = (selected.clone(), dragged.clone());
        self.conference_command(|reply| ConferenceCommand::JoinParticipant {
            selected,
            dragged,
            reply,
        })
        .await
    }

    pub async fn join_conference(
        &self,
        selected: &ConferenceId,
        dragged: &ConferenceId,
    ) -> Result<(), CallError> {
        let (selected, dragged) = (selected.clone(), dragged.clone());
        self.conference_command(|reply| ConferenceCommand::JoinConference {
            selected,
            dragged,
            reply,
        })
        .await
    }

    pub async fn detach_participant(&self, call: &CallId) -> Result<(), CallError> {
        let call = call.clone();
        self.conference_command(|reply| ConferenceCommand::Detach { call, reply })
            .await
    }

    pub async fn mute_stream(
        &self,
        conf: &ConferenceId,
        participant: ParticipantRef,
        stream: &str,
        mute: bool,
    ) -> Result<(), CallError> {
        let (conf, stream) = (conf.clone(), stream.to_string());
        self.conference_command(|reply| ConferenceCommand::MuteStream {
            conf,
            participant,
            stream,
            mute,
            reply,
        })
        .await
    }

    pub async fn hang_up_participant(
        &self,
        conf: &ConferenceId,
        participant: ParticipantRef,
    ) -> Result<(), CallError> {
        let conf = conf.clone();
        self.conference_command(|reply| ConferenceCommand::HangUpParticipant {
            conf,
            participant,
            reply,
        })
        .await
    }

    pub async fn raise_hand(
        &self,
        conf: &ConferenceId,
        participant: ParticipantRef,
        raised: bool,
    ) -> Result<(), CallError> {
        let conf = conf.clone();
        self.conference_command(|reply| ConferenceCommand::RaiseHand {
            conf,
            participant,
            raised,
            reply,
        })
        .await
    }

    pub async fn set_conference_layout(&self, conf: &ConferenceId, layout: u32) -> Result<(), CallError> {
        let conf = conf.clone();
        self.conference_command(|reply| ConferenceCommand::SetLayout { conf, layout, reply })
            .await
    }

    pub async fn set_active_participant(&self, conf: &ConferenceId, peer: &str) -> Result<(), CallError> {
        let (conf, peer) = (conf.clone(), peer.to_string());
        self.conference_command(|reply| ConferenceCommand::SetActiveParticipant { conf, peer, reply })
            .await
    }

    pub async fn hold_call_or_conference(&self, id: &str) -> Result<(), CallError> {
        let id = id.to_string();
        self.conference_command(|reply| ConferenceCommand::HoldCallOrConference {
            id,
            hold: true,
            reply,
        })
        .await
    }

    pub async fn unhold_call_or_conference(&self, id: &str) -> Result<(), CallError> {
        let id = id.to_string();
        self.conference_command(|reply| ConferenceCommand::HoldCallOrConference {
            id,
            hold: false,
            reply,
        })
        .await
    }

    /// Follow a conference, or the implicit conference of a call, across
    /// merges and splits. The first item is the current snapshot.
    pub async fn observe_conference(&self, id: &str) -> Result<ConferenceObserver, CallError> {
        let id = id.to_string();
        self.request(
            |reply| SessionCommand::Conference(ConferenceCommand::Observe { id, reply }),
            CallError::SessionClosed,
        )
        .await
    }

    async fn conference_command(
        &self,
        make: impl FnOnce(Reply<()>) -> ConferenceCommand,
    ) -> Result<(), CallError> {
        self.request(
            |reply| SessionCommand::Conference(make(reply)),
            CallError::SessionClosed,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Session side
// ---------------------------------------------------------------------------

impl SessionState {
    pub(crate) fn handle_conference_command(&mut self, cmd: ConferenceCommand) {
        match cmd {
            ConferenceCommand::Hold { conf, reply } => {
                let _ = reply.send(self.on_conference(&conf, |account, conf_id| {
                    DaemonCommand::HoldConference { account, conf_id }
                }));
            }
            ConferenceCommand::Unhold { conf, reply } => {
                let _ = reply.send(self.on_conference(&conf, |account, conf_id| {
                    DaemonCommand::UnholdConference { account, conf_id }
                }));
            }
            ConferenceCommand::HangUp { conf, reply } => {
                let _ = reply.send(self.on_conference(&conf, |account, conf_id| {
                    DaemonCommand::HangUpConference { account, conf_id }
                }));
            }
            ConferenceCommand::AddParticipant { call, conf, reply } => {
                let _ = reply.send(self.on_conference(&conf, |account, conf_id| {
                    DaemonCommand::AddParticipant {
                        account,
                        call_id: call,
                        conf_id,
                    }
                }));
            }
            ConferenceCommand::AddMainParticipant { conf, reply } => {
                let _ = reply.send(self.on_conference(&conf, |account, conf_id| {
                    DaemonCommand::AddMainParticipant { account, conf_id }
                }));
            }
            ConferenceCommand::JoinParticipant {
                selected,
                dragged,
                reply,
            } => {
                let _ = reply.send(self.join_participant(selected, dragged));
            }
            ConferenceCommand::JoinConference {
                selected,
                dragged,
                reply,
            } => {
                let _ = reply.send(self.on_conference(&selected, |account, selected| {
                    DaemonCommand::JoinConference {
                        account,
                        selected,
                        dragged,
                    }
                }));
            }
            ConferenceCommand::Detach { call, reply } => {
                let result = match self.registry.call(&call).map(|c| c.account.clone()) {
                    Some(account) => self
                        .execute(DaemonCommand::DetachParticipant {
                            account,
                            call_id: call,
                        })
                        .map_err(CallError::from),
                    None => {
                        debug!(call = %call, "Detach of unknown call ignored");
                        Ok(())
                    }
                };
                let _ = reply.send(result);
            }
            ConferenceCommand::MuteStream {
                conf,
                participant,
                stream,
                mute,
                reply,
            } => {
                let _ = reply.send(self.on_conference(&conf, |account, conf_id| {
                    DaemonCommand::MuteStream {
                        account,
                        conf_id,
                        peer: participant.peer,
                        device: participant.device,
                        stream,
                        mute,
                    }
                }));
            }
            ConferenceCommand::HangUpParticipant {
                conf,
                participant,
                reply,
            } => {
                let _ = reply.send(self.on_conference(&conf, |account, conf_id| {
                    DaemonCommand::HangUpParticipant {
                        account,
                        conf_id,
                        peer: participant.peer,
                        device: participant.device,
                    }
                }));
            }
            ConferenceCommand::RaiseHand {
                conf,
                participant,
                raised,
                reply,
            } => {
                let _ = reply.send(self.on_conference(&conf, |account, conf_id| {
                    DaemonCommand::RaiseHand {
                        account,
                        conf_id,
                        peer: participant.peer,
                        device: participant.device,
                        raised,
                    }
                }));
            }
            ConferenceCommand::SetLayout {
                conf,
                layout,
                reply,
            } => {
                let _ = reply.send(self.on_conference(&conf, |account, conf_id| {
                    DaemonCommand::SetConferenceLayout {
                        account,
                        conf_id,
                        layout,
                    }
                }));
            }
            ConferenceCommand::SetActiveParticipant { conf, peer, reply } => {
                let _ = reply.send(self.on_conference(&conf, |account, conf_id| {
                    DaemonCommand::SetActiveParticipant {
                        account,
                        conf_id,
                        peer,
                    }
                }));
            }
            ConferenceCommand::HoldCallOrConference { id, hold, reply } => {
                let _ = reply.send(self.hold_call_or_conference(&id, hold));
            }
            ConferenceCommand::Observe { id, reply } => {
                let _ = reply.send(self.observe(&id));
            }
        }
    }

    /// Issue a command for a known conference. Unknown conferences are a
    /// no-op.
    fn on_conference<F>(&self, conf: &ConferenceId, make: F) -> Result<(), CallError>
    where
        F: FnOnce(AccountId, ConferenceId) -> DaemonCommand,
    {
        let Some(account) = self.registry.conference(conf).map(|c| c.account) else {
            debug!(conf = %conf, "Command for unknown conference ignored");
            return Ok(());
        };
        self.execute(make(account, conf.clone()))?;
        Ok(())
    }

    fn join_participant(&self, selected: CallId, dragged: CallId) -> Result<(), CallError> {
        let Some(account) = self.registry.call(&selected).map(|c| c.account.clone()) else {
            debug!(call = %selected, "Join with unknown call ignored");
            return Ok(());
        };
        if self.registry.call(&dragged).is_none() {
            debug!(call = %dragged, "Join with unknown call ignored");
            return Ok(());
        }
        self.execute(DaemonCommand::JoinParticipant {
            account,
            selected,
            dragged,
        })?;
        Ok(())
    }

    /// Hold or resume whatever `id` names: the single call of a simple
    /// conference, or the whole conference.
    fn hold_call_or_conference(&mut self, id: &str, hold: bool) -> Result<(), CallError> {
        let framed = self
            .registry
            .conference(&ConferenceId::from(id))
            .or_else(|| self.registry.conference_of(&CallId::from(id)));

        let command = match framed {
            Some(conf) if conf.is_simple_call() => {
                let Some(call_id) = conf.sole_call().and_then(|c| c.id.clone()) else {
                    return Ok(());
                };
                if hold {
                    DaemonCommand::Hold {
                        account: conf.account,
                        call_id,
                    }
                } else {
                    DaemonCommand::Unhold {
                        account: conf.account,
                        call_id,
                    }
                }
            }
            Some(conf) if hold => DaemonCommand::HoldConference {
                account: conf.account,
                conf_id: conf.id,
            },
            Some(conf) => DaemonCommand::UnholdConference {
                account: conf.account,
                conf_id: conf.id,
            },
            None => return self.on_call_hold(&CallId::from(id), hold),
        };
        self.execute(command)?;
        Ok(())
    }

    fn on_call_hold(&self, call: &CallId, hold: bool) -> Result<(), CallError> {
        let Some(account) = self.registry.call(call).map(|c| c.account.clone()) else {
            debug!(id = %call, "Hold for unknown call or conference ignored");
            return Ok(());
        };
        let call_id = call.clone();
        let command = if hold {
            DaemonCommand::Hold { account, call_id }
        } else {
            DaemonCommand::Unhold { account, call_id }
        };
        self.execute(command)?;
        Ok(())
    }

    fn observe(&mut self, id: &str) -> Result<ConferenceObserver, CallError> {
        let snapshot = match self.registry.conference(&ConferenceId::from(id)) {
            Some(snapshot) => snapshot,
            None => self
                .registry
                .get_or_create_implicit_conference(&CallId::from(id))
                .ok_or_else(|| CallError::UnknownCall(id.to_string()))?,
        };
        info!(conf = %snapshot.id, "Observing conference");
        Ok(ConferenceObserver::new(
            snapshot,
            self.bus.conferences.subscribe(),
            self.bus.calls.subscribe(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::capability::AllowAll;
    use crate::config::SessionConfig;
    use crate::events::SessionBus;
    use confab_net::RecordingBoundary;
    use confab_shared::protocol::DaemonEvent;
    use confab_shared::types::{Direction, Uri};
    use tokio::sync::mpsc;

    fn acc() -> AccountId {
        AccountId::from("acc")
    }

    fn setup(calls: &[&str]) -> (Arc<RecordingBoundary>, SessionState) {
        let boundary = Arc::new(RecordingBoundary::new());
        let (tx, _rx) = mpsc::channel(1);
        let mut state = SessionState::new(
            boundary.clone(),
            Arc::new(AllowAll),
            SessionBus::new(32),
            SessionConfig::default(),
            tx.downgrade(),
        );
        for id in calls {
            state.registry.add_call(
                acc(),
                CallId::from(*id),
                Uri::parse(&format!("sip:{id}")),
                Direction::Outgoing,
                vec![],
                None,
            );
            state.handle_event(DaemonEvent::CallStateChanged {
                account: acc(),
                call_id: CallId::from(*id),
                state: "CURRENT".to_string(),
                detail_code: 0,
                details: HashMap::new(),
            });
        }
        (boundary, state)
    }

    fn merge(state: &mut SessionState, conf: &str, calls: &[&str]) {
        state.handle_event(DaemonEvent::ConferenceCreated {
            account: acc(),
            conversation: None,
            conf_id: ConferenceId::from(conf),
            participants: calls.iter().map(|c| CallId::from(*c)).collect(),
            state: "ACTIVE_ATTACHED".to_string(),
        });
    }

    #[test]
    fn test_hold_dispatches_on_conference_shape() {
        let (boundary, mut state) = setup(&["c1", "c2", "c3"]);
        merge(&mut state, "conf1", &["c1", "c2"]);
        boundary.clear();

        state.hold_call_or_conference("conf1", true).unwrap();
        state.hold_call_or_conference("c3", true).unwrap();
        state.hold_call_or_conference("c1", false).unwrap();
        assert_eq!(
            boundary.commands(),
            vec![
                DaemonCommand::HoldConference {
                    account: acc(),
                    conf_id: ConferenceId::from("conf1"),
                },
                DaemonCommand::Hold {
                    account: acc(),
                    call_id: CallId::from("c3"),
                },
                DaemonCommand::UnholdConference {
                    account: acc(),
                    conf_id: ConferenceId::from("conf1"),
                },
            ]
        );
    }

    #[test]
    fn test_unknown_conference_is_noop() {
        let (boundary, state) = setup(&[]);
        let result = state.on_conference(&ConferenceId::from("nope"), |account, conf_id| {
            DaemonCommand::HangUpConference { account, conf_id }
        });
        assert!(result.is_ok());
        assert!(boundary.commands().is_empty());
    }

    #[test]
    fn test_moderator_actions_address_participant() {
        let (boundary, mut state) = setup(&["c1", "c2"]);
        merge(&mut state, "conf1", &["c1", "c2"]);
        boundary.clear();

        let participant = ParticipantRef {
            peer: "c2".to_string(),
            device: "dev1".to_string(),
        };
        let (reply, _rx) = oneshot::channel();
        state.handle_conference_command(ConferenceCommand::RaiseHand {
            conf: ConferenceId::from("conf1"),
            participant,
            raised: true,
            reply,
        });
        assert_eq!(
            boundary.commands(),
            vec![DaemonCommand::RaiseHand {
                account: acc(),
                conf_id: ConferenceId::from("conf1"),
                peer: "c2".to_string(),
                device: "dev1".to_string(),
                raised: true,
            }]
        );
    }

    #[test]
    fn test_join_requires_both_calls() {
        let (boundary, state) = setup(&["c1"]);
        boundary.clear();
        state
            .join_participant(CallId::from("c1"), CallId::from("ghost"))
            .unwrap();
        assert!(boundary.commands().is_empty());
    }

    #[test]
    fn test_observe_existing_conference() {
        let (_boundary, mut state) = setup(&["c1", "c2"]);
        merge(&mut state, "conf1", &["c1", "c2"]);
        let observer = state.observe("conf1").unwrap();
        assert_eq!(observer.tracker().anchor().participants.len(), 2);
        assert!(observer.tracker().anchor().is_conference());

        let call = state.observe("c1").unwrap();
        assert_eq!(call.tracker().anchor().id, ConferenceId::from("conf1"));
    }
}
