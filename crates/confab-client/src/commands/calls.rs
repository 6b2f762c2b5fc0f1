use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use confab_media::Call;
use confab_shared::error::{BoundaryError, CallError};
use confab_shared::protocol::DaemonCommand;
use confab_shared::types::{AccountId, CallId, Direction, Media, MediaType, Uri};

use super::SessionHandle;
use crate::capability::PlaceCallRequest;
use crate::service::SessionCommand;
use crate::state::SessionState;

pub type Reply<T> = oneshot::Sender<Result<T, CallError>>;

pub enum CallCommand {
    Place {
        request: PlaceCallRequest,
        reply: Reply<Call>,
    },
    Accept {
        call: CallId,
        with_video: bool,
        reply: Reply<()>,
    },
    Refuse {
        call: CallId,
        reply: Reply<()>,
    },
    HangUp {
        call: CallId,
        reply: Reply<()>,
    },
    /// Hang up the call's conference if it is in one, else the call.
    HangUpAny {
        call: CallId,
        reply: Reply<()>,
    },
    Hold {
        call: CallId,
        reply: Reply<()>,
    },
    Unhold {
        call: CallId,
        reply: Reply<()>,
    },
    Transfer {
        call: CallId,
        to: String,
        reply: Reply<()>,
    },
    AttendedTransfer {
        transfer: CallId,
        target: CallId,
        reply: Reply<()>,
    },
    /// `id` is a call id or a conference id.
    SetLocalMediaMuted {
        id: String,
        media_type: MediaType,
        muted: bool,
        reply: Reply<()>,
    },
    ReplaceVideoMedia {
        call: CallId,
        source: String,
        reply: Reply<()>,
    },
}

// ---------------------------------------------------------------------------
// Handle side
// ---------------------------------------------------------------------------

impl SessionHandle {
    /// Place a call after the call gate allows it. The gate's binding, if
    /// any, receives the resulting call, or `None` when placing failed.
    pub async fn place_call(
        &self,
        account: AccountId,
        conversation: Option<&Uri>,
        target: &Uri,
        with_video: bool,
    ) -> Result<Call, CallError> {
        let request = PlaceCallRequest {
            account,
            conversation: conversation.cloned(),
            target: target.clone(),
            with_video,
        };
        let decision = self.gate.request_place_call(&request).await;
        if !decision.is_allowed() {
            info!(peer = %request.target, "Call placement denied");
            return Err(CallError::NotAllowed);
        }

        let result = self
            .request(
                |reply| SessionCommand::Call(CallCommand::Place { request, reply }),
                CallError::SessionClosed,
            )
            .await;
        decision.bind(result.as_ref().ok().cloned());
        result
    }

    pub async fn accept(&self, call: &CallId, with_video: bool) -> Result<(), CallError> {
        let call = call.clone();
        self.call_command(|reply| CallCommand::Accept {
            call,
            with_video,
            reply,
        })
        .await
    }

    pub async fn refuse(&self, call: &CallId) -> Result<(), CallError> {
        let call = call.clone();
        self.call_command(|reply| CallCommand::Refuse { call, reply }).await
    }

    pub async fn hang_up(&self, call: &CallId) -> Result<(), CallError> {
        let call = call.clone();
        self.call_command(|reply| CallCommand::HangUp { call, reply }).await
    }

    pub async fn hang_up_any(&self, call: &CallId) -> Result<(), CallError> {
        let call = call.clone();
        self.call_command(|reply| CallCommand::HangUpAny { call, reply }).await
    }

    pub async fn hold(&self, call: &CallId) -> Result<(), CallError> {
        let call = call.clone();
        self.call_command(|reply| CallCommand::Hold { call, reply }).await
    }

    pub async fn unhold(&self, call: &CallId) -> Result<(), CallError> {
        let call = call.clone();
        self.call_command(|reply| CallCommand::Unhold { call, reply }).await
    }

    pub async fn transfer(&self, call: &CallId, to: &str) -> Result<(), CallError> {
        let (call, to) = (call.clone(), to.to_string());
        self.call_command(|reply| CallCommand::Transfer { call, to, reply })
            .await
    }

    pub async fn attended_transfer(&self, transfer: &CallId, target: &CallId) -> Result<(), CallError> {
        let (transfer, target) = (transfer.clone(), target.clone());
        self.call_command(|reply| CallCommand::AttendedTransfer {
            transfer,
            target,
            reply,
        })
        .await
    }

    pub async fn set_local_media_muted(
        &self,
        id: &str,
        media_type: MediaType,
        muted: bool,
    ) -> Result<(), CallError> {
        let id = id.to_string();
        self.call_command(|reply| CallCommand::SetLocalMediaMuted {
            id,
            media_type,
            muted,
            reply,
        })
        .await
    }

    /// Switch the call's video to `source`, e.g. a screen share.
    pub async fn replace_video_media(&self, call: &CallId, source: &str) -> Result<(), CallError> {
        let (call, source) = (call.clone(), source.to_string());
        self.call_command(|reply| CallCommand::ReplaceVideoMedia {
            call,
            source,
            reply,
        })
        .await
    }

    async fn call_command(
        &self,
        make: impl FnOnce(Reply<()>) -> CallCommand,
    ) -> Result<(), CallError> {
        self.request(
            |reply| SessionCommand::Call(make(reply)),
            CallError::SessionClosed,
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Session side
// ---------------------------------------------------------------------------

impl SessionState {
    pub(crate) fn handle_call_command(&mut self, cmd: CallCommand) {
        match cmd {
            CallCommand::Place { request, reply } => {
                let _ = reply.send(self.place_call(request));
            }
            CallCommand::Accept {
                call,
                with_video,
                reply,
            } => {
                let _ = reply.send(self.accept(&call, with_video));
            }
            CallCommand::Refuse { call, reply } => {
                let _ = reply.send(self.on_call(&call, |account, call_id| {
                    DaemonCommand::Refuse { account, call_id }
                }));
            }
            CallCommand::HangUp { call, reply } => {
                let _ = reply.send(self.on_call(&call, |account, call_id| {
                    DaemonCommand::HangUp { account, call_id }
                }));
            }
            CallCommand::HangUpAny { call, reply } => {
                let _ = reply.send(self.hang_up_any(&call));
            }
            CallCommand::Hold { call, reply } => {
                let _ = reply.send(self.on_call(&call, |account, call_id| {
                    DaemonCommand::Hold { account, call_id }
                }));
            }
            CallCommand::Unhold { call, reply } => {
                let _ = reply.send(self.on_call(&call, |account, call_id| {
                    DaemonCommand::Unhold { account, call_id }
                }));
            }
            CallCommand::Transfer { call, to, reply } => {
                let _ = reply.send(self.on_call(&call, |account, call_id| {
                    DaemonCommand::Transfer {
                        account,
                        call_id,
                        to,
                    }
                }));
            }
            CallCommand::AttendedTransfer {
                transfer,
                target,
                reply,
            } => {
                let _ = reply.send(self.on_call(&transfer, |account, transfer_id| {
                    DaemonCommand::AttendedTransfer {
                        account,
                        transfer_id,
                        target_id: target,
                    }
                }));
            }
            CallCommand::SetLocalMediaMuted {
                id,
                media_type,
                muted,
                reply,
            } => {
                let _ = reply.send(self.set_local_media_muted(id, media_type, muted));
            }
            CallCommand::ReplaceVideoMedia {
                call,
                source,
                reply,
            } => {
                let _ = reply.send(self.replace_video_media(&call, source));
            }
        }
    }

    /// Run a command whose reply must be checked. A declined command is
    /// reported as rejected.
    pub(crate) fn execute(&self, command: DaemonCommand) -> Result<(), BoundaryError> {
        let name = command.name();
        let reply = self.boundary.execute(command)?;
        if !reply.accepted() {
            return Err(BoundaryError::Rejected {
                command: name,
                reason: "declined by daemon".to_string(),
            });
        }
        debug!(command = name, "Command issued");
        Ok(())
    }

    /// Issue a command for a known call. Unknown or finished calls are a
    /// no-op.
    fn on_call<F>(&self, call: &CallId, make: F) -> Result<(), CallError>
    where
        F: FnOnce(AccountId, CallId) -> DaemonCommand,
    {
        let Some(account) = self.registry.call(call).map(|c| c.account.clone()) else {
            debug!(call = %call, "Command for unknown call ignored");
            return Ok(());
        };
        self.execute(make(account, call.clone()))?;
        Ok(())
    }

    fn place_call(&mut self, request: PlaceCallRequest) -> Result<Call, CallError> {
        let PlaceCallRequest {
            account,
            conversation,
            target,
            with_video,
        } = request;

        let mut media = vec![Media::default_audio()];
        if with_video {
            media.push(Media::default_video());
        }

        let id = self
            .boundary
            .execute(DaemonCommand::PlaceCall {
                account: account.clone(),
                to: target.clone(),
                media: media.clone(),
            })?
            .into_call_id()?;

        let conversation = conversation.as_ref().and_then(Uri::conversation_id);
        if id.is_empty() {
            if target.is_swarm() && conversation.is_some() {
                let call = Call::provisional(account, target, conversation, media);
                info!(peer = %call.peer, "Swarm call placed, awaiting conference");
                self.registry.park_host_call(call.clone());
                return Ok(call);
            }
            warn!(peer = %target, "Daemon returned an empty call id");
            return Err(CallError::EmptyCallId);
        }

        let call = self.registry.add_call(
            account,
            CallId::new(id),
            target,
            Direction::Outgoing,
            media,
            conversation,
        );
        info!(call = %call.id_str(), peer = %call.peer, video = with_video, "Call placed");
        Ok(call)
    }

    fn accept(&mut self, id: &CallId, with_video: bool) -> Result<(), CallError> {
        let Some(call) = self.registry.call(id) else {
            debug!(call = %id, "Accept for unknown call ignored");
            return Ok(());
        };
        let account = call.account.clone();
        let media = call.accepted_media(with_video);
        self.registry.set_media(id, media.clone());
        self.execute(DaemonCommand::Accept {
            account,
            call_id: id.clone(),
            media,
        })?;
        info!(call = %id, video = with_video, "Call accepted");
        Ok(())
    }

    fn hang_up_any(&mut self, id: &CallId) -> Result<(), CallError> {
        let Some(call) = self.registry.call(id) else {
            debug!(call = %id, "Hang up for unknown call ignored");
            return Ok(());
        };
        let account = call.account.clone();
        let command = match call.conf_id().filter(|c| self.registry.conference(c).is_some()) {
            Some(conf_id) => DaemonCommand::HangUpConference {
                account,
                conf_id: conf_id.clone(),
            },
            None => DaemonCommand::HangUp {
                account,
                call_id: id.clone(),
            },
        };
        self.execute(command)?;
        Ok(())
    }

    fn set_local_media_muted(
        &mut self,
        id: String,
        media_type: MediaType,
        muted: bool,
    ) -> Result<(), CallError> {
        let Some(account) = self.account_for(&id) else {
            debug!(id = %id, "Mute for unknown call or conference ignored");
            return Ok(());
        };
        self.registry.set_local_mute(&id, media_type, muted);
        self.execute(DaemonCommand::MuteLocalMedia {
            account,
            call_id: id,
            media_type,
            mute: muted,
        })?;
        Ok(())
    }

    fn replace_video_media(&mut self, id: &CallId, source: String) -> Result<(), CallError> {
        let Some(call) = self.registry.call(id) else {
            debug!(call = %id, "Media change for unknown call ignored");
            return Ok(());
        };
        let account = call.account.clone();
        let mut media = call.media.clone();
        match media.iter_mut().find(|m| m.media_type == MediaType::Video) {
            Some(video) => {
                video.source = source;
                video.enabled = true;
                video.muted = false;
            }
            None => media.push(Media {
                source,
                ..Media::default_video()
            }),
        }
        self.execute(DaemonCommand::RequestMediaChange {
            account,
            call_id: id.clone(),
            media,
        })?;
        Ok(())
    }
}
