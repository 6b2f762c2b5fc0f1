//! Call gate: an external call-management facility may veto calls before
//! they are placed or answered, and bind itself to the resulting call.

use std::fmt;

use futures::future::{self, BoxFuture, FutureExt};

use confab_media::Call;
use confab_shared::types::{AccountId, Uri};

/// Invoked with the live call once it exists, or `None` when placing failed.
pub type CallBinding = Box<dyn FnOnce(Option<Call>) + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceCallRequest {
    pub account: AccountId,
    /// Swarm conversation the call belongs to, if any.
    pub conversation: Option<Uri>,
    pub target: Uri,
    pub with_video: bool,
}

pub enum GateDecision {
    Allowed,
    Denied,
    AllowedWithBinding(CallBinding),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Denied)
    }

    /// Hand the call to the binding, if there is one.
    pub fn bind(self, call: Option<Call>) {
        if let Self::AllowedWithBinding(binding) = self {
            binding(call);
        }
    }
}

impl fmt::Debug for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed => f.write_str("Allowed"),
            Self::Denied => f.write_str("Denied"),
            Self::AllowedWithBinding(_) => f.write_str("AllowedWithBinding"),
        }
    }
}

pub trait CallGate: Send + Sync {
    fn request_place_call(&self, request: &PlaceCallRequest) -> BoxFuture<'static, GateDecision>;

    fn request_incoming_call(&self, call: &Call) -> BoxFuture<'static, GateDecision>;
}

/// Gate used when no call-management facility is present.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl CallGate for AllowAll {
    fn request_place_call(&self, _: &PlaceCallRequest) -> BoxFuture<'static, GateDecision> {
        future::ready(GateDecision::Allowed).boxed()
    }

    fn request_incoming_call(&self, _: &Call) -> BoxFuture<'static, GateDecision> {
        future::ready(GateDecision::Allowed).boxed()
    }
}
