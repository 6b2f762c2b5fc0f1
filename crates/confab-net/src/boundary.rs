//! Command side of the daemon boundary.
//!
//! The daemon exposes a synchronous command API; every command returns
//! immediately with a [`CommandReply`] and the real outcome arrives later as
//! a [`confab_shared::protocol::DaemonEvent`].

use std::sync::Arc;

use confab_shared::error::BoundaryError;
use confab_shared::protocol::{CommandReply, DaemonCommand};
use tracing::{debug, warn};

pub trait DaemonBoundary: Send + Sync {
    fn execute(&self, command: DaemonCommand) -> Result<CommandReply, BoundaryError>;
}

impl<T: DaemonBoundary + ?Sized> DaemonBoundary for Arc<T> {
    fn execute(&self, command: DaemonCommand) -> Result<CommandReply, BoundaryError> {
        (**self).execute(command)
    }
}

/// Run a command whose outcome is only reported asynchronously. Failures
/// are logged and swallowed.
pub fn fire_and_forget(boundary: &dyn DaemonBoundary, command: DaemonCommand) {
    let name = command.name();
    match boundary.execute(command) {
        Ok(reply) if !reply.accepted() => {
            warn!(command = name, "Daemon declined command");
        }
        Ok(_) => debug!(command = name, "Command issued"),
        Err(e) => warn!(command = name, error = %e, "Command failed"),
    }
}
