pub mod capability;
pub mod commands;
pub mod config;
pub mod events;
pub mod service;
pub mod state;

use tracing_subscriber::{fmt, EnvFilter};

pub use capability::{AllowAll, CallGate, GateDecision, PlaceCallRequest};
pub use commands::SessionHandle;
pub use config::SessionConfig;
pub use events::{spawn_forwarder, EventPayload, SessionBus};
pub use service::{spawn_session, SessionCommand};

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured directive. Calling this twice is harmless.
pub fn init_tracing(config: &SessionConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_directive));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    tracing::info!(app = confab_shared::constants::APP_NAME, "Tracing initialised");
}
