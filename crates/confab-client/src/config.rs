//! Session configuration loaded from environment variables.
//!
//! Every setting has a default, so a session can start with no
//! configuration at all.

use std::str::FromStr;

use confab_shared::constants::{
    DEFAULT_BUS_CAPACITY, DEFAULT_COMMAND_CAPACITY, DEFAULT_EVENT_CAPACITY, DEFAULT_LOAD_COUNT,
    DEFAULT_READY_LOAD_COUNT,
};

/// Default tracing directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_DIRECTIVE: &str =
    "confab_client=debug,confab_media=debug,confab_store=debug,confab_net=info,warn";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the session command channel.
    /// Env: `CONFAB_COMMAND_CAPACITY`
    pub command_capacity: usize,

    /// Capacity of the daemon event channel.
    /// Env: `CONFAB_EVENT_CAPACITY`
    pub event_capacity: usize,

    /// Capacity of each broadcast topic. Slow subscribers past this lag
    /// and skip values.
    /// Env: `CONFAB_BUS_CAPACITY`
    pub bus_capacity: usize,

    /// Page size of `load_more` when the caller gives none.
    /// Env: `CONFAB_LOAD_COUNT`
    pub load_count: u32,

    /// Page loaded when a conversation becomes ready.
    /// Env: `CONFAB_READY_LOAD_COUNT`
    pub ready_load_count: u32,

    /// Env: `CONFAB_LOG`
    pub log_directive: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            bus_capacity: DEFAULT_BUS_CAPACITY,
            load_count: DEFAULT_LOAD_COUNT,
            ready_load_count: DEFAULT_READY_LOAD_COUNT,
            log_directive: DEFAULT_LOG_DIRECTIVE.to_string(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        parse_into(&lookup, "CONFAB_COMMAND_CAPACITY", &mut config.command_capacity);
        parse_into(&lookup, "CONFAB_EVENT_CAPACITY", &mut config.event_capacity);
        parse_into(&lookup, "CONFAB_BUS_CAPACITY", &mut config.bus_capacity);
        parse_into(&lookup, "CONFAB_LOAD_COUNT", &mut config.load_count);
        parse_into(&lookup, "CONFAB_READY_LOAD_COUNT", &mut config.ready_load_count);

        if let Some(directive) = lookup("CONFAB_LOG").filter(|d| !d.is_empty()) {
            config.log_directive = directive;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

/// Parse a positive number into `field`, keeping the default otherwise.
fn parse_into<F, T>(lookup: &F, key: &str, field: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default,
{
    let Some(value) = lookup(key) else {
        return;
    };
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => *field = parsed,
        _ => {
            tracing::warn!(key, value = %value, "Invalid value, using default");
        }
    }
}
