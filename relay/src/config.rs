use blobrelay_core::{Context, Error, Result};
use log::warn;
use std::time::Duration;

/// Variable naming the destination account endpoint.
pub const RELAY_DESTINATION_ENDPOINT: &str = "RELAY_DESTINATION_ENDPOINT";
/// Variable overriding issued token validity, in seconds.
pub const RELAY_SAS_VALIDITY_SECS: &str = "RELAY_SAS_VALIDITY_SECS";
/// Variable overriding the pause between copy status reads, in ms.
pub const RELAY_POLL_INTERVAL_MS: &str = "RELAY_POLL_INTERVAL_MS";
/// Variable overriding the status read bound.
pub const RELAY_POLL_MAX_ATTEMPTS: &str = "RELAY_POLL_MAX_ATTEMPTS";

/// Config carries the settings one invocation runs with.
///
/// Populated from explicit values or from the environment through the
/// [`Context`], never from process-wide state, so tests can inject a
/// frozen environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Root address of the destination account
    /// (`https://{account}.{suffix}`). Required; a missing value aborts
    /// the invocation, not the process.
    pub destination_endpoint: Option<String>,
    /// How long issued tokens stay valid. Tokens cover one transfer and
    /// stay short regardless of blob size; the copy runs server-side.
    pub sas_validity: Duration,
    /// Pause between copy status reads.
    pub poll_interval: Duration,
    /// How many pending status reads are tolerated before the copy is
    /// declared timed out.
    pub poll_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination_endpoint: None,
            sas_validity: Duration::from_secs(600),
            poll_interval: Duration::from_secs(1),
            poll_max_attempts: 600,
        }
    }
}

impl Config {
    /// Load settings from the environment. Unparseable numeric values are
    /// logged and keep their defaults.
    pub fn from_env(mut self, ctx: &Context) -> Self {
        if let Some(v) = ctx.env_var(RELAY_DESTINATION_ENDPOINT) {
            self.destination_endpoint = Some(v.trim_end_matches('/').to_string());
        }

        if let Some(v) = ctx.env_var(RELAY_SAS_VALIDITY_SECS) {
            match v.parse::<u64>() {
                Ok(secs) => self.sas_validity = Duration::from_secs(secs),
                Err(_) => warn!("ignoring invalid {RELAY_SAS_VALIDITY_SECS}: {v}"),
            }
        }

        if let Some(v) = ctx.env_var(RELAY_POLL_INTERVAL_MS) {
            match v.parse::<u64>() {
                Ok(ms) => self.poll_interval = Duration::from_millis(ms),
                Err(_) => warn!("ignoring invalid {RELAY_POLL_INTERVAL_MS}: {v}"),
            }
        }

        if let Some(v) = ctx.env_var(RELAY_POLL_MAX_ATTEMPTS) {
            match v.parse::<u32>() {
                Ok(n) => self.poll_max_attempts = n,
                Err(_) => warn!("ignoring invalid {RELAY_POLL_MAX_ATTEMPTS}: {v}"),
            }
        }

        self
    }

    /// The destination endpoint, or a configuration error when unset or
    /// empty.
    pub fn destination_endpoint(&self) -> Result<&str> {
        self.destination_endpoint
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::config(format!(
                    "destination account endpoint is not configured ({RELAY_DESTINATION_ENDPOINT})"
                ))
            })
    }
}
