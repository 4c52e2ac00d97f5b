//! Configuration types for connections and queries.
//!
//! A [`ConnectionConfig`] can be built in code, deserialized from any serde
//! format (keys are camelCase to match the service's own option names), or
//! loaded from `REDMETRICS_*` environment variables. The service location is
//! described by a [`ServiceEndpoint`], which the query client uses on its
//! own.

use std::time::Duration;

use redmetrics_types::PlayerInfo;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Default URL scheme.
pub const DEFAULT_PROTOCOL: &str = "https";
/// Default service hostname.
pub const DEFAULT_HOST: &str = "api.redmetrics.io";
/// Default service port.
pub const DEFAULT_PORT: u16 = 443;
/// Default interval between flush cycles, in milliseconds.
pub const DEFAULT_BUFFERING_DELAY_MS: u64 = 5000;

/// Where the service lives.
///
/// An explicit `base_url` wins over `protocol`/`host`/`port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    /// URL scheme, `https` unless overridden.
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Service hostname.
    #[serde(default = "default_host")]
    pub host: String,
    /// Service port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Full base URL (e.g. `http://localhost:5050`), overriding the above.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ServiceEndpoint {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            host: default_host(),
            port: DEFAULT_PORT,
            base_url: None,
        }
    }
}

impl ServiceEndpoint {
    /// An endpoint addressed by a full base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    /// Resolve the base URL requests are built from, without a trailing `/`.
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_owned(),
            None => format!("{}://{}:{}", self.protocol, self.host, self.port),
        }
    }
}

/// Options for a [`WriteConnection`](crate::connection::WriteConnection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Where the service lives.
    #[serde(flatten)]
    pub endpoint: ServiceEndpoint,
    /// Game version every record is attributed to. Required.
    #[serde(default)]
    pub game_version_id: Option<String>,
    /// Milliseconds between flush cycles.
    #[serde(default = "default_buffering_delay_ms", rename = "bufferingDelay")]
    pub buffering_delay_ms: u64,
    /// Player description sent on registration.
    #[serde(default)]
    pub player: PlayerInfo,
}

impl ConnectionConfig {
    /// Defaults for everything except the game version.
    pub fn new(game_version_id: impl Into<String>) -> Self {
        Self {
            endpoint: ServiceEndpoint::default(),
            game_version_id: Some(game_version_id.into()),
            buffering_delay_ms: DEFAULT_BUFFERING_DELAY_MS,
            player: PlayerInfo::new(),
        }
    }

    /// Point the connection at a full base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint.base_url = Some(base_url.into());
        self
    }

    /// Set the interval between flush cycles.
    #[must_use]
    pub fn with_buffering_delay(mut self, delay: Duration) -> Self {
        self.buffering_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the initial player description.
    #[must_use]
    pub fn with_player(mut self, player: PlayerInfo) -> Self {
        self.player = player;
        self
    }

    /// Interval between flush cycles.
    pub const fn buffering_delay(&self) -> Duration {
        Duration::from_millis(self.buffering_delay_ms)
    }

    /// Check the options a connection cannot work without.
    ///
    /// Returns the game-version identifier on success.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if `game_version_id` is
    /// missing or empty, or if the buffering delay is zero.
    pub fn validate(&self) -> Result<&str, ClientError> {
        let game_version_id = self
            .game_version_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::Configuration("missing gameVersionId".to_owned()))?;
        if self.buffering_delay_ms == 0 {
            return Err(ClientError::Configuration(
                "bufferingDelay must be at least 1ms".to_owned(),
            ));
        }
        Ok(game_version_id)
    }

    /// Load configuration from environment variables.
    ///
    /// Required variables:
    /// - `REDMETRICS_GAME_VERSION_ID` -- game version to attribute data to
    ///
    /// Optional variables:
    /// - `REDMETRICS_BASE_URL` -- full base URL (overrides the next three)
    /// - `REDMETRICS_PROTOCOL` -- URL scheme (default `https`)
    /// - `REDMETRICS_HOST` -- hostname (default `api.redmetrics.io`)
    /// - `REDMETRICS_PORT` -- port (default 443)
    /// - `REDMETRICS_BUFFERING_DELAY_MS` -- flush interval (default 5000)
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Same variables as [`ConnectionConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let game_version_id = lookup("REDMETRICS_GAME_VERSION_ID").ok_or_else(|| {
            ClientError::Configuration(
                "missing required env var REDMETRICS_GAME_VERSION_ID".to_owned(),
            )
        })?;

        let port: u16 = lookup("REDMETRICS_PORT")
            .map_or(Ok(DEFAULT_PORT), |raw| raw.parse())
            .map_err(|e| ClientError::Configuration(format!("invalid REDMETRICS_PORT: {e}")))?;

        let buffering_delay_ms: u64 = lookup("REDMETRICS_BUFFERING_DELAY_MS")
            .map_or(Ok(DEFAULT_BUFFERING_DELAY_MS), |raw| raw.parse())
            .map_err(|e| {
                ClientError::Configuration(format!("invalid REDMETRICS_BUFFERING_DELAY_MS: {e}"))
            })?;

        let endpoint = ServiceEndpoint {
            protocol: lookup("REDMETRICS_PROTOCOL").unwrap_or_else(default_protocol),
            host: lookup("REDMETRICS_HOST").unwrap_or_else(default_host),
            port,
            base_url: lookup("REDMETRICS_BASE_URL"),
        };

        Ok(Self {
            endpoint,
            game_version_id: Some(game_version_id),
            buffering_delay_ms,
            player: PlayerInfo::new(),
        })
    }
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_owned()
}

fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_buffering_delay_ms() -> u64 {
    DEFAULT_BUFFERING_DELAY_MS
}
