//! Error types for the RedMetrics client.
//!
//! Uses `thiserror` for typed errors. [`ClientError`] is `Clone` because a
//! single flush outcome is handed to every caller waiting on that cycle, so
//! transport failures are carried as text rather than as their source type.

/// Errors surfaced by connection, flush, and query operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Configuration is invalid or a required field is missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The operation is not valid in the current connection or cursor state.
    #[error("invalid state: {0}")]
    ConnectionState(String),

    /// The status probe failed.
    #[error("cannot reach RedMetrics service at {base_url}: {reason}")]
    ServiceUnreachable {
        /// Base URL that was probed.
        base_url: String,
        /// Underlying failure.
        reason: String,
    },

    /// The configured game version does not exist on the service.
    #[error("invalid game version {game_version_id}: {reason}")]
    InvalidGameVersion {
        /// The configured game-version identifier.
        game_version_id: String,
        /// Underlying failure.
        reason: String,
    },

    /// The player could not be registered.
    #[error("cannot create player: {0}")]
    PlayerRegistrationFailed(String),

    /// The player record could not be updated.
    #[error("cannot update player: {0}")]
    PlayerUpdateFailed(String),

    /// A flush cycle failed. One of the two batches may still have been sent.
    #[error("error posting data: {0}")]
    FlushFailed(String),

    /// A read query failed or returned an unusable response.
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Failures reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent or no response was received.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body could not be decoded as JSON.
    #[error("response decode failed: {0}")]
    Decode(String),
}
