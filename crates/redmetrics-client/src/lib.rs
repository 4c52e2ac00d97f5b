//! Client for the RedMetrics telemetry service.
//!
//! Gameplay events and player-state snapshots are buffered in memory by a
//! [`WriteConnection`] and sent in batches on a fixed interval once the
//! connection has registered a player. Stored data is read back one page at
//! a time through [`execute_query`] and [`PageCursor`].
//!
//! # Modules
//!
//! - [`config`] -- Connection options and service endpoint, from code,
//!   serde, or `REDMETRICS_*` environment variables.
//! - [`connection`] -- [`WriteConnection`] lifecycle and periodic flushing.
//! - [`flush`] -- Flush outcomes and the [`FlushTicket`] returned on post.
//! - [`query`] -- Paginated read queries and [`PageCursor`].
//! - [`transport`] -- [`Transport`] trait and the `reqwest` implementation.
//! - [`error`] -- [`ClientError`] and [`TransportError`].
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ConnectionConfig::new("my-game-version");
//! let conn = WriteConnection::new(config, HttpTransport::new())?;
//! conn.connect().await?;
//! let ticket = conn.post_event(Record::new().with_type("start"));
//! ticket.await?;
//! conn.disconnect().await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod flush;
pub mod query;
pub mod transport;

pub use config::{ConnectionConfig, ServiceEndpoint};
pub use connection::{ConnectionState, WriteConnection};
pub use error::{ClientError, TransportError};
pub use flush::{FlushOutcome, FlushTicket};
pub use query::{PageCursor, QueryClient, execute_query};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, Transport};

pub use redmetrics_types as types;
