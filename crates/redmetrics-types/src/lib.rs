//! Shared wire-level types for the RedMetrics telemetry client.
//!
//! Everything that crosses the HTTP boundary in either direction is defined
//! here so the client crate can stay focused on connection lifecycle and
//! transport concerns.
//!
//! # Modules
//!
//! - [`ids`] -- Server-assigned identifiers and the entity kind discriminator
//! - [`record`] -- Outgoing event/snapshot records, player info, and
//!   entities read back from the service
//! - [`filter`] -- Search filter for the paginated read API
//! - [`time`] -- Wire date codec (local wall-clock fields as UTC)
//! - [`error`] -- Errors raised while building or decoding these types

pub mod error;
pub mod filter;
pub mod ids;
pub mod record;
pub mod time;

// Re-export all public types at crate root for convenience.
pub use error::TypesError;
pub use filter::SearchFilter;
pub use ids::{EntityType, PlayerId};
pub use record::{Entity, PlayerInfo, Record};
