//! Error types for building and decoding wire values.

/// Errors that can occur while converting to or from wire values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    /// A JSON value that must be an object was something else.
    #[error("expected a JSON object, found {found}")]
    NotAnObject {
        /// The JSON kind that was found instead.
        found: &'static str,
    },

    /// A date string could not be read in the wire date format.
    #[error("invalid wire date {value:?}: {reason}")]
    InvalidDate {
        /// The offending value as received.
        value: String,
        /// Why parsing failed.
        reason: String,
    },
}

/// Name the kind of a JSON value for error messages.
pub(crate) const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
