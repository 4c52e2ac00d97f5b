//! Records sent to the service and entities read back from it.
//!
//! Events and snapshots are free-form JSON objects: the service only cares
//! about a handful of well-known keys (`type`, `section`, `customData`,
//! `userTime`, ...) and stores the rest verbatim. [`Record`] wraps such an
//! object for the write path, [`PlayerInfo`] carries the player description
//! sent on registration and update, and [`Entity`] is the read-path view
//! with its timestamps already decoded.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{TypesError, json_kind};
use crate::ids::PlayerId;
use crate::time;

/// Key of the dotted section path on events and snapshots.
pub const SECTION: &str = "section";
/// Key of the client-side capture time.
pub const USER_TIME: &str = "userTime";
/// Key of the server-side storage time.
pub const SERVER_TIME: &str = "serverTime";
/// Key of the game-version stamp added at flush time.
pub const GAME_VERSION: &str = "gameVersion";
/// Key of the player stamp added at flush time.
pub const PLAYER: &str = "player";
/// Key of the free-form payload the service requires as a string on players.
pub const CUSTOM_DATA: &str = "customData";

/// An event or snapshot destined for the service.
///
/// Built by the caller and moved into a connection's pending queue, which
/// owns it from then on. The queue is the only place the record is ever
/// modified (normalization at enqueue, stamping at flush).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Set a field, replacing any previous value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Set the event `type` field.
    #[must_use]
    pub fn with_type(self, kind: impl Into<String>) -> Self {
        self.with("type", kind.into())
    }

    /// Set the section as an ordered path; it is joined with `.` on enqueue.
    #[must_use]
    pub fn with_section<I, S>(self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: Vec<Value> = parts.into_iter().map(|p| Value::String(p.into())).collect();
        self.with(SECTION, Value::Array(parts))
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Borrow all fields.
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the record and return its fields.
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Normalize a record for enqueueing.
    ///
    /// A `section` given as a list is joined into one dotted string, and
    /// `user_time` (wire format) overwrites any `userTime` already present.
    #[must_use]
    pub fn prepared(mut self, user_time: String) -> Self {
        if let Some(Value::Array(parts)) = self.0.get(SECTION) {
            let joined = join_section(parts);
            self.0.insert(SECTION.to_owned(), Value::String(joined));
        }
        self.0.insert(USER_TIME.to_owned(), Value::String(user_time));
        self
    }

    /// Stamp the connection-derived fields added at flush time.
    ///
    /// A missing player is sent as `null`.
    pub fn stamp(&mut self, game_version: &str, player: Option<&PlayerId>) {
        self.0
            .insert(GAME_VERSION.to_owned(), Value::String(game_version.to_owned()));
        let player = player.map_or(Value::Null, |id| Value::String(id.as_str().to_owned()));
        self.0.insert(PLAYER.to_owned(), player);
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for Record {
    type Error = TypesError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(TypesError::NotAnObject {
                found: json_kind(&other),
            }),
        }
    }
}

/// Join section path parts with `.`.
///
/// Strings are used as-is, `null` becomes an empty segment, and any other
/// value contributes its JSON text.
fn join_section(parts: &[Value]) -> String {
    parts
        .iter()
        .map(|part| match part {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Free-form description of the player, sent on registration and update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerInfo(Map<String, Value>);

impl PlayerInfo {
    /// Create an empty player description.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Set a field, replacing any previous value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow all fields.
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Copy every field of `other` over this one, overwriting on conflict.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Build the request body for this player.
    ///
    /// The service requires `customData` to be a string, so a present value
    /// is replaced by its JSON text. Works on a copy; `self` is untouched.
    pub fn to_wire(&self) -> Value {
        let mut fields = self.0.clone();
        if let Some(custom) = fields.get_mut(CUSTOM_DATA) {
            *custom = Value::String(custom.to_string());
        }
        Value::Object(fields)
    }
}

impl From<Map<String, Value>> for PlayerInfo {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl TryFrom<Value> for PlayerInfo {
    type Error = TypesError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(TypesError::NotAnObject {
                found: json_kind(&other),
            }),
        }
    }
}

/// A stored event or snapshot as returned by the read API.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// When the service stored the entity, as local wall-clock fields.
    pub server_time: Option<NaiveDateTime>,
    /// When the client captured the entity, if it said so.
    pub user_time: Option<NaiveDateTime>,
    fields: Map<String, Value>,
}

impl Entity {
    /// Decode an entity from the service's JSON.
    ///
    /// `serverTime` and `userTime` are lifted out of the field map and
    /// decoded with [`time::decode`]; everything else is kept verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::NotAnObject`] if `value` is not an object, or
    /// [`TypesError::InvalidDate`] if a timestamp is not a wire date.
    pub fn from_wire(value: Value) -> Result<Self, TypesError> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(TypesError::NotAnObject {
                    found: json_kind(&other),
                });
            }
        };
        let server_time = take_date(&mut fields, SERVER_TIME)?;
        let user_time = take_date(&mut fields, USER_TIME)?;
        Ok(Self {
            server_time,
            user_time,
            fields,
        })
    }

    /// Look up a field other than the decoded timestamps.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Borrow the fields other than the decoded timestamps.
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Remove a date field from `fields` and decode it; absent or `null` is `None`.
fn take_date(
    fields: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<NaiveDateTime>, TypesError> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => time::decode(&s).map(Some),
        Some(other) => Err(TypesError::InvalidDate {
            value: other.to_string(),
            reason: format!("{key} must be a string"),
        }),
    }
}
