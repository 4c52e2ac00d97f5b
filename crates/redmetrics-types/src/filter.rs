//! Search filter for the paginated read API.
//!
//! Every field is optional except `entity_type`, which selects the resource
//! path (`/v1/event` or `/v1/snapshot`); its absence is reported by the
//! query client before any request is made. Date bounds are kept as local
//! wall-clock values and only encoded to the wire format when the query
//! parameters are built.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::ids::{EntityType, PlayerId};
use crate::time;

/// Filter applied to a read query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    /// Restrict to one game.
    pub game: Option<String>,
    /// Restrict to one game version.
    pub game_version: Option<String>,
    /// Restrict to one player.
    pub player_id: Option<PlayerId>,
    /// Which kind of entity to read. Required.
    pub entity_type: Option<EntityType>,
    /// Restrict to one event type.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Restrict to one dotted section path.
    pub section: Option<String>,
    /// Only entities stored strictly before this time.
    pub before: Option<NaiveDateTime>,
    /// Only entities stored strictly after this time.
    pub after: Option<NaiveDateTime>,
    /// Only entities captured before this client time.
    pub before_user_time: Option<NaiveDateTime>,
    /// Only entities captured after this client time.
    pub after_user_time: Option<NaiveDateTime>,
    /// 1-based page to fetch.
    pub page: Option<u32>,
    /// Page size requested from the service.
    pub per_page: Option<u32>,
}

impl SearchFilter {
    /// Create a filter for the given entity kind.
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type: Some(entity_type),
            ..Self::default()
        }
    }

    /// Restrict to one game.
    #[must_use]
    pub fn game(mut self, game: impl Into<String>) -> Self {
        self.game = Some(game.into());
        self
    }

    /// Restrict to one game version.
    #[must_use]
    pub fn game_version(mut self, game_version: impl Into<String>) -> Self {
        self.game_version = Some(game_version.into());
        self
    }

    /// Restrict to one player.
    #[must_use]
    pub fn player_id(mut self, player_id: PlayerId) -> Self {
        self.player_id = Some(player_id);
        self
    }

    /// Restrict to one event type.
    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Restrict to a section given as an ordered path.
    #[must_use]
    pub fn section<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined: Vec<String> = parts.into_iter().map(|p| p.as_ref().to_owned()).collect();
        self.section = Some(joined.join("."));
        self
    }

    /// Only entities stored before `before` and after `after`.
    #[must_use]
    pub fn between(mut self, after: NaiveDateTime, before: NaiveDateTime) -> Self {
        self.after = Some(after);
        self.before = Some(before);
        self
    }

    /// Only entities captured before `before` and after `after`.
    #[must_use]
    pub fn between_user_time(mut self, after: NaiveDateTime, before: NaiveDateTime) -> Self {
        self.after_user_time = Some(after);
        self.before_user_time = Some(before);
        self
    }

    /// Request a specific 1-based page.
    #[must_use]
    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Request a page size.
    #[must_use]
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    /// Build the query parameters sent to the service.
    ///
    /// Unset fields are omitted. Date bounds are encoded with
    /// [`time::encode`]; all other fields pass through as text.
    pub fn to_query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        let mut push = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                params.push((name.to_owned(), value));
            }
        };

        push("game", self.game.clone());
        push("gameVersion", self.game_version.clone());
        push("playerId", self.player_id.as_ref().map(ToString::to_string));
        push("entityType", self.entity_type.map(|t| t.as_str().to_owned()));
        push("type", self.kind.clone());
        push("section", self.section.clone());
        push("before", self.before.map(time::encode));
        push("after", self.after.map(time::encode));
        push("beforeUserTime", self.before_user_time.map(time::encode));
        push("afterUserTime", self.after_user_time.map(time::encode));
        push("page", self.page.map(|p| p.to_string()));
        push("perPage", self.per_page.map(|p| p.to_string()));

        params
    }
}
