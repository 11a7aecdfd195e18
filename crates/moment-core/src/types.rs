//! Core types for moment
//!
//! Defines the client-side model shared by the controllers:
//! - Identities and authors
//! - Entity ids in their two namespaces (temporary and canonical)
//! - Local entities with their reconciliation status
//! - Comment payloads and toggle state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Prefix used when rendering temporary ids
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Fallback display name when a profile has neither username nor full name
pub const ANONYMOUS_NAME: &str = "user";

/// Remote user identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Create a user id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signed-in user as known locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// User id
    pub id: UserId,
    /// Profile username, if set
    #[serde(default)]
    pub username: Option<String>,
    /// Profile full name, if set
    #[serde(default)]
    pub full_name: Option<String>,
}

impl Identity {
    /// Create an identity with no profile metadata
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            username: None,
            full_name: None,
        }
    }

    /// With username
    #[inline]
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// With full name
    #[inline]
    #[must_use]
    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    /// Author record built from local profile metadata
    #[must_use]
    pub fn author(&self) -> Author {
        Author {
            username: self.username.clone(),
            full_name: self.full_name.clone(),
        }
    }
}

/// Author fields attached to a comment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Username
    #[serde(default)]
    pub username: Option<String>,
    /// Full name
    #[serde(default)]
    pub full_name: Option<String>,
}

impl Author {
    /// Name to show: username, then full name, then a generic fallback
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.full_name.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(ANONYMOUS_NAME)
    }
}

/// Entity identifier
///
/// Temporary and canonical ids are separate variants, so a pending entity can
/// never compare equal to a row the store has assigned an id to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityId {
    /// Client-generated placeholder
    Temporary(Uuid),
    /// Id assigned by the remote store
    Canonical(String),
}

impl EntityId {
    /// Fresh temporary id
    #[inline]
    #[must_use]
    pub fn temporary() -> Self {
        Self::Temporary(Uuid::new_v4())
    }

    /// Canonical id
    #[inline]
    #[must_use]
    pub fn canonical(id: impl Into<String>) -> Self {
        Self::Canonical(id.into())
    }

    /// Check if this id is a placeholder
    #[inline]
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Parse a rendered id; anything that is not `temp-<uuid>` is canonical
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s
            .strip_prefix(TEMP_ID_PREFIX)
            .and_then(|rest| Uuid::parse_str(rest).ok())
        {
            Some(uuid) => Self::Temporary(uuid),
            None => Self::Canonical(s.to_string()),
        }
    }

    /// Canonical id string, if assigned
    #[inline]
    #[must_use]
    pub fn as_canonical(&self) -> Option<&str> {
        match self {
            Self::Canonical(id) => Some(id),
            Self::Temporary(_) => None,
        }
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Temporary(uuid) => write!(f, "{TEMP_ID_PREFIX}{uuid}"),
            Self::Canonical(id) => f.write_str(id),
        }
    }
}

impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Serialize for EntityId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Reconciliation status of a local entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    /// Shown optimistically, write in flight
    Pending,
    /// Canonical id and payload received
    Confirmed,
    /// Write rejected; the entity has been removed from its list
    Failed,
}

/// Item shown in a client-side list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalEntity<P> {
    /// Temporary or canonical id
    pub id: EntityId,
    /// User content plus whatever enrichment is known
    pub payload: P,
    /// Reconciliation status
    pub status: EntityStatus,
}

impl<P> LocalEntity<P> {
    /// Optimistic entity with a fresh temporary id
    #[inline]
    #[must_use]
    pub fn pending(payload: P) -> Self {
        Self {
            id: EntityId::temporary(),
            payload,
            status: EntityStatus::Pending,
        }
    }

    /// Entity backed by a canonical row
    #[inline]
    #[must_use]
    pub fn confirmed(id: impl Into<String>, payload: P) -> Self {
        Self {
            id: EntityId::canonical(id),
            payload,
            status: EntityStatus::Confirmed,
        }
    }

    /// Check if the write is still in flight
    #[inline]
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == EntityStatus::Pending
    }
}

/// Comment payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Trimmed comment text
    pub body: String,
    /// Creation time (local clock while pending, server clock once confirmed)
    pub created_at: DateTime<Utc>,
    /// Author id
    pub user_id: UserId,
    /// Author display fields
    #[serde(default)]
    pub author: Author,
}

impl Comment {
    /// Best-effort payload built from the local identity
    #[must_use]
    pub fn provisional(identity: &Identity, body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            created_at: Utc::now(),
            user_id: identity.id.clone(),
            author: identity.author(),
        }
    }
}

/// State of a boolean relation (liked, following, joined) and its counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToggleState {
    /// Whether the current user holds the relation
    pub active: bool,
    /// Number of users holding the relation
    pub count: u64,
}

impl ToggleState {
    /// Create toggle state
    #[inline]
    #[must_use]
    pub fn new(active: bool, count: u64) -> Self {
        Self { active, count }
    }

    /// State after flipping `active` and moving the count by one
    ///
    /// The decrement saturates at zero.
    #[must_use]
    pub fn flipped(self) -> Self {
        let count = if self.active {
            self.count.saturating_sub(1)
        } else {
            self.count.saturating_add(1)
        };
        Self {
            active: !self.active,
            count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_and_canonical_ids_never_collide() {
        let temp = EntityId::temporary();
        let rendered = temp.to_string();
        assert!(rendered.starts_with(TEMP_ID_PREFIX));
        assert_ne!(temp, EntityId::canonical(rendered));
    }

    #[test]
    fn entity_id_parse() {
        let temp = EntityId::temporary();
        assert_eq!(temp.to_string().parse::<EntityId>().unwrap(), temp);
        assert_eq!(
            "c-42".parse::<EntityId>().unwrap(),
            EntityId::canonical("c-42")
        );
        // Prefix without a uuid is an ordinary canonical id
        assert_eq!(
            "temp-abc".parse::<EntityId>().unwrap(),
            EntityId::canonical("temp-abc")
        );
    }

    #[test]
    fn entity_id_serializes_as_string() {
        let json = serde_json::to_string(&EntityId::canonical("c-7")).unwrap();
        assert_eq!(json, "\"c-7\"");
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EntityId::canonical("c-7"));
    }

    #[test]
    fn author_display_fallbacks() {
        let full = Author {
            username: Some("ana".into()),
            full_name: Some("Ana Lima".into()),
        };
        assert_eq!(full.display_name(), "ana");

        let name_only = Author {
            username: Some(String::new()),
            full_name: Some("Ana Lima".into()),
        };
        assert_eq!(name_only.display_name(), "Ana Lima");

        assert_eq!(Author::default().display_name(), ANONYMOUS_NAME);
    }

    #[test]
    fn provisional_comment_uses_local_identity() {
        let me = Identity::new("u1").with_username("ana");
        let comment = Comment::provisional(&me, "hello");
        assert_eq!(comment.user_id, UserId::new("u1"));
        assert_eq!(comment.author.username.as_deref(), Some("ana"));
        assert_eq!(comment.author.full_name, None);
    }

    #[test]
    fn toggle_state_flip() {
        assert_eq!(ToggleState::new(false, 3).flipped(), ToggleState::new(true, 4));
        assert_eq!(ToggleState::new(true, 4).flipped(), ToggleState::new(false, 3));
        assert_eq!(ToggleState::new(true, 0).flipped(), ToggleState::new(false, 0));
    }

    #[test]
    fn entity_status_serde() {
        let json = serde_json::to_string(&EntityStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
    }
}
