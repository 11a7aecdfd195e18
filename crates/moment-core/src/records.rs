//! Records exchanged with the remote store
//!
//! Rows are explicit tagged types. Required columns are plain fields and
//! columns the backend may omit are `Option`.

use crate::types::{Author, Comment, LocalEntity, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remote tables touched by the optimistic controllers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Photo comments
    Comments,
    /// Comments on community posts
    CommunityPostComments,
    /// Photo likes
    Likes,
    /// Community post likes
    CommunityPostLikes,
    /// Follower relationships
    Follows,
    /// Community membership
    CommunityMembers,
}

impl Table {
    /// Table name as used by the backend
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comments => "comments",
            Self::CommunityPostComments => "community_post_comments",
            Self::Likes => "likes",
            Self::CommunityPostLikes => "community_post_likes",
            Self::Follows => "follows",
            Self::CommunityMembers => "community_members",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comment thread a new comment is appended to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThreadRef {
    /// Comments under a photo
    Photo {
        /// Photo id
        photo_id: String,
    },
    /// Comments under a community post
    CommunityPost {
        /// Post id
        post_id: String,
    },
}

impl ThreadRef {
    /// Photo thread
    #[inline]
    #[must_use]
    pub fn photo(photo_id: impl Into<String>) -> Self {
        Self::Photo {
            photo_id: photo_id.into(),
        }
    }

    /// Community post thread
    #[inline]
    #[must_use]
    pub fn community_post(post_id: impl Into<String>) -> Self {
        Self::CommunityPost {
            post_id: post_id.into(),
        }
    }

    /// Table holding the thread's comments
    #[must_use]
    pub fn table(&self) -> Table {
        match self {
            Self::Photo { .. } => Table::Comments,
            Self::CommunityPost { .. } => Table::CommunityPostComments,
        }
    }

    /// Column and value linking a comment to its parent
    #[must_use]
    pub fn parent_key(&self) -> (&'static str, &str) {
        match self {
            Self::Photo { photo_id } => ("photo_id", photo_id),
            Self::CommunityPost { post_id } => ("post_id", post_id),
        }
    }
}

impl std::fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (column, value) = self.parent_key();
        write!(f, "{}[{column}={value}]", self.table())
    }
}

/// Boolean relation between the current user and a target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Relation {
    /// Like on a photo
    PhotoLike {
        /// Photo id
        photo_id: String,
    },
    /// Like on a community post
    PostLike {
        /// Post id
        post_id: String,
    },
    /// Following another user
    Follow {
        /// User being followed
        followed_id: String,
    },
    /// Membership of a community
    Membership {
        /// Community id
        community_id: String,
    },
}

impl Relation {
    /// Photo like
    #[inline]
    #[must_use]
    pub fn photo_like(photo_id: impl Into<String>) -> Self {
        Self::PhotoLike {
            photo_id: photo_id.into(),
        }
    }

    /// Community post like
    #[inline]
    #[must_use]
    pub fn post_like(post_id: impl Into<String>) -> Self {
        Self::PostLike {
            post_id: post_id.into(),
        }
    }

    /// Follow
    #[inline]
    #[must_use]
    pub fn follow(followed_id: impl Into<String>) -> Self {
        Self::Follow {
            followed_id: followed_id.into(),
        }
    }

    /// Community membership
    #[inline]
    #[must_use]
    pub fn membership(community_id: impl Into<String>) -> Self {
        Self::Membership {
            community_id: community_id.into(),
        }
    }

    /// Table holding the relation rows
    #[must_use]
    pub fn table(&self) -> Table {
        match self {
            Self::PhotoLike { .. } => Table::Likes,
            Self::PostLike { .. } => Table::CommunityPostLikes,
            Self::Follow { .. } => Table::Follows,
            Self::Membership { .. } => Table::CommunityMembers,
        }
    }

    /// Column and value identifying the relation's target, independent of user
    #[must_use]
    pub fn target_key(&self) -> (&'static str, &str) {
        match self {
            Self::PhotoLike { photo_id } => ("photo_id", photo_id),
            Self::PostLike { post_id } => ("post_id", post_id),
            Self::Follow { followed_id } => ("followed_id", followed_id),
            Self::Membership { community_id } => ("community_id", community_id),
        }
    }

    /// Keys identifying the row held by `user`
    #[must_use]
    pub fn match_keys(&self, user: &UserId) -> MatchKeys {
        match self {
            Self::PhotoLike { photo_id } => MatchKeys::new()
                .with("user_id", user.as_str())
                .with("photo_id", photo_id),
            Self::PostLike { post_id } => MatchKeys::new()
                .with("post_id", post_id)
                .with("user_id", user.as_str()),
            Self::Follow { followed_id } => MatchKeys::new()
                .with("follower_id", user.as_str())
                .with("followed_id", followed_id),
            Self::Membership { community_id } => MatchKeys::new()
                .with("community_id", community_id)
                .with("user_id", user.as_str()),
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PhotoLike { photo_id } => write!(f, "like:photo/{photo_id}"),
            Self::PostLike { post_id } => write!(f, "like:post/{post_id}"),
            Self::Follow { followed_id } => write!(f, "follow:{followed_id}"),
            Self::Membership { community_id } => write!(f, "member:{community_id}"),
        }
    }
}

/// Equality filters identifying rows to delete
///
/// Columns keep insertion order; two key sets are equal only if they list the
/// same columns in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchKeys(Vec<(String, String)>);

impl MatchKeys {
    /// Empty filter set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality filter
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((column.into(), value.into()));
        self
    }

    /// Value filtered for `column`
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate `(column, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(c, v)| (c.as_str(), v.as_str()))
    }

    /// Check if no filters are set
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Comment to be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    /// Parent thread
    pub thread: ThreadRef,
    /// Author
    pub user_id: UserId,
    /// Trimmed body
    pub body: String,
}

/// Relation row to be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRecord {
    /// Relation being activated
    pub relation: Relation,
    /// User activating it
    pub user_id: UserId,
}

impl RelationRecord {
    /// Keys of the row this record creates
    #[inline]
    #[must_use]
    pub fn keys(&self) -> MatchKeys {
        self.relation.match_keys(&self.user_id)
    }
}

/// Record passed to [`RemoteMutationService::insert`](crate::remote::RemoteMutationService::insert)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NewRecord {
    /// New comment
    Comment(NewComment),
    /// New relation row
    Relation(RelationRecord),
}

impl NewRecord {
    /// Table the record belongs in
    #[must_use]
    pub fn table(&self) -> Table {
        match self {
            Self::Comment(comment) => comment.thread.table(),
            Self::Relation(record) => record.relation.table(),
        }
    }
}

/// Comment row as returned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRow {
    /// Canonical id
    pub id: String,
    /// Stored body
    pub body: String,
    /// Server timestamp
    pub created_at: DateTime<Utc>,
    /// Author id
    pub user_id: UserId,
    /// Joined author profile; absent when the select does not embed it
    #[serde(default)]
    pub author: Option<Author>,
}

impl CommentRow {
    /// Confirmed local entity carrying this row
    #[must_use]
    pub fn into_entity(self) -> LocalEntity<Comment> {
        LocalEntity::confirmed(
            self.id,
            Comment {
                body: self.body,
                created_at: self.created_at,
                user_id: self.user_id,
                author: self.author.unwrap_or_default(),
            },
        )
    }
}

/// Relation row as returned by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRow {
    /// Table the row lives in
    pub table: Table,
    /// Key columns of the row
    pub keys: MatchKeys,
}

/// Row returned by a successful insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanonicalRecord {
    /// Stored comment
    Comment(CommentRow),
    /// Stored relation
    Relation(RelationRow),
}
