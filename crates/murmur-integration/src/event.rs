//! Domain events consumed by outbound hooks.

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;
use uuid::Uuid;

/// The member or end user that caused an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    /// Principal identifier.
    pub principal_id: Uuid,
    /// Display name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Email address, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Actor {
    /// Returns the best available label for messages.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("Someone")
    }
}

/// Snapshot of a feedback post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRef {
    /// Post identifier.
    pub id: Uuid,
    /// Post title.
    pub title: String,
    /// Post body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Board the post belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_name: Option<String>,
    /// Current status label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Public link to the post.
    pub url: String,
}

/// Snapshot of a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRef {
    /// Comment identifier.
    pub id: Uuid,
    /// Comment body.
    pub content: String,
}

/// Event raised by the domain layer and fanned out to every hook.
///
/// Serialized as `{"type": "post.created", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum DomainEvent {
    /// A post was submitted.
    #[serde(rename = "post.created")]
    #[strum(serialize = "post.created")]
    PostCreated { actor: Actor, post: PostRef },
    /// A post's title or body was edited.
    #[serde(rename = "post.updated")]
    #[strum(serialize = "post.updated")]
    PostUpdated { actor: Actor, post: PostRef },
    /// A post moved to a new status.
    #[serde(rename = "post.status_changed")]
    #[strum(serialize = "post.status_changed")]
    PostStatusChanged {
        actor: Actor,
        post: PostRef,
        previous_status: String,
        new_status: String,
    },
    /// A post was removed.
    #[serde(rename = "post.deleted")]
    #[strum(serialize = "post.deleted")]
    PostDeleted { actor: Actor, post_id: Uuid },
    /// A comment was added to a post.
    #[serde(rename = "comment.created")]
    #[strum(serialize = "comment.created")]
    CommentCreated {
        actor: Actor,
        post: PostRef,
        comment: CommentRef,
    },
    /// A comment was removed.
    #[serde(rename = "comment.deleted")]
    #[strum(serialize = "comment.deleted")]
    CommentDeleted {
        actor: Actor,
        post_id: Uuid,
        comment_id: Uuid,
    },
}

impl DomainEvent {
    /// Returns the wire name of the event, e.g. `post.created`.
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Returns who caused the event.
    pub fn actor(&self) -> &Actor {
        match self {
            Self::PostCreated { actor, .. }
            | Self::PostUpdated { actor, .. }
            | Self::PostStatusChanged { actor, .. }
            | Self::PostDeleted { actor, .. }
            | Self::CommentCreated { actor, .. }
            | Self::CommentDeleted { actor, .. } => actor,
        }
    }

    /// Returns the post snapshot, when the event carries one.
    pub fn post(&self) -> Option<&PostRef> {
        match self {
            Self::PostCreated { post, .. }
            | Self::PostUpdated { post, .. }
            | Self::PostStatusChanged { post, .. }
            | Self::CommentCreated { post, .. } => Some(post),
            Self::PostDeleted { .. } | Self::CommentDeleted { .. } => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn actor() -> Actor {
        Actor {
            principal_id: Uuid::nil(),
            display_name: Some("Ada".into()),
            email: Some("ada@example.com".into()),
        }
    }

    pub fn post() -> PostRef {
        PostRef {
            id: Uuid::nil(),
            title: "Dark mode".into(),
            content: Some("Please add dark mode".into()),
            board_name: Some("Features".into()),
            status: Some("Open".into()),
            url: "https://feedback.example.com/p/dark-mode".into(),
        }
    }

    pub fn post_created() -> DomainEvent {
        DomainEvent::PostCreated {
            actor: actor(),
            post: post(),
        }
    }
}
