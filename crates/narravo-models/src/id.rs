//! Opaque entity identifiers.
//!
//! Every persisted entity carries a 128-bit id rendered as a UUID string.
//! Ownership between entities is expressed as a plain id field without a
//! referential constraint; lookups go through indexed fields in the catalog.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

entity_id!(
    /// Identifier of a user. Issued by the auth collaborator; the backend
    /// only threads it through ownership fields and object-store prefixes.
    UserId
);
entity_id!(
    /// Identifier of an uploaded document project.
    ProjectId
);
entity_id!(
    /// Identifier of a chapter within a project.
    ChapterId
);
entity_id!(
    /// Identifier of a paragraph within a chapter.
    ParagraphId
);
entity_id!(
    /// Identifier of a sentence within a paragraph.
    SentenceId
);
entity_id!(
    /// Identifier of a stored API key.
    ApiKeyId
);
entity_id!(
    /// Identifier of a chapter video-generation task.
    VideoTaskId
);
entity_id!(
    /// Identifier of a scheduler task.
    TaskId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_uuids() {
        let a = SentenceId::new();
        let b = SentenceId::new();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn id_serde_is_transparent() {
        let id = ChapterId::from_string("abc-123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc-123\"");
        let back: ChapterId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
