//! Branded ID newtypes for type safety.
//!
//! Every entity has a distinct ID type implemented as a newtype wrapper
//! around `String`, so a conversation ID cannot be passed where a user ID
//! is expected. Server-generated IDs are UUID v7 (time-ordered) with an
//! entity prefix; user IDs are assigned by the external account subsystem
//! and carried verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Whether the ID is the empty string.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Stable identifier of a user, owned by the external account subsystem.
    UserId
}

branded_id! {
    /// Unique identifier for a conversation (`conv_` + UUID v7).
    ConversationId
}

branded_id! {
    /// Unique identifier for a persisted message (`msg_` + UUID v7).
    MessageId
}

branded_id! {
    /// Identifier of one live client connection (`conn_` + UUID v7).
    ConnectionId
}

impl ConversationId {
    /// Generate a new time-ordered conversation ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("conv_{}", Uuid::now_v7()))
    }
}

impl MessageId {
    /// Generate a new time-ordered message ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("msg_{}", Uuid::now_v7()))
    }
}

impl ConnectionId {
    /// Generate a new time-ordered connection ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
