//! User identifier values.

use serde::{Serialize, Serializer};

/// A single user identifier such as a Discord ID or wallet address.
///
/// An empty identifier serializes as JSON `null`, which tells the API to
/// remove that identifier from the user. Leave the field as `None` on
/// [`Identifiers`](crate::Identifiers) to not touch it at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Create an identifier with the given value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Create an identifier that removes the value on the server.
    pub fn remove() -> Self {
        Self(String::new())
    }

    /// Whether this identifier clears the value on the server.
    pub fn is_removal(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the raw value. Empty for a removal.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_empty() {
            serializer.serialize_none()
        } else {
            serializer.serialize_str(&self.0)
        }
    }
}
