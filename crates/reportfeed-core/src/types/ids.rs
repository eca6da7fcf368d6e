//! Record and user identifiers.
//!
//! Both are opaque strings assigned by the backend (usually UUIDs). They are
//! validated only enough to be safe as path segments and query values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, InvalidInputError};

const MAX_LEN: usize = 128;

fn check(s: &str) -> Option<&'static str> {
    if s.is_empty() {
        Some("must be non-empty")
    } else if s.len() > MAX_LEN {
        Some("must be at most 128 characters")
    } else if s == "." || s == ".." {
        Some("must not be '.' or '..'")
    } else if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        Some("may only contain letters, digits, '-', '_' and '.'")
    } else {
        None
    }
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $variant:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier, validating the format.
            pub fn new(s: impl Into<String>) -> Result<Self, Error> {
                let s = s.into();
                if let Some(reason) = check(&s) {
                    return Err(InvalidInputError::$variant {
                        value: s,
                        reason: reason.to_string(),
                    }
                    .into());
                }
                Ok(Self(s))
            }

            /// Returns the identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(
    /// The stable key of a record, assigned by the store at creation.
    RecordId,
    RecordId
);

opaque_id!(
    /// The identifier of an authenticated user.
    UserId,
    UserId
);
