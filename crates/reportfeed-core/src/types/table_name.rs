//! Table name type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, InvalidInputError};

/// Postgres truncates identifiers longer than this.
const MAX_LEN: usize = 63;

/// A validated table name.
///
/// Table names start with an ASCII letter and contain only ASCII letters,
/// digits and underscores. Case is preserved (`Reports` and `reports` are
/// different tables).
///
/// # Example
///
/// ```
/// use reportfeed_core::TableName;
///
/// let table = TableName::new("trend_analyses").unwrap();
/// assert_eq!(table.as_str(), "trend_analyses");
/// assert!(TableName::new("1st").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    /// Create a new table name, validating the format.
    pub fn new(s: impl Into<String>) -> Result<Self, Error> {
        let s = s.into();
        Self::validate(&s)?;
        Ok(Self(s))
    }

    /// Returns the table name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), Error> {
        let reason = if s.is_empty() {
            Some("must be non-empty")
        } else if s.len() > MAX_LEN {
            Some("must be at most 63 characters")
        } else if !s.starts_with(|c: char| c.is_ascii_alphabetic()) {
            Some("must start with a letter")
        } else if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            Some("may only contain letters, digits and underscores")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(InvalidInputError::TableName {
                value: s.to_string(),
                reason: reason.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TableName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TableName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TableName> for String {
    fn from(table: TableName) -> Self {
        table.0
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_mixed_case_and_underscores() {
        assert!(TableName::new("Reports").is_ok());
        assert!(TableName::new("user_profiles").is_ok());
    }

    #[test]
    fn rejects_path_like_names() {
        assert!(TableName::new("../etc").is_err());
        assert!(TableName::new("a/b").is_err());
        assert!(TableName::new("").is_err());
        assert!(TableName::new("_hidden").is_err());
    }

    #[test]
    fn rejects_overlong_names() {
        assert!(TableName::new("t".repeat(64)).is_err());
        assert!(TableName::new("t".repeat(63)).is_ok());
    }
}
