//! Sign-in credentials type.

use std::fmt;

/// Email and password used to sign in.
///
/// # Security
///
/// The password is never exposed in Debug output to prevent accidental logging.
///
/// # Example
///
/// ```
/// use reportfeed_core::Credentials;
///
/// let creds = Credentials::new("ayse@example.com", "hunter22");
/// assert_eq!(creds.email(), "ayse@example.com");
/// ```
#[derive(Clone)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    /// Create new credentials.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Returns the email address.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the password.
    ///
    /// # Security
    ///
    /// Use this only when constructing authentication requests or writing the
    /// remembered-credentials entry. Never log or display this value.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Returns true if either field is empty after trimming whitespace.
    pub fn is_incomplete(&self) -> bool {
        self.email.trim().is_empty() || self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_hides_password_in_debug() {
        let creds = Credentials::new("ayse@example.com", "secret123");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("ayse@example.com"));
        assert!(!debug.contains("secret123"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn incomplete_when_a_field_is_blank() {
        assert!(Credentials::new("  ", "pw").is_incomplete());
        assert!(Credentials::new("a@b.c", "").is_incomplete());
        assert!(!Credentials::new("a@b.c", "pw").is_incomplete());
    }
}
