//! Authenticated identity and session types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tokens::{AccessToken, RefreshToken};
use crate::types::UserId;

/// The currently authenticated user, as reported by the session provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id; rows owned by this user carry it in `user_id`.
    pub id: UserId,
    /// Sign-in email.
    pub email: Option<String>,
    /// Display name from the user's metadata.
    pub display_name: Option<String>,
}

impl Identity {
    /// An identity with only an id.
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            email: None,
            display_name: None,
        }
    }
}

/// A signed-in session: identity plus the tokens that prove it.
#[derive(Clone)]
pub struct AuthSession {
    /// Who is signed in.
    pub identity: Identity,
    /// Token attached to store requests.
    pub access_token: AccessToken,
    /// Token used to obtain a fresh access token, if the backend issues one.
    pub refresh_token: Option<RefreshToken>,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("identity", &self.identity)
            .field("tokens", &"[REDACTED]")
            .finish()
    }
}

/// Changes to apply to the signed-in identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPatch {
    /// New display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Account creation request.
#[derive(Clone)]
pub struct SignUp {
    /// Sign-in email.
    pub email: String,
    /// Initial password.
    pub password: String,
    /// Display name stored in the user's metadata.
    pub display_name: String,
}

impl fmt::Debug for SignUp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignUp")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("display_name", &self.display_name)
            .finish()
    }
}
