//! Endpoint paths and request/response types for the hosted backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Endpoint Paths
// ============================================================================

/// Token endpoint, used with `grant_type=password` and `grant_type=refresh_token`.
pub const TOKEN: &str = "token";

/// Account creation.
pub const SIGNUP: &str = "signup";

/// Session revocation.
pub const LOGOUT: &str = "logout";

/// The signed-in user (GET to read, PUT to update).
pub const USER: &str = "user";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for the password grant.
#[derive(Debug, Serialize)]
pub struct PasswordGrant<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Request body for the refresh grant.
#[derive(Debug, Serialize)]
pub struct RefreshGrant<'a> {
    pub refresh_token: &'a str,
}

/// User metadata carried by sign-up and user updates.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Request body for sign-up.
#[derive(Debug, Serialize)]
pub struct SignUpRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub data: UserMetadata,
}

/// Request body for a user update.
#[derive(Debug, Serialize)]
pub struct UpdateUserRequest {
    pub data: UserMetadata,
}

/// A user as returned by the auth service.
#[derive(Debug, Deserialize)]
pub struct UserResponse {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Response from the token endpoint, and from sign-up when the account is
/// signed in immediately.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: UserResponse,
}

/// Sign-up answers with a session, or with just the user when the address
/// must be confirmed first.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(TokenResponse),
    Pending(UserResponse),
}

/// Error body. The auth service and the REST service use different field
/// names, so every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    /// Auth: short error name (`invalid_grant`).
    #[serde(default)]
    pub error: Option<String>,
    /// Auth: machine-readable code (`weak_password`, `user_already_exists`).
    #[serde(default)]
    pub error_code: Option<String>,
    /// Auth: human-readable message.
    #[serde(default)]
    pub error_description: Option<String>,
    /// Auth: human-readable message (newer services).
    #[serde(default)]
    pub msg: Option<String>,
    /// REST: code such as `PGRST301` or a Postgres SQLSTATE.
    #[serde(default)]
    pub code: Option<Value>,
    /// REST: human-readable message.
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// The most specific code in the body.
    pub fn code(&self) -> Option<String> {
        self.error_code
            .clone()
            .or_else(|| match &self.code {
                Some(Value::String(s)) => Some(s.clone()),
                _ => None,
            })
            .or_else(|| self.error.clone())
    }

    /// The most descriptive message in the body.
    pub fn message(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.error_description.clone())
    }
}
