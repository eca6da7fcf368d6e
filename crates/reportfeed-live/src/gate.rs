//! Session-gated access.
//!
//! Every mutating operation and every activation resolves the session here
//! first. Redirecting to sign-in is the caller's job.

use reportfeed_core::error::AuthError;
use reportfeed_core::{Identity, Result, SessionProvider};

/// The signed-in identity, or [`AuthError::NotAuthenticated`].
pub async fn require_identity<P>(provider: &P) -> Result<Identity>
where
    P: SessionProvider + ?Sized,
{
    provider
        .current_identity()
        .await?
        .ok_or_else(|| AuthError::NotAuthenticated.into())
}
