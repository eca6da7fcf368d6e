//! Session provider trait.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::identity::{AuthSession, Identity, IdentityPatch, SignUp};
use crate::{Credentials, Result};

/// The backend's authentication service.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// The signed-in identity, if any.
    async fn current_identity(&self) -> Result<Option<Identity>>;

    /// Sign in with email and password.
    async fn sign_in(&self, credentials: Credentials) -> Result<AuthSession>;

    /// Create an account and sign in as it.
    async fn sign_up(&self, request: &SignUp) -> Result<AuthSession>;

    /// End the current session. Signing out without a session is not an error.
    async fn sign_out(&self) -> Result<()>;

    /// Update the signed-in identity's metadata.
    async fn update_identity(&self, patch: &IdentityPatch) -> Result<Identity>;

    /// Observe the signed-in identity. `None` means the session was lost.
    fn watch_identity(&self) -> watch::Receiver<Option<Identity>>;
}

#[async_trait]
impl<T: SessionProvider + ?Sized> SessionProvider for std::sync::Arc<T> {
    async fn current_identity(&self) -> Result<Option<Identity>> {
        (**self).current_identity().await
    }

    async fn sign_in(&self, credentials: Credentials) -> Result<AuthSession> {
        (**self).sign_in(credentials).await
    }

    async fn sign_up(&self, request: &SignUp) -> Result<AuthSession> {
        (**self).sign_up(request).await
    }

    async fn sign_out(&self) -> Result<()> {
        (**self).sign_out().await
    }

    async fn update_identity(&self, patch: &IdentityPatch) -> Result<Identity> {
        (**self).update_identity(patch).await
    }

    fn watch_identity(&self) -> watch::Receiver<Option<Identity>> {
        (**self).watch_identity()
    }
}
