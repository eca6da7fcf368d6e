//! Sign-in with optional remembered credentials.
//!
//! Remembered credentials are stored in plain text in local storage. This is
//! a known weakness kept for compatibility with existing installs.

use tracing::{info, instrument, warn};

use reportfeed_core::{AuthSession, Credentials, LocalStorage, Result, SessionProvider};

use super::require_field;

pub const REMEMBERED_EMAIL_KEY: &str = "userEmail";
pub const REMEMBERED_PASSWORD_KEY: &str = "userPassword";

pub struct LoginScreen<P, L> {
    session: P,
    storage: L,
}

impl<P, L> LoginScreen<P, L>
where
    P: SessionProvider,
    L: LocalStorage,
{
    pub fn new(session: P, storage: L) -> Self {
        Self { session, storage }
    }

    /// Remembered credentials, if both halves are stored.
    pub async fn prefill(&self) -> Result<Option<Credentials>> {
        let email = self.storage.get(REMEMBERED_EMAIL_KEY).await?;
        let password = self.storage.get(REMEMBERED_PASSWORD_KEY).await?;
        Ok(match (email, password) {
            (Some(email), Some(password)) => Some(Credentials::new(email, password)),
            _ => None,
        })
    }

    /// Sign in, then remember or forget the credentials.
    ///
    /// Failing to update the remembered credentials does not undo the
    /// sign-in; it is logged.
    #[instrument(skip(self, password))]
    pub async fn submit(&self, email: &str, password: &str, remember: bool) -> Result<AuthSession> {
        require_field("email", email)?;
        require_field("password", password)?;

        let credentials = Credentials::new(email.trim(), password);
        let session = self.session.sign_in(credentials.clone()).await?;
        info!(user = %session.identity.id, "signed in");

        let outcome = if remember {
            self.remember(&credentials).await
        } else {
            self.forget().await
        };
        if let Err(err) = outcome {
            warn!(error = %err, "could not update remembered credentials");
        }
        Ok(session)
    }

    async fn remember(&self, credentials: &Credentials) -> Result<()> {
        self.storage
            .set(REMEMBERED_EMAIL_KEY, credentials.email())
            .await?;
        self.storage
            .set(REMEMBERED_PASSWORD_KEY, credentials.password())
            .await
    }

    async fn forget(&self) -> Result<()> {
        forget_credentials(&self.storage).await
    }
}

pub(crate) async fn forget_credentials<L: LocalStorage + ?Sized>(storage: &L) -> Result<()> {
    storage.remove(REMEMBERED_EMAIL_KEY).await?;
    storage.remove(REMEMBERED_PASSWORD_KEY).await
}
