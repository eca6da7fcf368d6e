//! Profile settings.

use tracing::{info, instrument, warn};

use reportfeed_core::{
    Identity, IdentityPatch, LocalStorage, RecordId, RemoteStore, Result, Row, SessionProvider,
    TableName,
};

use super::login::forget_credentials;
use super::require_field;
use super::signup::PROFILES_TABLE;
use crate::gate::require_identity;

pub struct ProfileSettings<S, P, L> {
    store: S,
    session: P,
    storage: L,
}

impl<S, P, L> ProfileSettings<S, P, L>
where
    S: RemoteStore,
    P: SessionProvider,
    L: LocalStorage,
{
    pub fn new(store: S, session: P, storage: L) -> Self {
        Self {
            store,
            session,
            storage,
        }
    }

    /// The signed-in identity.
    pub async fn load(&self) -> Result<Identity> {
        require_identity(&self.session).await
    }

    /// Rename the signed-in user in both the auth metadata and the profile
    /// row.
    #[instrument(skip(self))]
    pub async fn update_display_name(&self, name: &str) -> Result<Identity> {
        require_field("display_name", name)?;
        require_identity(&self.session).await?;

        let name = name.trim();
        let identity = self
            .session
            .update_identity(&IdentityPatch {
                display_name: Some(name.to_string()),
            })
            .await?;

        let table = TableName::new(PROFILES_TABLE)?;
        let id = RecordId::new(identity.id.as_str())?;
        self.store
            .update(&table, &id, &Row::empty().with("display_name", name))
            .await
            .map_err(|e| e.into_write(&table))?;
        info!(user = %identity.id, "display name updated");
        Ok(identity)
    }

    /// Forget remembered credentials, then end the session.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        if let Err(err) = forget_credentials(&self.storage).await {
            warn!(error = %err, "could not clear remembered credentials");
        }
        self.session.sign_out().await?;
        info!("signed out");
        Ok(())
    }
}
