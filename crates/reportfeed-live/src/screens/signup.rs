//! Account creation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use reportfeed_core::error::{Error, InvalidInputError};
use reportfeed_core::{AuthSession, RemoteStore, Row, SessionProvider, SignUp, TableName};

use super::require_field;

pub const PROFILES_TABLE: &str = "user_profiles";

/// One row of `user_profiles`, keyed by the user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// What the user typed.
#[derive(Clone, Default)]
pub struct SignupForm {
    pub display_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl fmt::Debug for SignupForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupForm")
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl SignupForm {
    /// Check the form without contacting the backend.
    pub fn validate(&self) -> Result<(), Error> {
        require_field("display_name", &self.display_name)?;
        require_field("email", &self.email)?;
        require_field("password", &self.password)?;
        require_field("confirm_password", &self.confirm_password)?;
        if self.password != self.confirm_password {
            return Err(InvalidInputError::Field {
                field: "confirm_password",
                reason: "passwords do not match".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SignupError {
    /// The form was invalid or the account could not be created.
    #[error(transparent)]
    Account(#[from] Error),

    /// The account exists and is signed in, but its profile row was not
    /// written. Nothing is rolled back.
    #[error("account created but profile could not be saved: {source}")]
    ProfileNotCreated {
        session: Box<AuthSession>,
        #[source]
        source: Error,
    },
}

pub struct SignupScreen<S, P> {
    store: S,
    session: P,
}

impl<S, P> SignupScreen<S, P>
where
    S: RemoteStore,
    P: SessionProvider,
{
    pub fn new(store: S, session: P) -> Self {
        Self { store, session }
    }

    /// Create the account, then its profile row.
    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn submit(&self, form: &SignupForm) -> Result<AuthSession, SignupError> {
        form.validate()?;

        let display_name = form.display_name.trim();
        let email = form.email.trim();
        let request = SignUp {
            email: email.to_string(),
            password: form.password.clone(),
            display_name: display_name.to_string(),
        };
        let session = self.session.sign_up(&request).await?;
        info!(user = %session.identity.id, "account created");

        let table = TableName::new(PROFILES_TABLE)?;
        let profile = Row::empty()
            .with("id", session.identity.id.as_str())
            .with("display_name", display_name)
            .with("email", email);

        match self.store.insert(&table, &profile).await {
            Ok(_) => Ok(session),
            Err(err) => {
                let source = err.into_write(&table);
                warn!(user = %session.identity.id, error = %source, "profile row not created");
                Err(SignupError::ProfileNotCreated {
                    session: Box::new(session),
                    source,
                })
            }
        }
    }
}
