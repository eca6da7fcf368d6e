//! Session persistence in the preferences file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use reportfeed_core::{AccessToken, AuthSession, LocalStorage, RefreshToken, StoreUrl};
use reportfeed_file::FileKeyValue;

use super::Backend;

const SESSION_KEY: &str = "session";

/// Stored session data.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    backend: String,
    user_id: String,
    access_token: String,
    refresh_token: Option<String>,
}

/// Save a session for `backend`.
pub async fn save_session(
    prefs: &FileKeyValue,
    backend: &StoreUrl,
    session: &AuthSession,
) -> Result<()> {
    let stored = StoredSession {
        backend: backend.to_string(),
        user_id: session.identity.id.to_string(),
        access_token: session.access_token.as_str().to_string(),
        refresh_token: session.refresh_token.as_ref().map(|t| t.as_str().to_string()),
    };
    let json = serde_json::to_string(&stored)?;
    prefs
        .set(SESSION_KEY, &json)
        .await
        .context("Failed to write session")?;
    Ok(())
}

/// Resume the saved session on `backend`, if there is one for it.
///
/// A session the backend no longer accepts is discarded.
pub async fn restore_session(prefs: &FileKeyValue, backend: &Backend) -> Result<Option<AuthSession>> {
    let Some(json) = prefs.get(SESSION_KEY).await.context("Failed to read session")? else {
        return Ok(None);
    };
    let stored: StoredSession = match serde_json::from_str(&json) {
        Ok(stored) => stored,
        Err(e) => {
            warn!(error = %e, "Discarding unreadable session");
            clear_session(prefs).await?;
            return Ok(None);
        }
    };

    if stored.backend != backend.url().to_string() {
        debug!(saved = %stored.backend, "Saved session belongs to another backend");
        return Ok(None);
    }

    let access_token = AccessToken::new(stored.access_token);
    let refresh_token = stored.refresh_token.map(RefreshToken::new);
    match backend.restore(access_token, refresh_token).await {
        Ok(session) => {
            // Tokens may have been refreshed.
            save_session(prefs, backend.url(), &session).await?;
            Ok(Some(session))
        }
        Err(e) if e.is_auth() => {
            warn!(user = %stored.user_id, error = %e, "Saved session is no longer valid");
            clear_session(prefs).await?;
            Ok(None)
        }
        Err(e) => Err(e).context("Failed to restore session"),
    }
}

/// Forget the saved session.
pub async fn clear_session(prefs: &FileKeyValue) -> Result<()> {
    prefs
        .remove(SESSION_KEY)
        .await
        .context("Failed to remove session")?;
    Ok(())
}
