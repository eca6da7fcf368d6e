//! Shared command context: data directory, preferences and the backend.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use tracing::debug;

use reportfeed_core::StoreUrl;
use reportfeed_file::FileKeyValue;

use crate::cli::GlobalArgs;
use crate::session::{Backend, storage};

pub const NOT_SIGNED_IN: &str = "Not signed in. Run 'reportfeed auth login' first.";

pub struct App {
    pub backend: Arc<Backend>,
    pub prefs: Arc<FileKeyValue>,
}

impl App {
    /// Open the backend and resume the saved session, if any.
    pub async fn open(global: &GlobalArgs) -> Result<Self> {
        let data_dir = data_dir(global)?;
        let prefs = Arc::new(preferences_in(&data_dir));

        let url = match &global.backend {
            Some(url) => StoreUrl::new(url).context("Invalid backend URL")?,
            None => {
                let store = data_dir.join("store");
                StoreUrl::new(format!("file://{}", store.display()))
                    .context("Invalid default store path")?
            }
        };
        if url.is_network() && global.api_key.is_none() {
            bail!("A hosted backend needs --api-key (or REPORTFEED_API_KEY)");
        }
        debug!(backend = %url, "Opening backend");

        let backend = Backend::open(url, global.api_key.as_deref()).context("Failed to open backend")?;
        storage::restore_session(&prefs, &backend).await?;

        Ok(Self {
            backend: Arc::new(backend),
            prefs,
        })
    }
}

/// The preferences file, without touching the backend.
pub fn preferences(global: &GlobalArgs) -> Result<Arc<FileKeyValue>> {
    Ok(Arc::new(preferences_in(&data_dir(global)?)))
}

fn preferences_in(data_dir: &std::path::Path) -> FileKeyValue {
    FileKeyValue::new(data_dir.join("preferences.json"))
}

fn data_dir(global: &GlobalArgs) -> Result<PathBuf> {
    let dir = match &global.data_dir {
        Some(dir) => dir.clone(),
        None => ProjectDirs::from("", "", "reportfeed")
            .context("Could not determine data directory")?
            .data_dir()
            .to_path_buf(),
    };
    fs::create_dir_all(&dir).context("Failed to create data directory")?;
    Ok(dir)
}
