//! Theme preference.
//!
//! One [`ThemeStore`] per process. The platform default is visible from
//! construction; the persisted choice replaces it once loaded, unless the
//! user has already toggled.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use reportfeed_core::LocalStorage;
use reportfeed_core::error::{Error, InvalidInputError};

/// Storage key of the persisted theme.
pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    /// The persisted spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Theme {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn palette(self) -> &'static Palette {
        Palette::for_theme(self)
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(InvalidInputError::Other {
                message: format!("unknown theme {other:?}"),
            }
            .into()),
        }
    }
}

/// Named colours, as `#rrggbb` strings.
///
/// The slot names are the ones screens style themselves with. The values in
/// `LIGHT` and `DARK` are placeholder colours; a host with its own brand
/// palette should map the slots to its own values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Palette {
    pub background: &'static str,
    pub card: &'static str,
    pub text: &'static str,
    pub text_secondary: &'static str,
    pub text_tertiary: &'static str,
    pub primary: &'static str,
    pub primary_light: &'static str,
    pub border: &'static str,
    pub error: &'static str,
    pub success: &'static str,
    pub warning: &'static str,
    pub info: &'static str,
    pub shadow: &'static str,
}

const LIGHT: Palette = Palette {
    background: "#f5f7fa",
    card: "#ffffff",
    text: "#1a1d23",
    text_secondary: "#5b6270",
    text_tertiary: "#8a919e",
    primary: "#4f46e5",
    primary_light: "#e0e7ff",
    border: "#e2e6ec",
    error: "#dc2626",
    success: "#16a34a",
    warning: "#d97706",
    info: "#2563eb",
    shadow: "#000000",
};

const DARK: Palette = Palette {
    background: "#0f1115",
    card: "#1a1d24",
    text: "#f3f4f6",
    text_secondary: "#a1a7b3",
    text_tertiary: "#6b7280",
    primary: "#818cf8",
    primary_light: "#312e81",
    border: "#2a2f38",
    error: "#f87171",
    success: "#4ade80",
    warning: "#fbbf24",
    info: "#60a5fa",
    shadow: "#000000",
};

impl Palette {
    pub fn for_theme(theme: Theme) -> &'static Palette {
        match theme {
            Theme::Light => &LIGHT,
            Theme::Dark => &DARK,
        }
    }
}

/// The process-wide theme setting.
pub struct ThemeStore<L> {
    storage: L,
    theme: watch::Sender<Theme>,
    /// Set by the first toggle. A persisted value read afterwards is stale.
    user_chose: AtomicBool,
}

impl<L: LocalStorage> ThemeStore<L> {
    /// Publish `platform_default` immediately. Call [`load`](Self::load) to
    /// apply the persisted choice.
    pub fn new(platform_default: Theme, storage: L) -> Self {
        let (theme, _) = watch::channel(platform_default);
        Self {
            storage,
            theme,
            user_chose: AtomicBool::new(false),
        }
    }

    /// Apply the persisted theme, if any, and return the current one.
    ///
    /// Read failures and unknown values are logged and leave the theme as is.
    pub async fn load(&self) -> Theme {
        let stored = match self.storage.get(THEME_KEY).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "could not read theme preference");
                None
            }
        };

        if let Some(value) = stored {
            match value.parse::<Theme>() {
                Ok(persisted) => {
                    self.theme.send_if_modified(|current| {
                        // Toggle and load serialize on the channel lock.
                        if self.user_chose.load(Ordering::SeqCst) {
                            debug!("theme toggled before load finished, keeping it");
                            return false;
                        }
                        let changed = *current != persisted;
                        *current = persisted;
                        changed
                    });
                }
                Err(err) => warn!(value = %value, error = %err, "ignoring stored theme"),
            }
        }
        self.current()
    }

    /// Flip the theme, publish it, then persist it.
    pub async fn toggle(&self) -> Theme {
        let mut next = Theme::default();
        self.theme.send_modify(|current| {
            *current = current.toggled();
            next = *current;
            self.user_chose.store(true, Ordering::SeqCst);
        });

        if let Err(err) = self.storage.set(THEME_KEY, next.as_str()).await {
            warn!(theme = %next, error = %err, "could not persist theme preference");
        }
        next
    }

    pub fn current(&self) -> Theme {
        *self.theme.borrow()
    }

    pub fn palette(&self) -> &'static Palette {
        self.current().palette()
    }

    pub fn subscribe(&self) -> watch::Receiver<Theme> {
        self.theme.subscribe()
    }
}
