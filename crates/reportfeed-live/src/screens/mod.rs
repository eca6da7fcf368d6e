//! Screen bindings.
//!
//! Each screen is a thin layer over a [`LiveQuery`](crate::LiveQuery) or the
//! session provider. Navigation stays with the host.

mod login;
mod reports;
mod settings;
mod signup;
mod trend;

pub use login::{LoginScreen, REMEMBERED_EMAIL_KEY, REMEMBERED_PASSWORD_KEY};
pub use reports::{DEFAULT_TITLE, REPORTS_TABLE, Report, ReportsFeed};
pub use settings::ProfileSettings;
pub use signup::{PROFILES_TABLE, SignupError, SignupForm, SignupScreen, UserProfile};
pub use trend::{TREND_TABLE, TrendAnalysis, TrendCapsule};

use reportfeed_core::error::{Error, InvalidInputError};

/// A form field that is empty after trimming.
pub(crate) fn require_field(field: &'static str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(InvalidInputError::Field {
            field,
            reason: "must not be empty".to_string(),
        }
        .into());
    }
    Ok(())
}
