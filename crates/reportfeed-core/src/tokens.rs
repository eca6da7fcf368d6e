//! Bearer tokens issued by the session provider.
//!
//! Both kinds are opaque strings whose `Debug` output never shows the value,
//! so an `AuthSession` can be logged safely.

use std::fmt;

macro_rules! secret_token {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name(String);

        impl $name {
            pub fn new(token: impl Into<String>) -> Self {
                Self(token.into())
            }

            /// The raw value, for request headers and persisted sessions only.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "(***)"))
            }
        }
    };
}

secret_token!(
    /// Sent as `Authorization: Bearer` on every authenticated call.
    AccessToken
);

secret_token!(
    /// Exchanged for a new access token once the current one is rejected.
    RefreshToken
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_shows_the_value() {
        let access = AccessToken::new("eyJhbGciOiJIUzI1NiJ9.payload.sig");
        let refresh = RefreshToken::new("v1.refresh-secret");

        assert_eq!(format!("{access:?}"), "AccessToken(***)");
        assert_eq!(format!("{refresh:?}"), "RefreshToken(***)");
        assert_eq!(access.as_str(), "eyJhbGciOiJIUzI1NiJ9.payload.sig");
    }
}
