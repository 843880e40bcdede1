use blobrelay_core::time::{now, DateTime};
use blobrelay_core::utils::Redact;
use std::fmt::{Debug, Formatter};

/// A bearer token for the storage control plane, supplied by the ambient
/// identity. The worker never sees an account key.
#[derive(Clone, Default)]
pub struct AccessToken {
    /// The opaque bearer token.
    pub token: String,
    /// When the token stops being accepted, if known.
    pub expires_on: Option<DateTime>,
}

impl Debug for AccessToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &Redact::from(&self.token))
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

impl AccessToken {
    /// Create a new access token.
    pub fn new(token: impl Into<String>, expires_on: Option<DateTime>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// Whether the token can still authenticate a request.
    ///
    /// Takes a 20s buffer before the expiry to avoid racing the clock on
    /// in-flight requests.
    pub fn is_valid(&self) -> bool {
        if self.token.is_empty() {
            return false;
        }

        match self.expires_on {
            Some(expires_on) => {
                expires_on > now() + chrono::TimeDelta::try_seconds(20).expect("in bounds")
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_token_is_invalid() {
        assert!(!AccessToken::default().is_valid());
    }

    #[test]
    fn test_unexpired_token_is_valid() {
        let token = AccessToken::new(
            "token",
            Some(now() + chrono::TimeDelta::try_hours(1).unwrap()),
        );
        assert!(token.is_valid());
    }

    #[test]
    fn test_token_near_expiry_is_invalid() {
        let token = AccessToken::new(
            "token",
            Some(now() + chrono::TimeDelta::try_seconds(5).unwrap()),
        );
        assert!(!token.is_valid());
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = AccessToken::new("an-extremely-secret-token", None);
        let formatted = format!("{token:?}");
        assert!(!formatted.contains("extremely-secret"));
    }
}
