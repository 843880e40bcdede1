use super::ProvideToken;
use crate::token::AccessToken;
use blobrelay_core::time::DateTime;
use blobrelay_core::{Context, Result};

/// Serves one fixed token. Meant for tests and for hosts that resolve the
/// identity themselves.
#[derive(Clone, Debug)]
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    /// Create a provider around a fixed bearer token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token, None),
        }
    }

    /// Attach an expiry to the fixed token.
    pub fn with_expires_on(mut self, expires_on: DateTime) -> Self {
        self.token.expires_on = Some(expires_on);
        self
    }
}

#[async_trait::async_trait]
impl ProvideToken for StaticTokenProvider {
    async fn provide_token(&self, _ctx: &Context) -> Result<Option<AccessToken>> {
        Ok(Some(self.token.clone()))
    }
}
