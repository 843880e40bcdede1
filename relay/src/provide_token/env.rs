use super::ProvideToken;
use crate::token::AccessToken;
use blobrelay_core::{Context, Result};

/// Variable holding a pre-issued control plane bearer token.
pub const AZURE_STORAGE_BEARER_TOKEN: &str = "AZURE_STORAGE_BEARER_TOKEN";

/// Reads a pre-issued bearer token from the environment.
#[derive(Clone, Debug, Default)]
pub struct EnvTokenProvider;

impl EnvTokenProvider {
    /// Create a new env provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ProvideToken for EnvTokenProvider {
    async fn provide_token(&self, ctx: &Context) -> Result<Option<AccessToken>> {
        match ctx.env_var(AZURE_STORAGE_BEARER_TOKEN) {
            Some(token) if !token.is_empty() => Ok(Some(AccessToken::new(token, None))),
            _ => Ok(None),
        }
    }
}
