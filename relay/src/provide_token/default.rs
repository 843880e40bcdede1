use super::{EnvTokenProvider, ImdsTokenProvider, ProvideToken, ProvideTokenChain};
use crate::token::AccessToken;
use blobrelay_core::{Context, Result};

/// Default provider: a pre-issued token from the environment first, then
/// the managed identity of the host.
#[derive(Debug)]
pub struct DefaultTokenProvider {
    chain: ProvideTokenChain,
}

impl Default for DefaultTokenProvider {
    fn default() -> Self {
        let chain = ProvideTokenChain::new()
            .push(EnvTokenProvider::new())
            .push(ImdsTokenProvider::new());

        Self { chain }
    }
}

impl DefaultTokenProvider {
    /// Create the default provider chain.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProvideToken for DefaultTokenProvider {
    async fn provide_token(&self, ctx: &Context) -> Result<Option<AccessToken>> {
        self.chain.provide_token(ctx).await
    }
}
