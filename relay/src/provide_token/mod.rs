//! Identity providers for the storage control plane.
//!
//! The pipeline authenticates delegation-key requests, container creation
//! and cleanup with a bearer token from the ambient identity. These
//! providers cover the environments the worker runs in; everything else
//! can implement [`ProvideToken`] directly.

use crate::token::AccessToken;
use blobrelay_core::{Context, Result};
use std::fmt::Debug;
use std::sync::Arc;

/// ProvideToken supplies the bearer credential used against the storage
/// control plane.
#[async_trait::async_trait]
pub trait ProvideToken: Debug + Send + Sync + 'static {
    /// Fetch a token from this source.
    ///
    /// Returns `Ok(None)` when this source has nothing to offer, so a
    /// chain can move on to the next one.
    async fn provide_token(&self, ctx: &Context) -> Result<Option<AccessToken>>;
}

/// A chain of providers tried in order; the first token wins.
#[derive(Debug, Default)]
pub struct ProvideTokenChain {
    providers: Vec<Arc<dyn ProvideToken>>,
}

impl ProvideTokenChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider to the end of the chain.
    pub fn push(mut self, provider: impl ProvideToken) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }
}

#[async_trait::async_trait]
impl ProvideToken for ProvideTokenChain {
    async fn provide_token(&self, ctx: &Context) -> Result<Option<AccessToken>> {
        for provider in &self.providers {
            if let Some(token) = provider.provide_token(ctx).await? {
                return Ok(Some(token));
            }
        }

        Ok(None)
    }
}

mod static_provider;
pub use static_provider::StaticTokenProvider;

mod env;
pub use env::EnvTokenProvider;

mod imds;
pub use imds::ImdsTokenProvider;

mod default;
pub use default::DefaultTokenProvider;
