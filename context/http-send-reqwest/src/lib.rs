//! `HttpSend` implementation backed by [`reqwest`].
//!
//! This is the production HTTP stack for the relay. Tests use a scripted
//! fake instead, so `reqwest` never leaks into the core or the worker.

use async_trait::async_trait;
use blobrelay_core::{Error, HttpSend, Result};
use bytes::Bytes;
use reqwest::Client;

/// Sends requests through a shared [`reqwest::Client`].
#[derive(Debug, Default)]
pub struct ReqwestHttpSend {
    client: Client,
}

impl ReqwestHttpSend {
    /// Create an adapter around an already configured client, so callers
    /// control timeouts, proxies and TLS settings in one place.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl From<Client> for ReqwestHttpSend {
    fn from(client: Client) -> Self {
        Self::new(client)
    }
}

#[async_trait]
impl HttpSend for ReqwestHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let req = reqwest::Request::try_from(req)
            .map_err(|e| Error::unexpected("failed to convert http request").with_source(e))?;

        let resp = self
            .client
            .execute(req)
            .await
            .map_err(|e| Error::unexpected("http request failed").with_source(e))?;

        let mut builder = http::Response::builder().status(resp.status());
        if let Some(headers) = builder.headers_mut() {
            headers.extend(resp.headers().clone());
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::unexpected("failed to read response body").with_source(e))?;

        builder
            .body(body)
            .map_err(|e| Error::unexpected("failed to assemble http response").with_source(e))
    }
}
