use crate::Result;
use bytes::Bytes;
use std::fmt::Debug;

/// HttpSend is used to reach the storage control plane and data plane.
///
/// All storage traffic the relay produces goes through this trait, which
/// keeps the worker testable against a scripted fake and keeps the HTTP
/// client choice out of the core.
#[async_trait::async_trait]
pub trait HttpSend: Debug + Send + Sync + 'static {
    /// Send an http request and return the response.
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>>;
}
