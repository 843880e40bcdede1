use blobrelay_core::{Error, Result};
use serde::Deserialize;

/// The inbound queue payload, as the event grid publishes it.
///
/// Only `data.url` drives the pipeline; every other field is carried as an
/// opaque string and passed through untouched.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[allow(missing_docs)]
pub struct QueueEvent {
    pub topic: String,
    pub subject: String,
    pub event_type: String,
    pub id: String,
    pub data: EventData,
    pub event_time: String,
}

/// The data section of a [`QueueEvent`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventData {
    /// Absolute URL of the blob to relocate.
    pub url: String,
}

/// A blob location resolved into its (account endpoint, container, blob)
/// triple.
///
/// Path segments are kept exactly as they appeared in the original URL, so
/// reassembling the address is byte-for-byte stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobAddress {
    endpoint: String,
    container: String,
    blob: String,
}

impl BlobAddress {
    /// Resolve an absolute blob URL into its triple.
    ///
    /// Fails with a decode error when the URL is relative, has no container
    /// segment, or has no object path.
    pub fn parse(url: &str) -> Result<Self> {
        let uri: http::Uri = url
            .parse()
            .map_err(|e| Error::decode(format!("blob url is not a valid uri: {url}")).with_source(e))?;

        let scheme = uri
            .scheme_str()
            .ok_or_else(|| Error::decode(format!("blob url is missing a scheme: {url}")))?;
        let authority = uri
            .authority()
            .ok_or_else(|| Error::decode(format!("blob url is missing a host: {url}")))?;

        let path = uri.path().trim_start_matches('/');
        let (container, blob) = path
            .split_once('/')
            .ok_or_else(|| Error::decode(format!("blob url has no object path: {url}")))?;
        if container.is_empty() || blob.is_empty() {
            return Err(Error::decode(format!(
                "blob url must address a container and an object: {url}"
            )));
        }

        Ok(Self {
            endpoint: format!("{scheme}://{authority}"),
            container: container.to_string(),
            blob: blob.to_string(),
        })
    }

    /// The account endpoint, `scheme://host`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The container name.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// The object path within the container. May contain `/`.
    pub fn blob(&self) -> &str {
        &self.blob
    }

    /// The storage account name, taken from the first host label.
    pub fn account_name(&self) -> &str {
        let host = self
            .endpoint
            .split_once("://")
            .map(|(_, host)| host)
            .unwrap_or(&self.endpoint);
        host.split('.').next().unwrap_or(host)
    }

    /// The container URL without any token.
    pub fn container_url(&self) -> String {
        format!("{}/{}", self.endpoint, self.container)
    }

    /// The full blob URL without any token. Reconstructs the original
    /// address exactly.
    pub fn blob_url(&self) -> String {
        format!("{}/{}/{}", self.endpoint, self.container, self.blob)
    }
}

/// A decoded transfer trigger: the raw event plus its resolved source
/// address.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// The event exactly as received.
    pub event: QueueEvent,
    /// The blob the event points at.
    pub source: BlobAddress,
}

impl TransferRequest {
    /// Decode raw message bytes into a transfer request.
    ///
    /// This performs no I/O; any failure here stops the invocation before
    /// the first network call.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let payload = std::str::from_utf8(body)
            .map_err(|e| Error::decode("message body is not valid utf-8").with_source(e))?;

        let event: QueueEvent = serde_json::from_str(payload)
            .map_err(|e| Error::decode("message body is not a valid transfer event").with_source(e))?;

        let source = BlobAddress::parse(&event.data.url)?;

        Ok(Self { event, source })
    }
}
