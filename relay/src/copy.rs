use crate::constants::*;
use blobrelay_core::{Context, Error, Result};
use bytes::Bytes;
use http::StatusCode;
use log::{debug, info};
use std::time::Duration;

/// Status of a server-side copy operation, as reported by the destination
/// object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CopyStatus {
    Pending,
    Success,
    Aborted,
    Failed,
}

impl CopyStatus {
    /// The wire form of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyStatus::Pending => "pending",
            CopyStatus::Success => "success",
            CopyStatus::Aborted => "aborted",
            CopyStatus::Failed => "failed",
        }
    }

    /// Parse the `x-ms-copy-status` header value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(CopyStatus::Pending),
            "success" => Ok(CopyStatus::Success),
            "aborted" => Ok(CopyStatus::Aborted),
            "failed" => Ok(CopyStatus::Failed),
            other => Err(Error::unexpected(format!("unknown copy status: {other}"))),
        }
    }

    /// Whether no further transition can occur.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CopyStatus::Pending)
    }
}

/// What a finished copy looked like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    /// The service-assigned id of the copy operation, when reported.
    pub copy_id: Option<String>,
    /// How many status reads it took to observe the terminal state.
    pub polls: u32,
}

/// Drives an asynchronous server-side copy to a terminal state.
///
/// The worker never touches the object bytes; it starts the copy with two
/// token URIs and watches the destination's copy status until the service
/// resolves the operation.
#[derive(Debug, Clone)]
pub struct Copier {
    ctx: Context,
    poll_interval: Duration,
    max_polls: u32,
}

impl Copier {
    /// Create a copier with a 1s poll interval bounded at 600 reads.
    pub fn new(ctx: Context) -> Self {
        Self {
            ctx,
            poll_interval: Duration::from_secs(1),
            max_polls: 600,
        }
    }

    /// Change the pause between status reads.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Change how many pending reads are tolerated before giving up.
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// Start a copy from `source_uri` to `dest_uri` (both token URIs) and
    /// poll until it resolves.
    ///
    /// Returns the outcome on success; fails with a copy error carrying
    /// the reported status on `failed`/`aborted`, and with a timeout error
    /// once the operation stays pending past the configured bound.
    pub async fn copy(&self, source_uri: &str, dest_uri: &str) -> Result<CopyOutcome> {
        let copy_id = self.start(source_uri, dest_uri).await?;
        debug!("copy started, id={copy_id:?}");

        let mut polls: u32 = 0;
        loop {
            if polls >= self.max_polls {
                return Err(Error::copy_timeout(format!(
                    "copy still pending after {polls} status reads"
                )));
            }

            let (status, description) = self.read_status(dest_uri).await?;
            polls += 1;

            match status {
                CopyStatus::Pending => tokio::time::sleep(self.poll_interval).await,
                CopyStatus::Success => {
                    info!("copy completed after {polls} status reads");
                    return Ok(CopyOutcome { copy_id, polls });
                }
                terminal => {
                    let mut message = format!("copy ended with status {}", terminal.as_str());
                    if let Some(description) = description {
                        message.push_str(&format!(": {description}"));
                    }
                    return Err(Error::copy_failed(message));
                }
            }
        }
    }

    /// Issue the copy-start call against the destination.
    ///
    /// - [Copy Blob](https://learn.microsoft.com/en-us/rest/api/storageservices/copy-blob)
    async fn start(&self, source_uri: &str, dest_uri: &str) -> Result<Option<String>> {
        let req = http::Request::put(dest_uri)
            .header(X_MS_COPY_SOURCE, source_uri)
            .header(X_MS_VERSION, STORAGE_VERSION)
            .body(Bytes::new())?;

        let resp = self
            .ctx
            .http_send_as_string(req)
            .await
            .map_err(|e| Error::unexpected("copy start unreachable").with_source(e))?;

        match resp.status() {
            StatusCode::ACCEPTED | StatusCode::CREATED => Ok(resp
                .headers()
                .get(X_MS_COPY_ID)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::authorization(
                format!("copy start rejected with status {}", resp.status()),
            )),
            status => Err(Error::unexpected(format!(
                "copy start failed with status {status}: {}",
                resp.body(),
            ))),
        }
    }

    /// Read the destination's copy status once.
    async fn read_status(&self, dest_uri: &str) -> Result<(CopyStatus, Option<String>)> {
        let req = http::Request::head(dest_uri)
            .header(X_MS_VERSION, STORAGE_VERSION)
            .body(Bytes::new())?;

        let resp = self
            .ctx
            .http_send(req)
            .await
            .map_err(|e| Error::unexpected("copy status read unreachable").with_source(e))?;

        match resp.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(Error::authorization(format!(
                    "copy status read rejected with status {}",
                    resp.status()
                )))
            }
            status => {
                return Err(Error::unexpected(format!(
                    "copy status read failed with status {status}"
                )))
            }
        }

        let status = resp
            .headers()
            .get(X_MS_COPY_STATUS)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::unexpected("destination reports no copy status"))?;
        let description = resp
            .headers()
            .get(X_MS_COPY_STATUS_DESCRIPTION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok((CopyStatus::parse(status)?, description))
    }
}
