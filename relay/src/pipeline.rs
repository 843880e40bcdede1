use crate::account::StorageAccount;
use crate::config::Config;
use crate::copy::Copier;
use crate::message::{BlobAddress, TransferRequest};
use crate::provide_token::{DefaultTokenProvider, ProvideToken};
use crate::sas::SasPermissions;
use blobrelay_core::{Context, Result};
use log::{error, info, warn};
use std::sync::Arc;

/// What one completed transfer looked like, for logs and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    /// Where the blob came from.
    pub source: BlobAddress,
    /// Where the blob ended up (no token attached).
    pub destination_url: String,
    /// Whether this invocation created the destination container.
    pub container_created: bool,
    /// Status reads it took to observe the copy resolve.
    pub polls: u32,
    /// Whether the source blob existed when cleanup ran.
    pub source_deleted: bool,
}

/// How one message was concluded. Both variants acknowledge the message;
/// failed transfers are dropped, not requeued. That at-most-once policy is
/// deliberate and observable only through logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The blob was copied and the source cleaned up.
    Completed(TransferSummary),
    /// The pipeline failed; the error was logged and the message dropped.
    Abandoned,
}

impl Outcome {
    /// Whether the transfer went through.
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }
}

/// The queue-triggered relocation worker.
///
/// One `Relay` serves any number of invocations; each invocation gets its
/// own delegation keys, tokens and copy handle, so instances share nothing
/// but the identity provider and settings.
pub struct Relay {
    ctx: Context,
    config: Config,
    provider: Arc<dyn ProvideToken>,
}

impl Relay {
    /// Create a worker with the default identity chain.
    pub fn new(ctx: Context, config: Config) -> Self {
        Self {
            ctx,
            config,
            provider: Arc::new(DefaultTokenProvider::new()),
        }
    }

    /// Replace the identity provider.
    pub fn with_token_provider(mut self, provider: impl ProvideToken) -> Self {
        self.provider = Arc::new(provider);
        self
    }

    /// Run the pipeline for one message: decode, issue the source read
    /// token, resolve the destination, drive the copy, clean up.
    ///
    /// Any error leaves the source blob in place, except a cleanup
    /// failure, which is handled inside and never surfaces here.
    pub async fn process(&self, body: &[u8]) -> Result<TransferSummary> {
        let request = TransferRequest::decode(body)?;
        let source = &request.source;
        info!(
            "processing transfer {} for {}",
            request.event.id,
            source.blob_url()
        );

        let source_account = StorageAccount::new(
            self.ctx.clone(),
            source.endpoint(),
            self.provider.clone(),
        );
        let source_sas = source_account
            .issue_delegation_sas(
                source.container(),
                Some(source.blob()),
                SasPermissions::READ,
                self.config.sas_validity,
            )
            .await?;

        let destination_endpoint = self.config.destination_endpoint()?;
        let destination_account = StorageAccount::new(
            self.ctx.clone(),
            destination_endpoint,
            self.provider.clone(),
        );
        let container_created = destination_account
            .create_container_if_absent(source.container())
            .await?;
        info!(
            "destination container {} ready on {} (created={})",
            source.container(),
            destination_account.account_name(),
            container_created,
        );
        let destination_sas = destination_account
            .issue_delegation_sas(
                source.container(),
                Some(source.blob()),
                SasPermissions::READ_WRITE,
                self.config.sas_validity,
            )
            .await?;

        let copier = Copier::new(self.ctx.clone())
            .with_poll_interval(self.config.poll_interval)
            .with_max_polls(self.config.poll_max_attempts);
        let outcome = copier.copy(&source_sas, &destination_sas).await?;

        // Cleanup runs only past this point, after a confirmed success.
        let source_deleted = match source_account
            .delete_blob_if_exists(source.container(), source.blob())
            .await
        {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!("source cleanup for {} failed: {e}", source.blob_url());
                false
            }
        };

        Ok(TransferSummary {
            source: source.clone(),
            destination_url: format!(
                "{}/{}/{}",
                destination_endpoint,
                source.container(),
                source.blob()
            ),
            container_created,
            polls: outcome.polls,
            source_deleted,
        })
    }

    /// Process one message and absorb any failure.
    ///
    /// This is the boundary the queue collaborator sees: the message is
    /// always handled, errors are logged with their stage context and the
    /// payload, and nothing is requeued.
    pub async fn handle(&self, body: &[u8]) -> Outcome {
        match self.process(body).await {
            Ok(summary) => {
                info!(
                    "transfer completed: {} -> {} (polls={}, source_deleted={})",
                    summary.source.blob_url(),
                    summary.destination_url,
                    summary.polls,
                    summary.source_deleted,
                );
                Outcome::Completed(summary)
            }
            Err(err) => {
                error!(
                    "transfer abandoned ({}): {err}; payload: {}",
                    err.kind(),
                    String::from_utf8_lossy(body),
                );
                Outcome::Abandoned
            }
        }
    }
}
