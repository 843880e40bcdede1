//! Queue-driven blob relocation between storage accounts.
//!
//! Each queue message names one blob that finished uploading. The worker
//! authenticates with its managed identity, signs short-lived delegation
//! tokens for the source and the configured destination, asks the service
//! to copy the blob across accounts, waits for the copy to resolve and
//! then deletes the source. Failures are logged and the message dropped;
//! nothing is retried.
//!
//! ```no_run
//! use blobrelay::{Config, Relay};
//! use blobrelay_core::Context;
//!
//! # async fn run(ctx: Context) {
//! let config = Config::default().from_env(&ctx);
//! let relay = Relay::new(ctx, config);
//! let outcome = relay.handle(br#"{...queue event...}"#).await;
//! assert!(!outcome.is_completed());
//! # }
//! ```

#![warn(missing_docs)]
#![deny(unused_must_use)]

mod constants;

pub mod account;
pub mod config;
pub mod copy;
pub mod message;
pub mod pipeline;
pub mod provide_token;
pub mod sas;
pub mod token;

pub use account::StorageAccount;
pub use config::Config;
pub use copy::{Copier, CopyOutcome, CopyStatus};
pub use message::{BlobAddress, QueueEvent, TransferRequest};
pub use pipeline::{Outcome, Relay, TransferSummary};
pub use token::AccessToken;
