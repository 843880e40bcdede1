//! Core components for the blob relay worker.
//!
//! This crate provides the foundational types the relay crates build on.
//!
//! ## Overview
//!
//! - **Context**: a container holding the HTTP sending and environment
//!   access implementations one invocation runs against. No defaults are
//!   provided; production wires in real implementations, tests wire in
//!   fakes.
//! - **Error**: a single error type whose kinds mirror the failure modes of
//!   the relocation pipeline (decode, config, authorization, container
//!   provisioning, copy failure, copy timeout, cleanup).
//! - **Utilities**: UTC time formatting for SAS fields ([`time`]),
//!   base64/HMAC helpers for token signing ([`hash`]), and secret redaction
//!   for Debug output ([`utils`]).
//!
//! ## Example
//!
//! ```no_run
//! use blobrelay_core::{Context, OsEnv};
//!
//! let ctx = Context::new().with_env(OsEnv);
//! assert!(ctx.env_var("HOME").is_some());
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod context;
pub use context::Context;
mod http;
pub use http::HttpSend;
mod env;
pub use env::{Env, NoopEnv, OsEnv, StaticEnv};
mod error;
pub use error::{Error, ErrorKind, Result};
