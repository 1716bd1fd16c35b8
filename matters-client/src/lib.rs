//! GraphQL client for the Matters web front end.
//!
//! Operations go through a fixed pipeline of links (error logging, diagnostic
//! correlation, fingerprint, credentials, user group, persisted queries) and
//! end in an HTTP transport. Results land in a normalized cache that can be
//! snapshotted on the server and restored in the browser.

#![warn(unreachable_pub)]

pub mod json_ext;

pub mod cache;
mod client;
pub mod configuration;
pub mod context;
pub mod cookie;
pub mod environment;
pub mod error;
pub mod graphql;
pub mod link;
pub mod locale;
pub mod operation;
pub mod storage;
pub mod transport;

pub use cache::NormalizedCache;
pub use client::Client;
pub use configuration::Configuration;
pub use context::Context;
pub use environment::RenderContext;
pub use error::FetchError;
pub use locale::Language;
pub use operation::Operation;
pub use operation::Upload;
