//! # Slipway
//!
//! The delivery pipeline of a source-to-deploy platform: a Git Smart HTTP
//! server terminating push/pull against per-app bare repositories, a release
//! store recording every pushed or built revision, and a GitHub webhook
//! pipeline turning push events into build triggers on orchestrator
//! deployments.
//!
//! Usable as a library for embedding the router:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use slipway::server::{AppState, create_router};
//!
//! let state = Arc::new(AppState { /* store, tokens, clients... */ });
//! let router = create_router(state);
//! // Serve with axum...
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod github;
pub mod hook;
pub mod orchestrator;
pub mod repos;
pub mod server;
pub mod store;
pub mod types;

pub(crate) const USER_AGENT: &str = concat!("slipway/", env!("CARGO_PKG_VERSION"));
