//! # Synchro Worker Library
//!
//! This library provides the background delivery side of Synchro: it
//! drains the notification outbox written by the core services and
//! runs the invitation reconciliation sweep.
//!
//! ## Modules
//!
//! - `config`: environment-driven worker configuration
//! - `render`: notification payload to email rendering
//! - `sender`: email delivery backends (HTTP API, log-only)
//! - `dispatcher`: the outbox polling and delivery loop
//! - `reconciler`: repair sweep for accepted-but-ungranted invitations

pub mod config;
pub mod dispatcher;
pub mod reconciler;
pub mod render;
pub mod sender;
