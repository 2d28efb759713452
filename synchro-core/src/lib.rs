//! # Synchro Core Library
//!
//! This crate contains the data-synchronization core shared by the
//! Synchro clients and the background worker: the document-store
//! adapter, the typed entities, and the domain services that keep
//! projects, tasks, invitations, and the user directory consistent.
//!
//! ## Module Organization
//!
//! - `store`: document-store adapter trait, query types, and backends
//! - `entities`: typed documents and their update commands
//! - `services`: domain services (users, projects, tasks, invitations)
//! - `cache`: the TTL cache used by the user directory
//! - `error`: store and domain error types

pub mod cache;
pub mod entities;
pub mod error;
pub mod services;
pub mod store;

/// Current version of the Synchro core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
