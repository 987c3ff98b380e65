//! Storage and query engine for the twinreg descriptor registry.
//!
//! Provides the [`ShellRegistry`] trait defining the contract every backend
//! implements, three backends, and the decorators layered on top of them.
//!
//! # Architecture
//!
//! - **Backends** own their concurrency discipline: the [`InMemoryStore`] is
//!   sequential and made shareable by the [`LockedRegistry`] lock decorator,
//!   the [`DocumentStore`] relies on per-document optimistic concurrency, and
//!   the [`SqliteStore`] on SQL transactions.
//! - **Search** is compiled once by [`query::compile`] into a document-search
//!   body. Search servers execute it remotely; every other backend runs it
//!   through the in-process [`eval`] evaluator, so results agree.
//! - **Decorators** ([`eventing`], [`authorization`]) wrap any registry and
//!   are assembled by [`compose`](compose::compose) or from a
//!   [`RegistryConfig`].
//!
//! # Modules
//!
//! - [`error`]: RegistryError enum with all failure modes
//! - [`traits`]: ShellRegistry and ShellStore contracts
//! - [`memory`]: InMemoryStore implementation
//! - [`locked`]: reader/writer lock decorator
//! - [`document`]: document-search backend and its index implementations
//! - [`query`]: search request compiler and hit collection
//! - [`eval`]: in-process evaluator for compiled queries
//! - [`schema`]: SQLite schema and migration setup
//! - [`sqlite`]: SqliteStore implementation
//! - [`compose`], [`eventing`], [`authorization`]: decorator framework
//! - [`config`]: backend selection and registry construction

pub mod authorization;
pub mod compose;
pub mod config;
pub mod document;
pub mod error;
pub mod eval;
pub mod eventing;
pub mod locked;
pub mod memory;
pub mod query;
pub mod schema;
pub mod sqlite;
pub mod traits;

// Re-export key types for ergonomic use.
pub use authorization::{
    AccessRequest, ActionAuthorizer, AllowAll, Authorizer, AuthorizingDecorator,
    AuthorizingRegistry,
};
pub use compose::{compose, Action, Decorator};
pub use config::{build_registry, BackendConfig, EventsConfig, RegistryConfig};
pub use document::{DocumentIndex, DocumentStore, ElasticsearchIndex, EmbeddedIndex};
pub use error::RegistryError;
pub use eventing::{
    ChannelEventSink, EventSink, EventingDecorator, EventingRegistry, TracingEventSink,
};
pub use locked::LockedRegistry;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ShellRegistry, ShellStore};
