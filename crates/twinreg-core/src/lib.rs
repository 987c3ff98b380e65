//! Core value types for the twinreg descriptor registry.
//!
//! - [`descriptor`]: shell and submodel descriptors with their identity rules
//! - [`search`]: backend-agnostic search requests and responses
//! - [`event`]: notifications emitted after successful registry mutations

pub mod descriptor;
pub mod event;
pub mod search;

// Re-export commonly used types
pub use descriptor::{
    Endpoint, Key, Reference, ShellDescriptor, SubmodelDescriptor, SUBMODELS_FIELD,
};
pub use event::RegistryEvent;
pub use search::{
    is_submodel_path, Page, QueryType, SearchQuery, SearchRequest, SearchResponse, SortDirection,
    SortKey,
};
