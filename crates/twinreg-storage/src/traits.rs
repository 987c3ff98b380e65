//! The storage contracts for shell descriptors.
//!
//! - [`ShellRegistry`] is what callers see: every method takes `&self` and
//!   implementations are safe to share between threads. Each backend owns
//!   its concurrency discipline internally.
//! - [`ShellStore`] is the sequential form of the same contract, with
//!   `&mut self` writers. It assumes single-threaded access and is lifted to
//!   a [`ShellRegistry`] by [`LockedRegistry`](crate::locked::LockedRegistry).

use std::collections::BTreeSet;

use twinreg_core::{SearchRequest, SearchResponse, ShellDescriptor, SubmodelDescriptor};

use crate::error::RegistryError;

/// The thread-safe registry contract.
pub trait ShellRegistry: Send + Sync {
    // -------------------------------------------------------------------
    // Shell-level operations
    // -------------------------------------------------------------------

    /// Returns the shell with the given id, or `ShellNotFound`.
    fn get_shell(&self, shell_id: &str) -> Result<ShellDescriptor, RegistryError>;

    /// Returns a snapshot of all shells. Order is unspecified.
    fn get_all_shells(&self) -> Result<Vec<ShellDescriptor>, RegistryError>;

    /// Inserts the shell or fully replaces the stored one, including its
    /// submodel array.
    ///
    /// Rejects the whole descriptor with `DuplicateSubmodelId` if its own
    /// submodel array repeats an id.
    fn add_or_replace(&self, descriptor: ShellDescriptor) -> Result<(), RegistryError>;

    /// Removes the shell. Returns false if it was not registered.
    fn remove(&self, shell_id: &str) -> Result<bool, RegistryError>;

    /// Removes every shell and returns the ids that were removed.
    ///
    /// Backends without a single atomicity boundary for bulk deletes only
    /// guarantee that every returned id was individually confirmed deleted.
    fn clear(&self) -> Result<BTreeSet<String>, RegistryError>;

    // -------------------------------------------------------------------
    // Submodel-level operations
    // -------------------------------------------------------------------

    fn contains_submodel(&self, shell_id: &str, submodel_id: &str)
        -> Result<bool, RegistryError>;

    /// Returns the submodels of a shell, or `ShellNotFound`.
    fn get_all_submodels(&self, shell_id: &str)
        -> Result<Vec<SubmodelDescriptor>, RegistryError>;

    /// Returns one submodel, failing with `ShellNotFound` or
    /// `SubmodelNotFound` depending on which id did not resolve.
    fn get_submodel(
        &self,
        shell_id: &str,
        submodel_id: &str,
    ) -> Result<SubmodelDescriptor, RegistryError>;

    /// Replaces the submodel with the same id in place, or appends it.
    ///
    /// Fails with `ShellNotFound` if the shell does not exist; the shell is
    /// never created implicitly.
    fn append_or_replace_submodel(
        &self,
        shell_id: &str,
        submodel: SubmodelDescriptor,
    ) -> Result<(), RegistryError>;

    /// Removes one submodel. Returns false if the shell had no such
    /// submodel, `ShellNotFound` if the shell does not exist.
    fn remove_submodel(&self, shell_id: &str, submodel_id: &str) -> Result<bool, RegistryError>;

    // -------------------------------------------------------------------
    // Search
    // -------------------------------------------------------------------

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, RegistryError>;
}

/// The sequential registry contract.
///
/// Same semantics as [`ShellRegistry`]; writers take `&mut self`.
pub trait ShellStore {
    fn get_shell(&self, shell_id: &str) -> Result<ShellDescriptor, RegistryError>;

    fn get_all_shells(&self) -> Result<Vec<ShellDescriptor>, RegistryError>;

    fn add_or_replace(&mut self, descriptor: ShellDescriptor) -> Result<(), RegistryError>;

    fn remove(&mut self, shell_id: &str) -> Result<bool, RegistryError>;

    fn clear(&mut self) -> Result<BTreeSet<String>, RegistryError>;

    fn contains_submodel(&self, shell_id: &str, submodel_id: &str)
        -> Result<bool, RegistryError>;

    fn get_all_submodels(&self, shell_id: &str)
        -> Result<Vec<SubmodelDescriptor>, RegistryError>;

    fn get_submodel(
        &self,
        shell_id: &str,
        submodel_id: &str,
    ) -> Result<SubmodelDescriptor, RegistryError>;

    fn append_or_replace_submodel(
        &mut self,
        shell_id: &str,
        submodel: SubmodelDescriptor,
    ) -> Result<(), RegistryError>;

    fn remove_submodel(
        &mut self,
        shell_id: &str,
        submodel_id: &str,
    ) -> Result<bool, RegistryError>;

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, RegistryError>;
}
