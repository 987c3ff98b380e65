//! Thread-safety decorator lifting a sequential [`ShellStore`] to a
//! [`ShellRegistry`].
//!
//! [`LockedRegistry`] holds the store behind one reader/writer lock. Reads
//! share the lock; every operation that may mutate takes it exclusively for
//! its whole duration, so read-then-write operations such as
//! `append_or_replace_submodel` decide and write inside one critical section.
//! No other locking happens for stores wrapped this way.

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use twinreg_core::{SearchRequest, SearchResponse, ShellDescriptor, SubmodelDescriptor};

use crate::error::RegistryError;
use crate::memory::InMemoryStore;
use crate::traits::{ShellRegistry, ShellStore};

/// A [`ShellStore`] guarded by a single `RwLock`.
#[derive(Debug, Default)]
pub struct LockedRegistry<S> {
    store: RwLock<S>,
}

impl<S: ShellStore> LockedRegistry<S> {
    pub fn new(store: S) -> Self {
        LockedRegistry {
            store: RwLock::new(store),
        }
    }

    /// Consumes the decorator and returns the wrapped store.
    pub fn into_inner(self) -> S {
        self.store.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with shared access to the wrapped store.
    pub fn with_store<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let guard = self.read();
        f(&*guard)
    }

    fn read(&self) -> RwLockReadGuard<'_, S> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, S> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LockedRegistry<InMemoryStore> {
    /// A thread-safe, empty in-memory registry.
    pub fn in_memory() -> Self {
        Self::new(InMemoryStore::new())
    }
}

impl<S> ShellRegistry for LockedRegistry<S>
where
    S: ShellStore + Send + Sync,
{
    fn get_shell(&self, shell_id: &str) -> Result<ShellDescriptor, RegistryError> {
        self.read().get_shell(shell_id)
    }

    fn get_all_shells(&self) -> Result<Vec<ShellDescriptor>, RegistryError> {
        self.read().get_all_shells()
    }

    fn add_or_replace(&self, descriptor: ShellDescriptor) -> Result<(), RegistryError> {
        self.write().add_or_replace(descriptor)
    }

    fn remove(&self, shell_id: &str) -> Result<bool, RegistryError> {
        self.write().remove(shell_id)
    }

    fn clear(&self) -> Result<BTreeSet<String>, RegistryError> {
        self.write().clear()
    }

    fn contains_submodel(
        &self,
        shell_id: &str,
        submodel_id: &str,
    ) -> Result<bool, RegistryError> {
        self.read().contains_submodel(shell_id, submodel_id)
    }

    fn get_all_submodels(
        &self,
        shell_id: &str,
    ) -> Result<Vec<SubmodelDescriptor>, RegistryError> {
        self.read().get_all_submodels(shell_id)
    }

    fn get_submodel(
        &self,
        shell_id: &str,
        submodel_id: &str,
    ) -> Result<SubmodelDescriptor, RegistryError> {
        self.read().get_submodel(shell_id, submodel_id)
    }

    fn append_or_replace_submodel(
        &self,
        shell_id: &str,
        submodel: SubmodelDescriptor,
    ) -> Result<(), RegistryError> {
        self.write().append_or_replace_submodel(shell_id, submodel)
    }

    fn remove_submodel(&self, shell_id: &str, submodel_id: &str) -> Result<bool, RegistryError> {
        self.write().remove_submodel(shell_id, submodel_id)
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, RegistryError> {
        self.read().search(request)
    }
}
