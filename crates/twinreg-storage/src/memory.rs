//! In-memory implementation of [`ShellStore`].
//!
//! [`InMemoryStore`] is the backend for tests and small deployments. It is
//! strictly sequential; wrap it in a
//! [`LockedRegistry`](crate::locked::LockedRegistry) to share it between
//! threads.
//!
//! Each shell's embedded submodel array is the source of truth. The
//! per-shell `submodel id -> array position` index is derived from it and is
//! patched in the same call as every array mutation.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tracing::debug;

use twinreg_core::{SearchRequest, SearchResponse, ShellDescriptor, SubmodelDescriptor};

use crate::error::RegistryError;
use crate::eval::evaluate;
use crate::query::{collect, compile};
use crate::traits::ShellStore;

/// Submodel id to position in the owning shell's array.
type SubmodelIndex = HashMap<String, usize>;

/// Sequential in-memory shell store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    shells: HashMap<String, ShellDescriptor>,
    submodel_index: HashMap<String, SubmodelIndex>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered shells.
    pub fn len(&self) -> usize {
        self.shells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shells.is_empty()
    }

    /// Returns true if every shell's index names exactly the ids of its
    /// submodel array, at the right positions.
    pub fn is_index_consistent(&self) -> bool {
        if self.shells.len() != self.submodel_index.len() {
            return false;
        }
        self.shells.iter().all(|(shell_id, shell)| {
            let Some(index) = self.submodel_index.get(shell_id) else {
                return false;
            };
            index.len() == shell.submodel_descriptors.len()
                && shell
                    .submodel_descriptors
                    .iter()
                    .enumerate()
                    .all(|(pos, sm)| index.get(&sm.id) == Some(&pos))
        })
    }

    fn stored(&self, shell_id: &str) -> Result<&ShellDescriptor, RegistryError> {
        self.shells
            .get(shell_id)
            .ok_or_else(|| RegistryError::ShellNotFound(shell_id.to_string()))
    }

    fn stored_index(&self, shell_id: &str) -> Result<&SubmodelIndex, RegistryError> {
        self.submodel_index
            .get(shell_id)
            .ok_or_else(|| RegistryError::ShellNotFound(shell_id.to_string()))
    }

    /// Returns the shell and its index for mutation.
    fn stored_mut(
        &mut self,
        shell_id: &str,
    ) -> Result<(&mut ShellDescriptor, &mut SubmodelIndex), RegistryError> {
        match (
            self.shells.get_mut(shell_id),
            self.submodel_index.get_mut(shell_id),
        ) {
            (Some(shell), Some(index)) => Ok((shell, index)),
            _ => Err(RegistryError::ShellNotFound(shell_id.to_string())),
        }
    }
}

/// Builds the index for an incoming submodel array, failing on the first
/// repeated id.
fn build_index(submodels: &[SubmodelDescriptor]) -> Result<SubmodelIndex, RegistryError> {
    let mut index = HashMap::with_capacity(submodels.len());
    for (pos, sm) in submodels.iter().enumerate() {
        if index.insert(sm.id.clone(), pos).is_some() {
            return Err(RegistryError::DuplicateSubmodelId(sm.id.clone()));
        }
    }
    Ok(index)
}

impl ShellStore for InMemoryStore {
    fn get_shell(&self, shell_id: &str) -> Result<ShellDescriptor, RegistryError> {
        self.stored(shell_id).cloned()
    }

    fn get_all_shells(&self) -> Result<Vec<ShellDescriptor>, RegistryError> {
        Ok(self.shells.values().cloned().collect())
    }

    fn add_or_replace(&mut self, descriptor: ShellDescriptor) -> Result<(), RegistryError> {
        let index = build_index(&descriptor.submodel_descriptors)?;
        debug!(
            shell_id = %descriptor.id,
            submodels = index.len(),
            "storing shell"
        );
        self.submodel_index.insert(descriptor.id.clone(), index);
        self.shells.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    fn remove(&mut self, shell_id: &str) -> Result<bool, RegistryError> {
        self.submodel_index.remove(shell_id);
        let removed = self.shells.remove(shell_id).is_some();
        debug!(shell_id, removed, "removing shell");
        Ok(removed)
    }

    fn clear(&mut self) -> Result<BTreeSet<String>, RegistryError> {
        self.submodel_index.clear();
        let removed: BTreeSet<String> = self.shells.drain().map(|(id, _)| id).collect();
        debug!(count = removed.len(), "cleared shells");
        Ok(removed)
    }

    fn contains_submodel(
        &self,
        shell_id: &str,
        submodel_id: &str,
    ) -> Result<bool, RegistryError> {
        Ok(self
            .submodel_index
            .get(shell_id)
            .is_some_and(|index| index.contains_key(submodel_id)))
    }

    fn get_all_submodels(
        &self,
        shell_id: &str,
    ) -> Result<Vec<SubmodelDescriptor>, RegistryError> {
        Ok(self.stored(shell_id)?.submodel_descriptors.clone())
    }

    fn get_submodel(
        &self,
        shell_id: &str,
        submodel_id: &str,
    ) -> Result<SubmodelDescriptor, RegistryError> {
        let shell = self.stored(shell_id)?;
        let pos = self
            .stored_index(shell_id)?
            .get(submodel_id)
            .copied()
            .ok_or_else(|| RegistryError::submodel_not_found(shell_id, submodel_id))?;
        shell
            .submodel_descriptors
            .get(pos)
            .cloned()
            .ok_or_else(|| RegistryError::submodel_not_found(shell_id, submodel_id))
    }

    fn append_or_replace_submodel(
        &mut self,
        shell_id: &str,
        submodel: SubmodelDescriptor,
    ) -> Result<(), RegistryError> {
        let (shell, index) = self.stored_mut(shell_id)?;
        match index.get(&submodel.id).copied() {
            Some(pos) => {
                debug!(shell_id, submodel_id = %submodel.id, pos, "replacing submodel");
                shell.submodel_descriptors[pos] = submodel;
            }
            None => {
                debug!(shell_id, submodel_id = %submodel.id, "appending submodel");
                index.insert(submodel.id.clone(), shell.submodel_descriptors.len());
                shell.submodel_descriptors.push(submodel);
            }
        }
        Ok(())
    }

    fn remove_submodel(
        &mut self,
        shell_id: &str,
        submodel_id: &str,
    ) -> Result<bool, RegistryError> {
        let (shell, index) = self.stored_mut(shell_id)?;
        let Some(pos) = index.remove(submodel_id) else {
            return Ok(false);
        };
        shell.submodel_descriptors.remove(pos);
        for later in index.values_mut().filter(|p| **p > pos) {
            *later -= 1;
        }
        debug!(shell_id, submodel_id, "removed submodel");
        Ok(true)
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, RegistryError> {
        let compiled = compile(request)?;
        let mut documents: Vec<(&str, Value)> = Vec::with_capacity(self.shells.len());
        for (id, shell) in &self.shells {
            documents.push((id.as_str(), serde_json::to_value(shell)?));
        }
        let hits = evaluate(
            &compiled.body,
            documents.iter().map(|(id, doc)| (*id, doc)),
        )?;
        collect(&compiled, hits)
    }
}
