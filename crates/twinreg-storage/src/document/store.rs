//! [`ShellRegistry`] over a [`DocumentIndex`].
//!
//! One document per shell, keyed by shell id, with the submodels embedded as
//! a nested array. Whole-shell writes are plain index operations; submodel
//! writes are scripted updates that retry on version conflicts until they
//! land, so concurrent appends to the same shell are never lost. Every write
//! is searchable once it returns; [`Refresh`] only picks how the backend gets
//! there.
//!
//! Full scans page through the index sorted by `id.keyword` with a
//! `search_after` cursor, so they never hit the backend's result window and
//! concurrent deletes cannot shift later pages.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, info};

use twinreg_core::{
    SearchRequest, SearchResponse, ShellDescriptor, SortDirection, SubmodelDescriptor,
};

use crate::document::embedded::EmbeddedIndex;
use crate::document::index::{DocumentIndex, Refresh, ScriptedUpdate, UpdateOutcome, UpdateScript};
use crate::error::RegistryError;
use crate::query::{collect, compile, CompiledQuery, SearchHits};
use crate::traits::ShellRegistry;

/// Number of shells fetched per page by [`DocumentStore::clear`] and
/// [`DocumentStore::get_all_shells`](ShellRegistry::get_all_shells).
pub const CLEAR_BATCH_SIZE: u32 = 100;

/// Document-search registry backend.
#[derive(Debug)]
pub struct DocumentStore<I> {
    index: I,
    refresh: Refresh,
}

impl DocumentStore<EmbeddedIndex> {
    /// A document store over a fresh in-process index.
    pub fn embedded() -> Self {
        DocumentStore::new(EmbeddedIndex::new())
    }
}

impl<I: DocumentIndex> DocumentStore<I> {
    pub fn new(index: I) -> Self {
        DocumentStore {
            index,
            refresh: Refresh::default(),
        }
    }

    /// Uses `refresh` for every write instead of forcing a refresh.
    pub fn with_refresh(mut self, refresh: Refresh) -> Self {
        self.refresh = refresh;
        self
    }

    /// The underlying document index.
    pub fn index(&self) -> &I {
        &self.index
    }

    fn load(&self, shell_id: &str) -> Result<ShellDescriptor, RegistryError> {
        let source = self
            .index
            .get(shell_id)?
            .ok_or_else(|| RegistryError::ShellNotFound(shell_id.to_string()))?;
        Ok(serde_json::from_value(source)?)
    }

    /// Runs a submodel script against a shell document.
    fn run_script(
        &self,
        shell_id: &str,
        script: UpdateScript,
    ) -> Result<UpdateOutcome, RegistryError> {
        let update = ScriptedUpdate {
            refresh: self.refresh,
            ..ScriptedUpdate::unbounded(script)
        };
        match self.index.update(shell_id, &update)? {
            UpdateOutcome::Missing => Err(RegistryError::ShellNotFound(shell_id.to_string())),
            outcome => Ok(outcome),
        }
    }

    /// Up to `CLEAR_BATCH_SIZE` shells in id order, strictly after `cursor`
    /// when one is given.
    fn id_page(
        &self,
        cursor: Option<Vec<Value>>,
    ) -> Result<(CompiledQuery, SearchHits), RegistryError> {
        let request = SearchRequest::all()
            .sorted_by("id", SortDirection::Asc)
            .with_page(0, CLEAR_BATCH_SIZE);
        let mut compiled = compile(&request)?;
        if let Some(cursor) = cursor {
            compiled = compiled.after(cursor);
        }
        let hits = self.index.search(&compiled.body)?;
        Ok((compiled, hits))
    }
}

/// Sort values of the last hit, to resume the scan after it.
fn next_cursor(hits: &SearchHits) -> Result<Option<Vec<Value>>, RegistryError> {
    match hits.hits.last() {
        None => Ok(None),
        Some(last) if last.sort.is_empty() => Err(RegistryError::Backend {
            status: 200,
            body: format!("sorted hit '{}' carries no sort values", last.id),
        }),
        Some(last) => Ok(Some(last.sort.clone())),
    }
}

impl<I: DocumentIndex> ShellRegistry for DocumentStore<I> {
    fn get_shell(&self, shell_id: &str) -> Result<ShellDescriptor, RegistryError> {
        self.load(shell_id)
    }

    fn get_all_shells(&self) -> Result<Vec<ShellDescriptor>, RegistryError> {
        let mut shells = Vec::new();
        let mut cursor = None;
        loop {
            let (compiled, hits) = self.id_page(cursor)?;
            let fetched = hits.hits.len();
            cursor = next_cursor(&hits)?;
            shells.extend(collect(&compiled, hits)?.hits);
            if fetched < CLEAR_BATCH_SIZE as usize {
                return Ok(shells);
            }
        }
    }

    fn add_or_replace(&self, descriptor: ShellDescriptor) -> Result<(), RegistryError> {
        if let Some(dup) = descriptor.find_duplicate_submodel_id() {
            return Err(RegistryError::DuplicateSubmodelId(dup.to_string()));
        }
        let document = serde_json::to_value(&descriptor)?;
        self.index.index(&descriptor.id, &document, self.refresh)?;
        debug!(shell_id = %descriptor.id, "indexed shell");
        Ok(())
    }

    fn remove(&self, shell_id: &str) -> Result<bool, RegistryError> {
        self.index.delete(shell_id, self.refresh)
    }

    fn clear(&self) -> Result<BTreeSet<String>, RegistryError> {
        let mut removed = BTreeSet::new();
        loop {
            // Always the first page: the previous batch is gone by now.
            let (_, hits) = self.id_page(None)?;
            let fetched = hits.hits.len();
            for hit in hits.hits {
                if self.index.delete(&hit.id, self.refresh)? {
                    removed.insert(hit.id);
                }
            }
            if fetched < CLEAR_BATCH_SIZE as usize {
                break;
            }
        }
        info!(count = removed.len(), "cleared document store");
        Ok(removed)
    }

    fn contains_submodel(&self, shell_id: &str, submodel_id: &str) -> Result<bool, RegistryError> {
        match self.load(shell_id) {
            Ok(shell) => Ok(shell.submodel(submodel_id).is_some()),
            Err(RegistryError::ShellNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn get_all_submodels(&self, shell_id: &str) -> Result<Vec<SubmodelDescriptor>, RegistryError> {
        Ok(self.load(shell_id)?.submodel_descriptors)
    }

    fn get_submodel(
        &self,
        shell_id: &str,
        submodel_id: &str,
    ) -> Result<SubmodelDescriptor, RegistryError> {
        self.load(shell_id)?
            .submodel_descriptors
            .into_iter()
            .find(|sm| sm.id == submodel_id)
            .ok_or_else(|| RegistryError::submodel_not_found(shell_id, submodel_id))
    }

    fn append_or_replace_submodel(
        &self,
        shell_id: &str,
        submodel: SubmodelDescriptor,
    ) -> Result<(), RegistryError> {
        let submodel: Value = serde_json::to_value(&submodel)?;
        self.run_script(shell_id, UpdateScript::AppendOrReplaceSubmodel { submodel })?;
        debug!(shell_id, "appended or replaced submodel");
        Ok(())
    }

    fn remove_submodel(&self, shell_id: &str, submodel_id: &str) -> Result<bool, RegistryError> {
        let script = UpdateScript::RemoveSubmodel {
            submodel_id: submodel_id.to_string(),
        };
        Ok(self.run_script(shell_id, script)? == UpdateOutcome::Updated)
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, RegistryError> {
        let compiled = compile(request)?;
        let hits = self.index.search(&compiled.body)?;
        collect(&compiled, hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::MAX_RESULT_WINDOW;

    fn shell(id: &str) -> ShellDescriptor {
        ShellDescriptor::new(id, format!("short-{id}"))
    }

    /// Rejects windows reaching past the first `MAX_RESULT_WINDOW` hits, the
    /// way a search server's `index.max_result_window` does.
    struct WindowLimited(EmbeddedIndex);

    impl DocumentIndex for WindowLimited {
        fn get(&self, id: &str) -> Result<Option<Value>, RegistryError> {
            self.0.get(id)
        }

        fn index(&self, id: &str, document: &Value, refresh: Refresh) -> Result<(), RegistryError> {
            self.0.index(id, document, refresh)
        }

        fn delete(&self, id: &str, refresh: Refresh) -> Result<bool, RegistryError> {
            self.0.delete(id, refresh)
        }

        fn update(
            &self,
            id: &str,
            update: &ScriptedUpdate,
        ) -> Result<UpdateOutcome, RegistryError> {
            self.0.update(id, update)
        }

        fn search(&self, body: &Value) -> Result<SearchHits, RegistryError> {
            let from = body["from"].as_u64().unwrap_or(0);
            let size = body["size"].as_u64().unwrap_or(10);
            if from + size > u64::from(MAX_RESULT_WINDOW) {
                return Err(RegistryError::Backend {
                    status: 400,
                    body: "Result window is too large".into(),
                });
            }
            self.0.search(body)
        }
    }

    #[test]
    fn test_get_all_shells_beyond_result_window() {
        let store = DocumentStore::new(WindowLimited(EmbeddedIndex::new()));
        let count = MAX_RESULT_WINDOW + 1;
        for i in 0..count {
            store.add_or_replace(shell(&format!("urn:shell:{i:05}"))).unwrap();
        }
        let shells = store.get_all_shells().unwrap();
        assert_eq!(shells.len(), count as usize);
        assert_eq!(shells[0].id, "urn:shell:00000");
        assert_eq!(shells[count as usize - 1].id, "urn:shell:10000");
        assert!(shells.windows(2).all(|pair| pair[0].id < pair[1].id));
    }

    #[test]
    fn test_get_all_shells_sees_each_survivor_once_across_deletes() {
        let store = DocumentStore::embedded();
        for i in 0..(CLEAR_BATCH_SIZE * 2) {
            store.add_or_replace(shell(&format!("id_{i:03}"))).unwrap();
        }
        // Drop the first page between scans: a cursor keeps its place where
        // an offset would slide past shells of the second page.
        let (_, first) = store.id_page(None).unwrap();
        for hit in &first.hits {
            assert!(store.remove(&hit.id).unwrap());
        }
        let (_, second) = store.id_page(next_cursor(&first).unwrap()).unwrap();
        assert_eq!(second.hits.len(), CLEAR_BATCH_SIZE as usize);
        assert_eq!(second.hits[0].id, format!("id_{CLEAR_BATCH_SIZE:03}"));
    }

    #[test]
    fn test_unsorted_hits_cannot_continue_scan() {
        let hits = SearchHits {
            total: 1,
            hits: vec![crate::query::Hit {
                id: "s1".into(),
                source: Value::Null,
                inner_hits: Default::default(),
                sort: Vec::new(),
            }],
        };
        assert!(matches!(next_cursor(&hits), Err(RegistryError::Backend { .. })));
        assert_eq!(next_cursor(&SearchHits::default()).unwrap(), None);
    }

    #[test]
    fn test_wait_for_refresh_keeps_writes_searchable() {
        let store = DocumentStore::embedded().with_refresh(Refresh::WaitFor);
        store
            .add_or_replace(shell("s1").with_submodel(SubmodelDescriptor::new("a", "a")))
            .unwrap();
        store
            .append_or_replace_submodel("s1", SubmodelDescriptor::new("b", "b"))
            .unwrap();
        let response = store.search(&SearchRequest::matching("idShort", "short-s1")).unwrap();
        assert_eq!(response.hits[0].submodel_ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_get_all_shells_pages_past_batch_size() {
        let store = DocumentStore::embedded();
        for i in 0..(CLEAR_BATCH_SIZE + 5) {
            store.add_or_replace(shell(&format!("id_{i:03}"))).unwrap();
        }
        assert_eq!(store.get_all_shells().unwrap().len(), 105);
    }

    #[test]
    fn test_clear_spans_several_batches() {
        let store = DocumentStore::embedded();
        for i in 0..250 {
            store.add_or_replace(shell(&format!("id_{i}"))).unwrap();
        }
        let removed = store.clear().unwrap();
        assert_eq!(removed.len(), 250);
        assert!(store.index().is_empty());
        assert!(store.clear().unwrap().is_empty());
    }

    #[test]
    fn test_submodel_script_on_missing_shell() {
        let store = DocumentStore::embedded();
        let err = store
            .append_or_replace_submodel("ghost", SubmodelDescriptor::new("a", "a"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::ShellNotFound(id) if id == "ghost"));
        assert!(store.index().is_empty());

        let err = store.remove_submodel("ghost", "a").unwrap_err();
        assert!(matches!(err, RegistryError::ShellNotFound(_)));
    }

    #[test]
    fn test_remove_submodel_reports_presence() {
        let store = DocumentStore::embedded();
        store
            .add_or_replace(shell("s1").with_submodel(SubmodelDescriptor::new("a", "a")))
            .unwrap();
        assert!(store.remove_submodel("s1", "a").unwrap());
        assert!(!store.remove_submodel("s1", "a").unwrap());
        assert!(store.get_all_submodels("s1").unwrap().is_empty());
    }
}
