//! In-process [`DocumentIndex`] with per-document optimistic concurrency.
//!
//! Every stored document carries a sequence number. A scripted update reads
//! the document and its sequence number, applies the script to a private
//! copy, and writes it back only if the sequence number is unchanged;
//! otherwise it starts over, up to `retry_on_conflict` times. Writers of
//! different documents never wait on each other.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::document::index::{DocumentIndex, Refresh, ScriptEffect, ScriptedUpdate, UpdateOutcome};
use crate::error::RegistryError;
use crate::eval::evaluate;
use crate::query::SearchHits;

enum Swap {
    Done,
    Conflict,
    Missing,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    seq_no: u64,
    source: Value,
}

/// Embedded document index backed by a concurrent map.
#[derive(Debug, Default)]
pub struct EmbeddedIndex {
    documents: DashMap<String, StoredDocument>,
    next_seq_no: AtomicU64,
}

impl EmbeddedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Sequence number of the current version of a document.
    pub fn seq_no(&self, id: &str) -> Option<u64> {
        self.documents.get(id).map(|doc| doc.seq_no)
    }

    fn next_seq_no(&self) -> u64 {
        self.next_seq_no.fetch_add(1, Ordering::Relaxed)
    }

    /// Replaces the document only if it is still at `expected` version.
    fn compare_and_swap(&self, id: &str, expected: u64, source: Value) -> Swap {
        let Some(mut current) = self.documents.get_mut(id) else {
            return Swap::Missing;
        };
        if current.seq_no != expected {
            return Swap::Conflict;
        }
        current.seq_no = self.next_seq_no();
        current.source = source;
        Swap::Done
    }
}

impl DocumentIndex for EmbeddedIndex {
    fn get(&self, id: &str) -> Result<Option<Value>, RegistryError> {
        Ok(self.documents.get(id).map(|doc| doc.source.clone()))
    }

    fn index(&self, id: &str, document: &Value, _refresh: Refresh) -> Result<(), RegistryError> {
        let stored = StoredDocument {
            seq_no: self.next_seq_no(),
            source: document.clone(),
        };
        self.documents.insert(id.to_string(), stored);
        Ok(())
    }

    fn delete(&self, id: &str, _refresh: Refresh) -> Result<bool, RegistryError> {
        Ok(self.documents.remove(id).is_some())
    }

    fn update(&self, id: &str, update: &ScriptedUpdate) -> Result<UpdateOutcome, RegistryError> {
        let mut conflicts: u32 = 0;
        loop {
            let snapshot = self
                .documents
                .get(id)
                .map(|doc| (doc.seq_no, doc.source.clone()));
            let Some((seq_no, mut source)) = snapshot else {
                return Ok(UpdateOutcome::Missing);
            };

            if update.script.apply(&mut source)? == ScriptEffect::Noop {
                return Ok(UpdateOutcome::Noop);
            }

            match self.compare_and_swap(id, seq_no, source) {
                Swap::Done => return Ok(UpdateOutcome::Updated),
                Swap::Missing => return Ok(UpdateOutcome::Missing),
                Swap::Conflict => {
                    if conflicts >= update.retry_on_conflict {
                        warn!(id, conflicts, "giving up scripted update after version conflicts");
                        return Err(RegistryError::VersionConflict(id.to_string()));
                    }
                    conflicts += 1;
                    debug!(id, seq_no, conflicts, "version conflict, retrying scripted update");
                }
            }
        }
    }

    fn search(&self, body: &Value) -> Result<SearchHits, RegistryError> {
        let snapshot: Vec<(String, Value)> = self
            .documents
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().source.clone()))
            .collect();
        evaluate(body, snapshot.iter().map(|(id, doc)| (id.as_str(), doc)))
    }
}
