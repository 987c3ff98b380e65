//! SQLite implementation of [`ShellRegistry`].
//!
//! [`SqliteStore`] keeps each shell as one JSON row. Submodel writes run as
//! read-modify-write inside an `IMMEDIATE` transaction, so the write lock is
//! taken before the row is read and concurrent writers to the same file
//! serialize instead of overwriting each other. Searches load the rows and
//! evaluate the compiled query in process.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use tracing::{debug, info};

use twinreg_core::{SearchRequest, SearchResponse, ShellDescriptor, SubmodelDescriptor};

use crate::document::index::{ScriptEffect, UpdateScript};
use crate::error::RegistryError;
use crate::eval::evaluate;
use crate::query::{collect, compile};
use crate::traits::ShellRegistry;

/// SQLite-backed shell registry.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a database file at `path`.
    pub fn new(path: &str) -> Result<Self, RegistryError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> Result<Self, RegistryError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(conn: &Connection, shell_id: &str) -> Result<Option<ShellDescriptor>, RegistryError> {
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM shell_descriptors WHERE id = ?1",
                params![shell_id],
                |row| row.get(0),
            )
            .optional()?;
        match document {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn require(conn: &Connection, shell_id: &str) -> Result<ShellDescriptor, RegistryError> {
        Self::load(conn, shell_id)?
            .ok_or_else(|| RegistryError::ShellNotFound(shell_id.to_string()))
    }

    /// Applies a submodel script to one row under the write lock.
    fn run_script(
        &self,
        shell_id: &str,
        script: &UpdateScript,
    ) -> Result<ScriptEffect, RegistryError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let document: Option<String> = tx
            .query_row(
                "SELECT document FROM shell_descriptors WHERE id = ?1",
                params![shell_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(document) = document else {
            return Err(RegistryError::ShellNotFound(shell_id.to_string()));
        };

        let mut document: Value = serde_json::from_str(&document)?;
        let effect = script.apply(&mut document)?;
        if effect == ScriptEffect::Modified {
            tx.execute(
                "UPDATE shell_descriptors SET document = ?2 WHERE id = ?1",
                params![shell_id, serde_json::to_string(&document)?],
            )?;
        }
        tx.commit()?;
        Ok(effect)
    }

    fn all_rows(conn: &Connection) -> Result<Vec<(String, String)>, RegistryError> {
        let mut stmt = conn.prepare("SELECT id, document FROM shell_descriptors ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl ShellRegistry for SqliteStore {
    fn get_shell(&self, shell_id: &str) -> Result<ShellDescriptor, RegistryError> {
        Self::require(&self.conn(), shell_id)
    }

    fn get_all_shells(&self) -> Result<Vec<ShellDescriptor>, RegistryError> {
        let rows = Self::all_rows(&self.conn())?;
        rows.iter()
            .map(|(_, json)| serde_json::from_str(json).map_err(RegistryError::from))
            .collect()
    }

    fn add_or_replace(&self, descriptor: ShellDescriptor) -> Result<(), RegistryError> {
        if let Some(dup) = descriptor.find_duplicate_submodel_id() {
            return Err(RegistryError::DuplicateSubmodelId(dup.to_string()));
        }
        let json = serde_json::to_string(&descriptor)?;
        self.conn().execute(
            "INSERT INTO shell_descriptors (id, document) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET document = excluded.document",
            params![descriptor.id, json],
        )?;
        debug!(shell_id = %descriptor.id, "stored shell row");
        Ok(())
    }

    fn remove(&self, shell_id: &str) -> Result<bool, RegistryError> {
        let deleted = self
            .conn()
            .execute("DELETE FROM shell_descriptors WHERE id = ?1", params![shell_id])?;
        Ok(deleted > 0)
    }

    fn clear(&self) -> Result<BTreeSet<String>, RegistryError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = {
            let mut stmt = tx.prepare("DELETE FROM shell_descriptors RETURNING id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<BTreeSet<_>, _>>()?;
            ids
        };
        tx.commit()?;
        info!(count = removed.len(), "cleared sqlite store");
        Ok(removed)
    }

    fn contains_submodel(&self, shell_id: &str, submodel_id: &str) -> Result<bool, RegistryError> {
        Ok(Self::load(&self.conn(), shell_id)?
            .is_some_and(|shell| shell.submodel(submodel_id).is_some()))
    }

    fn get_all_submodels(&self, shell_id: &str) -> Result<Vec<SubmodelDescriptor>, RegistryError> {
        Ok(Self::require(&self.conn(), shell_id)?.submodel_descriptors)
    }

    fn get_submodel(
        &self,
        shell_id: &str,
        submodel_id: &str,
    ) -> Result<SubmodelDescriptor, RegistryError> {
        Self::require(&self.conn(), shell_id)?
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
        let script = UpdateScript::AppendOrReplaceSubmodel {
            submodel: serde_json::to_value(&submodel)?,
        };
        self.run_script(shell_id, &script)?;
        Ok(())
    }

    fn remove_submodel(&self, shell_id: &str, submodel_id: &str) -> Result<bool, RegistryError> {
        let script = UpdateScript::RemoveSubmodel {
            submodel_id: submodel_id.to_string(),
        };
        Ok(self.run_script(shell_id, &script)? == ScriptEffect::Modified)
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, RegistryError> {
        let compiled = compile(request)?;
        let rows = Self::all_rows(&self.conn())?;
        let mut documents = Vec::with_capacity(rows.len());
        for (id, json) in rows {
            documents.push((id, serde_json::from_str::<Value>(&json)?));
        }
        let hits = evaluate(
            &compiled.body,
            documents.iter().map(|(id, doc)| (id.as_str(), doc)),
        )?;
        collect(&compiled, hits)
    }
}
