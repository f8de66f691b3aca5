//! # In-Memory Data Store
//!
//! Thread-safe in-memory implementation of [`DataStore`] for tests, local
//! development and deployments without a configured datastore.
//!
//! Upserts merge columns into the existing row the same way PostgREST's
//! `resolution=merge-duplicates` does, and new rows receive a generated
//! `id` so customer linking behaves like it does against Postgres.

use crate::store::{DataStore, Record, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};
use uuid::Uuid;

/// Thread-safe in-memory table store
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<HashMap<String, Vec<Record>>>>,
    failing: Arc<RwLock<HashSet<String>>>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable {
        message: "in-memory store lock poisoned".to_string(),
    }
}

fn matches(row: &Record, column: &str, value: &Value) -> bool {
    row.get(column).map(|v| v == value).unwrap_or(false)
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row in `table`, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .map(|tables| tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    /// Make every subsequent operation on `table` fail as unavailable
    pub fn fail_table(&self, table: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(table.to_string());
        }
    }

    /// Undo [`InMemoryStore::fail_table`]
    pub fn restore_table(&self, table: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.remove(table);
        }
    }

    fn check_available(&self, table: &str) -> Result<(), StoreError> {
        let failing = self.failing.read().map_err(poisoned)?;
        if failing.contains(table) {
            return Err(StoreError::Unavailable {
                message: format!("table '{}' is marked as failing", table),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for InMemoryStore {
    async fn upsert(
        &self,
        table: &str,
        record: Record,
        conflict_key: &str,
    ) -> Result<Record, StoreError> {
        self.check_available(table)?;

        let key_value = match record.get(conflict_key) {
            Some(value) if !value.is_null() => value.clone(),
            _ => {
                return Err(StoreError::Status {
                    status: 400,
                    message: format!("missing value for conflict column '{}'", conflict_key),
                })
            }
        };

        let mut tables = self.tables.write().map_err(poisoned)?;
        let rows = tables.entry(table.to_string()).or_default();

        if let Some(existing) = rows
            .iter_mut()
            .find(|row| matches(row, conflict_key, &key_value))
        {
            for (column, value) in record {
                existing.insert(column, value);
            }
            return Ok(existing.clone());
        }

        let mut row = record;
        row.entry("id".to_string())
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        key_column: &str,
        key_value: &Value,
        patch: Record,
    ) -> Result<Vec<Record>, StoreError> {
        self.check_available(table)?;

        let mut tables = self.tables.write().map_err(poisoned)?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for row in rows
            .iter_mut()
            .filter(|row| matches(row, key_column, key_value))
        {
            for (column, value) in &patch {
                row.insert(column.clone(), value.clone());
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn insert(&self, table: &str, record: Record) -> Result<(), StoreError> {
        self.check_available(table)?;

        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.entry(table.to_string()).or_default().push(record);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.tables.read().map(|_| ()).map_err(poisoned)
    }
}

#[cfg(test)]
#[path = "memory_store_tests.rs"]
mod tests;
