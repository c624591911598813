// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use tokio::sync::Mutex;
use tracing::debug;

use super::*;
use crate::catalog::{check_name, TableCatalog};
use crate::types::Row;

/// Base tables in the `source` store.
///
/// Layout:
/// * `tables/<name>`: the table catalog,
/// * `rows/<name>/<seq>`: one segment of rows per insert, in append order.
pub struct SourceStore {
    backend: BackendRef,
    /// Serializes appends so that segment numbers are unique.
    append_lock: Mutex<()>,
}

impl SourceStore {
    pub fn new(backend: BackendRef) -> Self {
        SourceStore {
            backend,
            append_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &BackendRef {
        &self.backend
    }

    /// Load all table catalogs.
    pub async fn load_tables(&self) -> StorageResult<Vec<TableCatalog>> {
        let mut tables = vec![];
        for name in self.backend.list("tables").await? {
            let key = format!("tables/{name}");
            if let Some(table) = get_json(&*self.backend, &key).await? {
                tables.push(table);
            }
        }
        Ok(tables)
    }

    pub async fn create_table(&self, table: &TableCatalog) -> StorageResult<()> {
        check_name(table.name())?;
        let key = format!("tables/{}", table.name());
        if self.backend.get(&key).await?.is_some() {
            return Err(StorageError::duplicated("table", table.name()));
        }
        put_json(&*self.backend, &key, table).await?;
        debug!(table = table.name(), "table created");
        Ok(())
    }

    /// Append rows to a table as a new segment.
    pub async fn append(&self, table: &str, rows: &[Row]) -> StorageResult<()> {
        check_name(table)?;
        if rows.is_empty() {
            return Ok(());
        }
        let _guard = self.append_lock.lock().await;
        let prefix = format!("rows/{table}");
        let next = self
            .segments(&prefix)
            .await?
            .last()
            .map_or(0, |seq| seq + 1);
        put_json(&*self.backend, &format!("{prefix}/{next:010}"), rows).await?;
        debug!(table, segment = next, rows = rows.len(), "rows appended");
        Ok(())
    }

    /// Read all rows of a table in insertion order.
    pub async fn scan(&self, table: &str) -> StorageResult<Vec<Row>> {
        check_name(table)?;
        let prefix = format!("rows/{table}");
        let mut rows = vec![];
        for seq in self.segments(&prefix).await? {
            let key = format!("{prefix}/{seq:010}");
            let segment: Vec<Row> = get_json(&*self.backend, &key)
                .await?
                .ok_or_else(|| StorageError::not_found("segment", &key))?;
            rows.extend(segment);
        }
        Ok(rows)
    }

    async fn segments(&self, prefix: &str) -> StorageResult<Vec<u64>> {
        let mut seqs: Vec<u64> = self
            .backend
            .list(prefix)
            .await?
            .iter()
            .filter_map(|name| name.parse().ok())
            .collect();
        seqs.sort_unstable();
        Ok(seqs)
    }
}
