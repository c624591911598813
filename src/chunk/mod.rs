// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Chunk store.
//!
//! `PREPARE TABLE` splits a base table into ordered, contiguous chunks once.
//! The rows of each chunk are spilled to the `tmp` store under
//! `chunks/<table>/<index>`, and the [`ChunkLayout`] is persisted to the
//! `meta` store under `prepared/<table>`. Prepared chunks are never mutated,
//! so reads are idempotent and can be cached.

use std::collections::HashMap;
use std::sync::Arc;

use moka::future::Cache;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::catalog::TableCatalog;
use crate::storage::{get_json, put_json, BackendRef, SourceStore, StorageError};
use crate::types::Row;

mod layout;

pub use self::layout::*;

/// The rows of one chunk.
pub type Chunk = Arc<Vec<Row>>;

pub type ChunkStoreRef = Arc<ChunkStore>;

/// The error type of chunk store operations.
#[derive(thiserror::Error, Debug)]
pub enum ChunkError {
    #[error("table {0:?} not found or not prepared")]
    NotFound(String),
    #[error("chunk {index} of table {table:?} out of range: the table has {count} chunks")]
    OutOfRange {
        table: String,
        index: usize,
        count: usize,
    },
    #[error("failed to read chunk {index} of table {table:?}: {reason}")]
    ChunkRead {
        table: String,
        index: usize,
        reason: String,
    },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ChunkResult<T> = std::result::Result<T, ChunkError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChunkCacheKey {
    table: String,
    index: usize,
}

/// Options of the chunk store.
#[derive(Debug, Clone)]
pub struct ChunkStoreOptions {
    /// Rows per chunk. `None` for the default partitioning.
    pub chunk_size: Option<usize>,
    /// Maximum number of chunks kept in memory.
    pub cache_capacity: u64,
}

impl Default for ChunkStoreOptions {
    fn default() -> Self {
        ChunkStoreOptions {
            chunk_size: None,
            cache_capacity: 1024,
        }
    }
}

pub struct ChunkStore {
    source: Arc<SourceStore>,
    meta: BackendRef,
    tmp: BackendRef,
    options: ChunkStoreOptions,
    layouts: RwLock<HashMap<String, Arc<ChunkLayout>>>,
    /// Serializes `prepare_table`.
    prepare_lock: Mutex<()>,
    cache: Cache<ChunkCacheKey, Chunk>,
}

impl ChunkStore {
    /// Open the chunk store and load the layouts of prepared tables.
    pub async fn open(
        source: Arc<SourceStore>,
        meta: BackendRef,
        tmp: BackendRef,
        options: ChunkStoreOptions,
    ) -> ChunkResult<Self> {
        let mut layouts = HashMap::new();
        for name in meta.list("prepared").await? {
            let key = format!("prepared/{name}");
            if let Some(layout) = get_json::<ChunkLayout>(&*meta, &key).await? {
                debug!(table = %layout.table, chunks = layout.chunk_count(), "layout loaded");
                layouts.insert(layout.table.clone(), Arc::new(layout));
            }
        }
        Ok(ChunkStore {
            source,
            meta,
            tmp,
            cache: Cache::new(options.cache_capacity),
            options,
            layouts: RwLock::new(layouts),
            prepare_lock: Mutex::new(()),
        })
    }

    /// Split the table into chunks. Preparing a prepared table returns its
    /// existing layout and leaves the chunks untouched.
    pub async fn prepare_table(&self, table: &TableCatalog) -> ChunkResult<Arc<ChunkLayout>> {
        let _guard = self.prepare_lock.lock().await;
        if let Some(layout) = self.layout(table.name()) {
            debug!(table = table.name(), "table already prepared");
            return Ok(layout);
        }

        let rows = self.source.scan(table.name()).await?;
        let layout = ChunkLayout::new(table.name(), rows.len(), self.options.chunk_size);
        for (index, bound) in layout.boundaries.windows(2).enumerate() {
            let key = chunk_key(table.name(), index);
            put_json(&*self.tmp, &key, &rows[bound[0]..bound[1]]).await?;
        }
        // the layout is written last: a table is prepared once its layout exists
        put_json(&*self.meta, &format!("prepared/{}", table.name()), &layout).await?;

        info!(
            table = table.name(),
            rows = layout.row_count,
            chunks = layout.chunk_count(),
            chunk_rows = layout.chunk_rows,
            "table prepared"
        );
        let layout = Arc::new(layout);
        self.layouts
            .write()
            .insert(table.name().into(), layout.clone());
        Ok(layout)
    }

    pub fn is_prepared(&self, table: &str) -> bool {
        self.layouts.read().contains_key(table)
    }

    pub fn layout(&self, table: &str) -> Option<Arc<ChunkLayout>> {
        self.layouts.read().get(table).cloned()
    }

    pub fn chunk_count(&self, table: &str) -> ChunkResult<usize> {
        self.layout(table)
            .map(|layout| layout.chunk_count())
            .ok_or_else(|| ChunkError::NotFound(table.into()))
    }

    /// Read the rows of a chunk.
    pub async fn read_chunk(&self, table: &str, index: usize) -> ChunkResult<Chunk> {
        let count = self.chunk_count(table)?;
        if index >= count {
            return Err(ChunkError::OutOfRange {
                table: table.into(),
                index,
                count,
            });
        }
        let key = ChunkCacheKey {
            table: table.into(),
            index,
        };
        self.cache
            .try_get_with(key, async {
                let key = chunk_key(table, index);
                let rows: Vec<Row> = get_json(&*self.tmp, &key)
                    .await
                    .map_err(|e| e.to_string())?
                    .ok_or_else(|| format!("{key} is missing in the tmp store"))?;
                debug!(table, index, rows = rows.len(), "chunk loaded");
                Ok::<_, String>(Arc::new(rows))
            })
            .await
            .map_err(|reason| ChunkError::ChunkRead {
                table: table.into(),
                index,
                reason: reason.to_string(),
            })
    }
}

fn chunk_key(table: &str, index: usize) -> String {
    format!("chunks/{table}/{index}")
}
