// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Progressive views.
//!
//! A view keeps refining its aggregate state as chunks are absorbed, and
//! can be read at any time with `SELECT PROGRESSIVE * FROM v WITH FUTURE`.
//! Views are owned by the [`ViewManager`], an arena indexed by name.
//! Each view has its own locks: reads share the state, advances are
//! exclusive and queued.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use itertools::Itertools;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::binder::{view_name, Binder};
use crate::catalog::{check_name, RootCatalogRef};
use crate::chunk::ChunkStoreRef;
use crate::executor::{once, schema, ResultStream};
use crate::parser::{parse_query, FutureMarkers, Query};
use crate::storage::{get_json, put_json, BackendRef};

mod error;
mod progressive;

pub use self::error::*;
pub use self::progressive::*;

pub type ViewManagerRef = Arc<ViewManager>;

/// Owns every progressive view.
pub struct ViewManager {
    catalog: RootCatalogRef,
    chunks: ChunkStoreRef,
    meta: BackendRef,
    views: RwLock<HashMap<String, Arc<ProgressiveView>>>,
    /// Serializes `CREATE` and `DROP`.
    ddl_lock: Mutex<()>,
    /// Chunks absorbed before serving a `WITH FUTURE` read.
    advance_chunks: usize,
}

impl ViewManager {
    pub fn new(
        catalog: RootCatalogRef,
        chunks: ChunkStoreRef,
        meta: BackendRef,
        advance_chunks: usize,
    ) -> Self {
        ViewManager {
            catalog,
            chunks,
            meta,
            views: RwLock::new(HashMap::new()),
            ddl_lock: Mutex::new(()),
            advance_chunks,
        }
    }

    fn binder(&self) -> Binder {
        Binder::new(self.catalog.clone(), self.chunks.clone())
    }

    /// Reload the persisted view definitions. Their states restart from chunk 0.
    ///
    /// A definition that no longer binds is skipped.
    pub async fn load(&self) -> ViewResult<usize> {
        let mut loaded = 0;
        for name in self.meta.list("views").await? {
            let key = format!("views/{name}");
            let Some(definition) = get_json::<ViewDefinition>(&*self.meta, &key).await? else {
                continue;
            };
            let bound = parse_query(&definition.query)
                .map_err(ViewError::from)
                .and_then(|query| Ok(self.binder().bind_view(&query, &definition.futures)?));
            match bound {
                Ok(bound) => {
                    let view = Arc::new(ProgressiveView::new(definition, bound));
                    self.views.write().insert(name, view);
                    loaded += 1;
                }
                Err(e) => warn!(view = %name, error = %e, "failed to reload progressive view"),
            }
        }
        Ok(loaded)
    }

    /// Create a view with an empty state.
    pub async fn create_view(
        &self,
        name: &str,
        query: &Query,
        futures: &FutureMarkers,
    ) -> ViewResult<Arc<ProgressiveView>> {
        let _guard = self.ddl_lock.lock().await;
        if self.views.read().contains_key(name) {
            return Err(ViewError::Exists(name.into()));
        }
        check_name(name)?;
        let bound = self.binder().bind_view(query, futures)?;
        let definition = ViewDefinition {
            name: name.into(),
            query: query.to_string(),
            futures: futures.clone(),
            created_at: Utc::now(),
        };
        put_json(&*self.meta, &format!("views/{name}"), &definition).await?;
        info!(
            view = name,
            table = bound.select.table.name(),
            future_terms = bound.future_terms.len(),
            "progressive view created"
        );
        let view = Arc::new(ProgressiveView::new(definition, bound));
        self.views.write().insert(name.into(), view.clone());
        Ok(view)
    }

    pub fn get(&self, name: &str) -> ViewResult<Arc<ProgressiveView>> {
        self.views
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ViewError::NotFound(name.into()))
    }

    /// Names of all views, sorted.
    pub fn view_names(&self) -> Vec<String> {
        self.views.read().keys().cloned().sorted().collect()
    }

    /// Absorb up to `n` more chunks into the view. Queues behind an advance in flight.
    pub async fn advance(&self, name: &str, n: usize) -> ViewResult<usize> {
        self.get(name)?.advance(&self.chunks, n).await
    }

    /// Absorb up to `n` more chunks, or fail if the view is being advanced.
    pub async fn try_advance(&self, name: &str, n: usize) -> ViewResult<usize> {
        self.get(name)?.try_advance(&self.chunks, n).await
    }

    /// Read the current state of a view without advancing it.
    pub async fn query(&self, query: &Query) -> ViewResult<crate::executor::Batch> {
        let view = self.get(&view_name(query)?)?;
        let read = self.binder().bind_view_read(view.bound(), query)?;
        view.query(&self.chunks, &read).await
    }

    /// Serve `SELECT PROGRESSIVE * FROM v WITH FUTURE ...`: advance the view, then read it.
    pub async fn read(&self, query: &Query) -> ViewResult<ResultStream> {
        let view = self.get(&view_name(query)?)?;
        let read = self.binder().bind_view_read(view.bound(), query)?;
        view.advance(&self.chunks, self.advance_chunks).await?;
        let batch = view.query(&self.chunks, &read).await?;
        Ok(once(schema(&read.output_names, &read.output_types()), batch))
    }

    /// Remove a view and its persisted definition.
    ///
    /// Returns false if the view does not exist and `if_exists` is set.
    pub async fn drop_view(&self, name: &str, if_exists: bool) -> ViewResult<bool> {
        let _guard = self.ddl_lock.lock().await;
        if self.views.write().remove(name).is_none() {
            if if_exists {
                return Ok(false);
            }
            return Err(ViewError::NotFound(name.into()));
        }
        self.meta.delete(&format!("views/{name}")).await?;
        info!(view = name, "progressive view dropped");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnCatalog, ColumnDesc, RootCatalog, TableCatalog};
    use crate::chunk::{ChunkStore, ChunkStoreOptions};
    use crate::parser::{parse, Statement};
    use crate::storage::{MemoryBackend, SourceStore};
    use crate::types::{DataType, DataValue, Row};

    /// `t(a INT, b VARCHAR)` with 4 chunks of 2 rows.
    async fn manager(meta: BackendRef) -> ViewManager {
        let source = Arc::new(SourceStore::new(Arc::new(MemoryBackend::new())));
        let table = TableCatalog::new(
            "t",
            vec![
                ColumnCatalog::new(0, "a", ColumnDesc::new(DataType::Int, true)),
                ColumnCatalog::new(1, "b", ColumnDesc::new(DataType::Varchar(None), true)),
            ],
        )
        .unwrap();
        source.create_table(&table).await.unwrap();
        let rows: Vec<Row> = [(1, "a"), (2, "b"), (3, "a"), (4, "b"), (5, "c"), (6, "b"), (7, "a"), (8, "c")]
            .iter()
            .map(|(a, b)| vec![DataValue::from(*a), DataValue::from(*b)])
            .collect();
        source.append("t", &rows).await.unwrap();
        let chunks = ChunkStore::open(
            source,
            meta.clone(),
            Arc::new(MemoryBackend::new()),
            ChunkStoreOptions {
                chunk_size: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        chunks.prepare_table(&table).await.unwrap();
        let catalog = Arc::new(RootCatalog::new());
        catalog.add_table(table).unwrap();
        ViewManager::new(catalog, Arc::new(chunks), meta, 1)
    }

    async fn create(manager: &ViewManager, sql: &str) -> Arc<ProgressiveView> {
        let Statement::CreateProgressiveView {
            name,
            query,
            futures,
        } = parse(sql).unwrap().remove(0)
        else {
            panic!("expect a view definition");
        };
        manager.create_view(&name, &query, &futures).await.unwrap()
    }

    fn read_query(sql: &str) -> Box<Query> {
        let Statement::SelectView(query) = parse(sql).unwrap().remove(0) else {
            panic!("expect a view read");
        };
        query
    }

    const PV: &str = "CREATE PROGRESSIVE VIEW pv AS SELECT SUM(a), COUNT(*), b FUTURE FROM t \
                      WHERE (b = 'a') FUTURE OR (b = 'b') FUTURE GROUP BY b FUTURE";

    #[tokio::test]
    async fn advance_and_query() {
        let manager = manager(Arc::new(MemoryBackend::new())).await;
        create(&manager, PV).await;
        let only_b = read_query("SELECT PROGRESSIVE * FROM pv WITH FUTURE WHERE b = 'b'");

        // nothing absorbed yet
        let batch = manager.query(&only_b).await.unwrap();
        assert_eq!(batch.token.partition, None);
        assert_eq!(batch.token.progress, 0.0);
        let expected: Vec<Row> = vec![vec![DataValue::Null, 0.into()]];
        assert_eq!(batch.rows, expected);

        assert_eq!(manager.advance("pv", 2).await.unwrap(), 2);
        let batch = manager.query(&only_b).await.unwrap();
        assert_eq!(batch.token.partition, Some(1));
        let expected: Vec<Row> = vec![vec![6.into(), 2.into()]];
        assert_eq!(batch.rows, expected);

        // rows of 'c' never pass the fixed WHERE condition
        assert_eq!(manager.advance("pv", 10).await.unwrap(), 2);
        assert_eq!(manager.advance("pv", 1).await.unwrap(), 0);
        let grouped = read_query("SELECT PROGRESSIVE * FROM pv WITH FUTURE GROUP BY b");
        let batch = manager.query(&grouped).await.unwrap();
        assert_eq!(batch.token.progress, 1.0);
        let expected: Vec<Row> = vec![
            vec![11.into(), 3.into(), "a".into()],
            vec![12.into(), 3.into(), "b".into()],
        ];
        assert_eq!(batch.rows, expected);

        let all = read_query("SELECT PROGRESSIVE * FROM pv WITH FUTURE");
        let batch = manager.query(&all).await.unwrap();
        let expected: Vec<Row> = vec![vec![23.into(), 6.into()]];
        assert_eq!(batch.rows, expected);
    }

    #[tokio::test]
    async fn read_advances() {
        let manager = manager(Arc::new(MemoryBackend::new())).await;
        let view = create(&manager, PV).await;
        let query = read_query("SELECT PROGRESSIVE * FROM pv WITH FUTURE WHERE b = 'b'");
        let mut previous = 0;
        for i in 1..=4 {
            let mut stream = manager.read(&query).await.unwrap();
            let batch = stream.next_batch().await.unwrap().unwrap();
            assert_eq!(view.cursor().await, i);
            let count = match batch.rows[0][1] {
                DataValue::Int64(n) => n,
                ref v => panic!("unexpected count {v}"),
            };
            assert!(count >= previous);
            previous = count;
        }
        assert_eq!(previous, 3);
    }

    #[tokio::test]
    async fn concurrent_advance() {
        let manager = Arc::new(manager(Arc::new(MemoryBackend::new())).await);
        let view = create(&manager, PV).await;
        let guard = view.advance_lock.lock().await;
        assert!(matches!(
            manager.try_advance("pv", 1).await,
            Err(ViewError::ConcurrentAdvance(_))
        ));
        // a queued advance waits for the one in flight
        let queued = tokio::spawn({
            let manager = manager.clone();
            async move { manager.advance("pv", 1).await.unwrap() }
        });
        tokio::task::yield_now().await;
        assert_eq!(view.cursor().await, 0);
        drop(guard);
        assert_eq!(queued.await.unwrap(), 1);
        assert_eq!(view.cursor().await, 1);
    }

    #[tokio::test]
    async fn drop_and_reload() {
        let meta: BackendRef = Arc::new(MemoryBackend::new());
        let manager = manager(meta.clone()).await;
        create(&manager, PV).await;
        manager.advance("pv", 3).await.unwrap();

        let (query, futures) = match parse(PV).unwrap().remove(0) {
            Statement::CreateProgressiveView { query, futures, .. } => (query, futures),
            _ => unreachable!(),
        };
        assert!(matches!(
            manager.create_view("pv", &query, &futures).await,
            Err(ViewError::Exists(_))
        ));

        // a restarted manager reloads the definition with a fresh state
        let reloaded = ViewManager::new(
            manager.catalog.clone(),
            manager.chunks.clone(),
            meta.clone(),
            1,
        );
        assert_eq!(reloaded.load().await.unwrap(), 1);
        let view = reloaded.get("pv").unwrap();
        assert_eq!(view.cursor().await, 0);
        assert_eq!(view.definition().futures, futures);

        assert!(manager.drop_view("pv", false).await.unwrap());
        assert!(!manager.drop_view("pv", true).await.unwrap());
        assert!(matches!(
            manager.drop_view("pv", false).await,
            Err(ViewError::NotFound(_))
        ));
        assert!(matches!(manager.get("pv"), Err(ViewError::NotFound(_))));
        let restarted = ViewManager::new(manager.catalog.clone(), manager.chunks.clone(), meta, 1);
        assert_eq!(restarted.load().await.unwrap(), 0);
    }
}
