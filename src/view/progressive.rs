// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::*;
use crate::binder::{BoundView, BoundViewRead};
use crate::chunk::ChunkStore;
use crate::executor::{filter_rows, Batch, OutputShaper, PartialAggregateState, ProgressToken};
use crate::parser::FutureMarkers;
use crate::progress::progress;

/// The persisted definition of a view, stored in `meta` under `views/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub name: String,
    /// The defining query, without the `FUTURE` markers.
    pub query: String,
    pub futures: FutureMarkers,
    pub created_at: DateTime<Utc>,
}

/// A progressive view: a live aggregate state over the chunks absorbed so far.
pub struct ProgressiveView {
    definition: ViewDefinition,
    bound: BoundView,
    state: RwLock<ViewState>,
    /// Held for the whole of an advance.
    pub(super) advance_lock: Mutex<()>,
}

struct ViewState {
    aggregate: PartialAggregateState,
    /// The next chunk to absorb.
    cursor: usize,
}

impl ProgressiveView {
    pub(super) fn new(definition: ViewDefinition, bound: BoundView) -> Self {
        let aggregate = PartialAggregateState::new(
            bound.select.aggs.clone(),
            bound.select.group_keys.clone(),
        );
        ProgressiveView {
            definition,
            bound,
            state: RwLock::new(ViewState {
                aggregate,
                cursor: 0,
            }),
            advance_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &ViewDefinition {
        &self.definition
    }

    pub fn bound(&self) -> &BoundView {
        &self.bound
    }

    fn table(&self) -> &str {
        self.bound.select.table.name()
    }

    /// Number of chunks absorbed.
    pub async fn cursor(&self) -> usize {
        self.state.read().await.cursor
    }

    /// Absorb up to `n` more chunks, waiting for any advance in flight.
    ///
    /// Returns the number of chunks absorbed.
    pub async fn advance(&self, chunks: &ChunkStore, n: usize) -> ViewResult<usize> {
        let _guard = self.advance_lock.lock().await;
        self.advance_locked(chunks, n).await
    }

    /// Like [`advance`](Self::advance), but fails if another advance is in flight.
    pub async fn try_advance(&self, chunks: &ChunkStore, n: usize) -> ViewResult<usize> {
        let Ok(_guard) = self.advance_lock.try_lock() else {
            return Err(ViewError::ConcurrentAdvance(self.name().into()));
        };
        self.advance_locked(chunks, n).await
    }

    async fn advance_locked(&self, chunks: &ChunkStore, n: usize) -> ViewResult<usize> {
        let count = chunks.chunk_count(self.table())?;
        let mut advanced = 0;
        while advanced < n {
            let (index, mut delta) = {
                let state = self.state.read().await;
                (state.cursor, state.aggregate.empty())
            };
            if index >= count {
                break;
            }
            // a chunk becomes visible only when all of it is absorbed
            let chunk = chunks.read_chunk(self.table(), index).await?;
            delta.absorb(filter_rows(self.bound.select.filter.as_ref(), &chunk)?)?;

            let mut state = self.state.write().await;
            state.aggregate.merge(&delta)?;
            state.cursor = index + 1;
            advanced += 1;
            debug!(
                view = self.name(),
                index,
                groups = state.aggregate.group_count(),
                "chunk absorbed"
            );
        }
        Ok(advanced)
    }

    /// Read the current state with a bound read.
    pub async fn query(&self, chunks: &ChunkStore, read: &BoundViewRead) -> ViewResult<Batch> {
        let count = chunks.chunk_count(self.table())?;
        let state = self.state.read().await;
        let result = state
            .aggregate
            .regroup(read.filter.as_ref(), &read.active)?;
        let progress = progress(state.cursor, count);
        let token = match state.cursor.checked_sub(1) {
            Some(index) => ProgressToken::for_chunk(index, progress)?,
            None => ProgressToken::new(None, progress),
        };
        drop(state);

        let rows = OutputShaper::new(read.outputs.clone()).rows(result.snapshot(), &token)?;
        Ok(Batch { rows, token })
    }
}

impl std::fmt::Debug for ProgressiveView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressiveView")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}
