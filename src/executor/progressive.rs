// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::*;
use crate::binder::{BindError, BoundSelect};
use crate::chunk::ChunkStoreRef;
use crate::progress::progress;

/// Executes a `SELECT PROGRESSIVE` query chunk by chunk.
///
/// Every absorbed chunk produces a batch with the snapshot of all chunks so
/// far. Chunks are read in index order, and only when the next batch is polled.
pub struct ProgressiveExecutor {
    chunks: ChunkStoreRef,
    select: BoundSelect,
    shaper: OutputShaper,
}

impl ProgressiveExecutor {
    pub fn new(chunks: ChunkStoreRef, select: BoundSelect) -> Result<Self, BindError> {
        let shaper = OutputShaper::for_select(&select)?;
        Ok(ProgressiveExecutor {
            chunks,
            select,
            shaper,
        })
    }

    /// Start the query.
    pub fn execute(self) -> ResultStream {
        let schema = schema(&self.select.output_names, &self.select.output_types());
        let cancel = CancellationToken::new();
        let inner = self.execute_inner(cancel.clone()).boxed();
        ResultStream::new(schema, inner, cancel)
    }

    fn execute_inner(self, cancel: CancellationToken) -> impl Stream<Item = Result<Batch>> {
        try_stream! {
            let table = self.select.table.name().to_string();
            let count = self.chunks.chunk_count(&table)?;
            let mut state = PartialAggregateState::new(
                self.select.aggs.clone(),
                self.select.group_keys.clone(),
            );
            debug!(%table, chunks = count, "progressive query started");

            if count == 0 {
                let token = ProgressToken::new(None, progress(0, 0));
                let rows = self.shaper.rows(state.snapshot(), &token)?;
                yield Batch { rows, token };
            }
            for index in 0..count {
                if cancel.is_cancelled() {
                    debug!(%table, index, "progressive query cancelled");
                    break;
                }
                let chunk = self.chunks.read_chunk(&table, index).await?;
                let rows = filter_rows(self.select.filter.as_ref(), &chunk)?;
                state.absorb(rows)?;

                let token = ProgressToken::for_chunk(index, progress(index + 1, count))?;
                let rows = self.shaper.rows(state.snapshot(), &token)?;
                debug!(%table, index, groups = state.group_count(), progress = token.progress, "batch");
                yield Batch { rows, token };
            }
        }
    }
}
