// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use async_stream::try_stream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::*;
use crate::binder::{BindError, BoundSelect};
use crate::storage::SourceStore;

/// Executes an aggregate query in one pass over the source table.
///
/// The result is a single batch with progress `1.0` and no partition.
pub struct OnePassExecutor {
    source: Arc<SourceStore>,
    select: BoundSelect,
    shaper: OutputShaper,
}

impl OnePassExecutor {
    pub fn new(source: Arc<SourceStore>, select: BoundSelect) -> Result<Self, BindError> {
        let shaper = OutputShaper::for_select(&select)?;
        Ok(OnePassExecutor {
            source,
            select,
            shaper,
        })
    }

    pub fn execute(self) -> ResultStream {
        let schema = schema(&self.select.output_names, &self.select.output_types());
        let inner = try_stream! {
            let table = self.select.table.name();
            let rows = self.source.scan(table).await?;
            let mut state = PartialAggregateState::new(
                self.select.aggs.clone(),
                self.select.group_keys.clone(),
            );
            state.absorb(filter_rows(self.select.filter.as_ref(), &rows)?)?;
            debug!(table, rows = rows.len(), groups = state.group_count(), "one-pass query");
            let token = ProgressToken::new(None, 1.0);
            let rows = self.shaper.rows(state.snapshot(), &token)?;
            yield Batch { rows, token };
        };
        ResultStream::new(schema, inner.boxed(), CancellationToken::new())
    }
}
