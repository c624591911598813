// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! The forward-only cursor over the batches of a query.

use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use parse_display::Display;
use tokio_util::sync::CancellationToken;

use super::{ExecutorError, Result};
use crate::types::{DataType, DataValue, Row};

/// Marks how far a batch has progressed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressToken {
    /// The chunk absorbed for the batch. `None` if the table has no chunks.
    pub partition: Option<u32>,
    /// Fraction of chunks consumed, in `[0, 1]`.
    pub progress: f64,
    pub timestamp: DateTime<Utc>,
}

impl ProgressToken {
    pub fn new(partition: Option<u32>, progress: f64) -> Self {
        ProgressToken {
            partition,
            progress,
            timestamp: Utc::now(),
        }
    }

    /// The token of the batch after absorbing chunk `index`.
    pub fn for_chunk(index: usize, progress: f64) -> Result<Self> {
        let partition =
            u32::try_from(index).map_err(|_| ExecutorError::PartitionOverflow(index))?;
        Ok(Self::new(Some(partition), progress))
    }

    /// Value of `PROGRESSIVE_PARTITION()`.
    pub fn partition_value(&self) -> DataValue {
        self.partition.map(i64::from).into()
    }

    /// Value of `PROGRESSIVE_PROGRESS()`.
    pub fn progress_value(&self) -> DataValue {
        self.progress.into()
    }
}

/// The result rows after absorbing one more chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub rows: Vec<Row>,
    pub token: ProgressToken,
}

/// A column of the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    pub name: String,
    pub datatype: DataType,
}

pub type Schema = Vec<OutputColumn>;

/// Build a schema from names and types.
pub fn schema(names: &[String], types: &[DataType]) -> Schema {
    names
        .iter()
        .zip(types)
        .map(|(name, datatype)| OutputColumn {
            name: name.clone(),
            datatype: *datatype,
        })
        .collect()
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No batch has been requested.
    Created,
    /// A batch is being computed.
    Running,
    /// A batch has been produced and more may follow.
    Yielding,
    Completed,
    /// Closed by the client or failed.
    Cancelled,
}

/// A lazy stream of batches. A chunk is read only when the next batch is polled.
///
/// [`close`](Self::close) stops the stream: no chunk read starts after it.
pub struct ResultStream {
    schema: Schema,
    inner: BoxStream<'static, Result<Batch>>,
    state: StreamState,
    cancel: CancellationToken,
}

impl ResultStream {
    pub fn new(
        schema: Schema,
        inner: BoxStream<'static, Result<Batch>>,
        cancel: CancellationToken,
    ) -> Self {
        ResultStream {
            schema,
            inner,
            state: StreamState::Created,
            cancel,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// A token that closes the stream from another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the stream. Later calls to [`next_batch`](Self::next_batch) return `None`.
    pub fn close(&mut self) {
        self.cancel.cancel();
        if self.state != StreamState::Completed {
            self.state = StreamState::Cancelled;
        }
    }

    /// The next batch, or `None` when the stream is completed or closed.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>> {
        self.next().await.transpose()
    }

    /// Drain the stream and return the last batch.
    pub async fn last_batch(&mut self) -> Result<Option<Batch>> {
        let mut last = None;
        while let Some(batch) = self.next_batch().await? {
            last = Some(batch);
        }
        Ok(last)
    }
}

impl Stream for ResultStream {
    type Item = Result<Batch>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.state {
            StreamState::Completed | StreamState::Cancelled => return Poll::Ready(None),
            _ if self.cancel.is_cancelled() => {
                self.state = StreamState::Cancelled;
                return Poll::Ready(None);
            }
            _ => {}
        }
        self.state = StreamState::Running;
        let poll = self.inner.poll_next_unpin(cx);
        match &poll {
            Poll::Pending => {}
            Poll::Ready(Some(Ok(_))) => self.state = StreamState::Yielding,
            Poll::Ready(Some(Err(_))) => self.state = StreamState::Cancelled,
            Poll::Ready(None) => self.state = StreamState::Completed,
        }
        poll
    }
}

impl std::fmt::Debug for ResultStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream")
            .field("schema", &self.schema)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// A stream of the given batches. Used for results computed in one pass.
pub fn once(schema: Schema, batch: Batch) -> ResultStream {
    let inner = futures::stream::iter([Ok::<_, ExecutorError>(batch)]).boxed();
    ResultStream::new(schema, inner, CancellationToken::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batches(n: u32) -> ResultStream {
        let inner = futures::stream::iter((0..n).map(move |i| {
            Ok(Batch {
                rows: vec![],
                token: ProgressToken::new(Some(i), (i + 1) as f64 / n as f64),
            })
        }))
        .boxed();
        ResultStream::new(vec![], inner, CancellationToken::new())
    }

    #[tokio::test]
    async fn states() {
        let mut stream = batches(2);
        assert_eq!(stream.state(), StreamState::Created);
        stream.next_batch().await.unwrap().unwrap();
        assert_eq!(stream.state(), StreamState::Yielding);
        stream.next_batch().await.unwrap().unwrap();
        assert!(stream.next_batch().await.unwrap().is_none());
        assert_eq!(stream.state(), StreamState::Completed);
    }

    #[tokio::test]
    async fn close() {
        let mut stream = batches(3);
        stream.next_batch().await.unwrap().unwrap();
        stream.close();
        assert_eq!(stream.state(), StreamState::Cancelled);
        assert!(stream.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_from_another_task() {
        let mut stream = batches(3);
        let token = stream.cancellation_token();
        tokio::spawn(async move { token.cancel() }).await.unwrap();
        assert!(stream.next_batch().await.unwrap().is_none());
        assert_eq!(stream.state(), StreamState::Cancelled);
    }

    #[test]
    fn pseudo_values() {
        let token = ProgressToken::new(Some(3), 1.0);
        assert_eq!(token.partition_value(), DataValue::Int64(3));
        assert_eq!(ProgressToken::new(None, 1.0).partition_value(), DataValue::Null);
        assert_eq!(token.progress_value(), DataValue::from(1.0));
    }

    #[test]
    fn chunk_index_out_of_partition_range() {
        let token = ProgressToken::for_chunk(u32::MAX as usize, 0.5).unwrap();
        assert_eq!(token.partition, Some(u32::MAX));
        let index = u32::MAX as usize + 1;
        assert!(matches!(
            ProgressToken::for_chunk(index, 1.0),
            Err(ExecutorError::PartitionOverflow(i)) if i == index
        ));
    }
}
