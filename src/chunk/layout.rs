// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::iter::once;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of chunks a table is split into when no chunk size is configured.
pub const DEFAULT_CHUNK_COUNT: usize = 100;

/// How a prepared table is split into chunks. Persisted in the `meta` store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkLayout {
    pub table: String,
    pub row_count: usize,
    /// Rows per chunk. The last chunk may be shorter.
    pub chunk_rows: usize,
    /// Row offset where each chunk starts, followed by `row_count`.
    pub boundaries: Vec<usize>,
    pub prepared_at: DateTime<Utc>,
}

impl ChunkLayout {
    pub fn new(table: impl Into<String>, row_count: usize, chunk_size: Option<usize>) -> Self {
        let chunk_rows = chunk_rows(row_count, chunk_size);
        let boundaries = (0..row_count)
            .step_by(chunk_rows)
            .chain(once(row_count))
            .collect();
        ChunkLayout {
            table: table.into(),
            row_count,
            chunk_rows,
            boundaries,
            prepared_at: Utc::now(),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }

    /// Row range of the chunk.
    pub fn range(&self, index: usize) -> Option<std::ops::Range<usize>> {
        if index >= self.chunk_count() {
            return None;
        }
        Some(self.boundaries[index]..self.boundaries[index + 1])
    }
}

/// Rows per chunk. Without a positive chunk size, rows are spread evenly
/// over at most [`DEFAULT_CHUNK_COUNT`] chunks.
pub fn chunk_rows(row_count: usize, chunk_size: Option<usize>) -> usize {
    match chunk_size {
        Some(n) if n > 0 => n,
        _ => row_count.div_ceil(DEFAULT_CHUNK_COUNT).max(1),
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(8, Some(2), 4)]
    #[test_case(9, Some(2), 5)]
    #[test_case(0, Some(2), 0)]
    #[test_case(0, None, 0)]
    #[test_case(1, None, 1)]
    #[test_case(100, None, 100)]
    #[test_case(250, None, 84)]
    #[test_case(10_000, None, 100)]
    fn chunk_count(rows: usize, chunk_size: Option<usize>, expected: usize) {
        assert_eq!(
            ChunkLayout::new("t", rows, chunk_size).chunk_count(),
            expected
        );
    }

    #[test]
    fn ranges_cover_all_rows() {
        let layout = ChunkLayout::new("t", 9, Some(4));
        assert_eq!(layout.boundaries, vec![0, 4, 8, 9]);
        assert_eq!(layout.range(0), Some(0..4));
        assert_eq!(layout.range(2), Some(8..9));
        assert_eq!(layout.range(3), None);
    }
}
