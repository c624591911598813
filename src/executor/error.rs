// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use crate::chunk::ChunkError;
use crate::storage::StorageError;
use crate::types::ConvertError;

/// The error type of execution.
#[derive(thiserror::Error, Debug)]
pub enum ExecutorError {
    #[error("{0}")]
    Chunk(#[from] ChunkError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("conversion error: {0}")]
    Convert(#[from] ConvertError),
    #[error("null value in column {0:?} violates not-null constraint")]
    NotNullable(String),
    #[error("chunk index {0} exceeds the partition range")]
    PartitionOverflow(usize),
    #[error("mismatched aggregation states: {0}")]
    StateMismatch(&'static str),
}

impl ExecutorError {
    /// The chunk index of a failed chunk read.
    pub fn chunk_read_index(&self) -> Option<usize> {
        match self {
            Self::Chunk(ChunkError::ChunkRead { index, .. }) => Some(*index),
            _ => None,
        }
    }
}

pub type Result<T, E = ExecutorError> = std::result::Result<T, E>;
