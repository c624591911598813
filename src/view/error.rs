// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use crate::binder::BindError;
use crate::catalog::CatalogError;
use crate::chunk::ChunkError;
use crate::executor::ExecutorError;
use crate::parser::ParserError;
use crate::storage::StorageError;

/// The error type of progressive view operations.
#[derive(thiserror::Error, Debug)]
pub enum ViewError {
    #[error("progressive view {0:?} not found")]
    NotFound(String),
    #[error("progressive view {0:?} already exists")]
    Exists(String),
    #[error("progressive view {0:?} is being advanced by another session")]
    ConcurrentAdvance(String),
    #[error("{0}")]
    Catalog(#[from] CatalogError),
    #[error("{0}")]
    Parse(#[from] ParserError),
    #[error("{0}")]
    Bind(#[from] BindError),
    #[error("{0}")]
    Chunk(#[from] ChunkError),
    #[error("{0}")]
    Executor(#[from] ExecutorError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ViewResult<T> = std::result::Result<T, ViewError>;
