// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use thiserror::Error;

use crate::catalog::CatalogError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{0}({1}) not found")]
    NotFound(&'static str, String),
    #[error("duplicated {0}: {1}")]
    Duplicated(&'static str, String),
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
    #[error("unsupported store url: {0:?}, expect `memory:` or `file:<path>`")]
    InvalidUrl(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl StorageError {
    pub fn not_found(ty: &'static str, item: impl ToString) -> Self {
        StorageError::NotFound(ty, item.to_string())
    }

    pub fn duplicated(ty: &'static str, item: impl ToString) -> Self {
        StorageError::Duplicated(ty, item.to_string())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
