// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Table schemas known to the engine.

use std::sync::Arc;

pub use self::column::*;
pub use self::root::*;
pub use self::table::*;

mod column;
mod root;
mod table;

pub type ColumnId = u32;

pub type RootCatalogRef = Arc<RootCatalog>;
pub type TableCatalogRef = Arc<TableCatalog>;

/// The error type of catalog operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),
    #[error("duplicated {0}: {1}")]
    Duplicated(&'static str, String),
    #[error("invalid name {0:?}: only letters, digits and '_' are allowed")]
    InvalidName(String),
}

/// Names become storage keys, so they are restricted to a safe alphabet.
pub fn check_name(name: &str) -> Result<(), CatalogError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CatalogError::InvalidName(name.into()))
    }
}
