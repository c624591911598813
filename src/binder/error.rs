// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! The error type of bind operations.
//!
//! To raise an error in binder, construct an `ErrorKind`:
//!
//! ```ignore
//! return Err(ErrorKind::InvalidTable("table".into()).into());
//! ```

use crate::types::{ConvertError, DataType, ParseTypeError};

/// The error type of bind operations.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("{0}")]
pub struct BindError(Box<ErrorKind>);

impl BindError {
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Returns true if the statement uses an aggregate the engine cannot merge.
    pub fn is_unsupported_aggregate(&self) -> bool {
        matches!(*self.0, ErrorKind::UnsupportedAggregate(_))
    }
}

/// The error type of bind operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("invalid table {0:?}")]
    InvalidTable(String),
    #[error("invalid column {0:?}")]
    InvalidColumn(String),
    #[error("table {0:?} already exists")]
    TableExists(String),
    #[error("column {0:?} already exists")]
    ColumnExists(String),
    #[error("table {0:?} is not prepared, run PREPARE TABLE first")]
    TableNotPrepared(String),
    #[error("table {0:?} is prepared and can not be modified")]
    TablePrepared(String),
    #[error("table {0:?} has {1} columns available but {2} columns specified")]
    ColumnCountMismatch(String, usize, usize),
    #[error("invalid expression {0}")]
    InvalidExpression(String),
    #[error("not nullable column {0:?}")]
    NotNullableColumn(String),
    #[error("cannot cast {0} to {1}")]
    CastError(String, DataType),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("unsupported aggregate function: {0}")]
    UnsupportedAggregate(String),
    #[error("aggregate function calls cannot be nested")]
    NestedAgg,
    #[error("{0} cannot contain aggregates")]
    AggNotAllowed(&'static str),
    #[error("{0} cannot contain progressive pseudo-columns")]
    PseudoColumnNotAllowed(&'static str),
    #[error("column {0:?} must appear in the GROUP BY clause or be used in an aggregate function")]
    ColumnNotInAgg(String),
    #[error("malformed FUTURE clause: {0}")]
    InvalidFuture(String),
    #[error("not supported yet: {0}")]
    Todo(String),
}

impl From<ErrorKind> for BindError {
    fn from(kind: ErrorKind) -> Self {
        BindError(Box::new(kind))
    }
}

impl From<ParseTypeError> for BindError {
    fn from(e: ParseTypeError) -> Self {
        ErrorKind::TypeError(e.to_string()).into()
    }
}

impl From<ConvertError> for BindError {
    fn from(e: ConvertError) -> Self {
        match e {
            ConvertError::Cast(value, ty) => ErrorKind::CastError(value, ty).into(),
            e => ErrorKind::TypeError(e.to_string()).into(),
        }
    }
}
