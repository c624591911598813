// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Execute bound statements.
//!
//! A progressive query is a lazy [`ResultStream`]: every poll reads one more
//! chunk, absorbs its rows into a [`PartialAggregateState`], and yields a
//! [`Batch`] with the snapshot of the state shaped into result rows.

use crate::binder::BoundExpr;
use crate::types::Row;

mod aggregation;
mod error;
mod evaluator;
mod insert;
mod one_pass;
mod output;
mod progressive;
mod stream;

pub use self::aggregation::*;
pub use self::error::*;
pub use self::insert::execute_insert;
pub use self::one_pass::OnePassExecutor;
pub use self::output::OutputShaper;
pub use self::progressive::ProgressiveExecutor;
pub use self::stream::*;

/// Rows of a chunk that pass the filter.
pub(crate) fn filter_rows<'a>(filter: Option<&BoundExpr>, rows: &'a [Row]) -> Result<Vec<&'a Row>> {
    let Some(filter) = filter else {
        return Ok(rows.iter().collect());
    };
    let mut passed = Vec::with_capacity(rows.len());
    for row in rows {
        if filter.eval_filter(row)? {
            passed.push(row);
        }
    }
    Ok(passed)
}
