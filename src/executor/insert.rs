// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use tracing::info;

use super::*;
use crate::binder::BoundInsert;
use crate::storage::SourceStore;
use crate::types::{DataValue, Row};

/// Evaluate the values of an `INSERT` and append them to the source table.
///
/// Values are cast to the column types. Omitted columns are `NULL`.
/// Returns the number of inserted rows.
pub async fn execute_insert(source: &SourceStore, insert: &BoundInsert) -> Result<usize> {
    let columns = insert.table.columns();
    let mut rows = Vec::with_capacity(insert.rows.len());
    for values in &insert.rows {
        let mut row: Row = vec![DataValue::Null; columns.len()];
        for (expr, &index) in values.iter().zip(&insert.columns) {
            let column = &columns[index];
            let value = expr.eval(&[])?.cast(&column.datatype())?;
            row[index] = value;
        }
        for (column, value) in columns.iter().zip(&row) {
            if value.is_null() && !column.is_nullable() {
                return Err(ExecutorError::NotNullable(column.name().into()));
            }
        }
        rows.push(row);
    }
    source.append(insert.table.name(), &rows).await?;
    info!(table = insert.table.name(), rows = rows.len(), "rows inserted");
    Ok(rows.len())
}
