// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use super::*;
use crate::parser::{Insert, SetExpr};

/// A bound `INSERT INTO t [(cols)] VALUES ...` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundInsert {
    pub table: TableCatalogRef,
    /// Position in the table of each value in a row.
    pub columns: Vec<usize>,
    /// Constant expressions, cast to the column types by the executor.
    pub rows: Vec<Vec<BoundExpr>>,
}

impl Binder {
    pub(super) fn bind_insert(&self, insert: &Insert) -> Result<BoundStatement> {
        let name = object_name(&insert.table_name)?;
        let table = self
            .catalog
            .get_table(&name)
            .ok_or_else(|| ErrorKind::InvalidTable(name.clone()))?;
        if self.chunks.is_prepared(&name) {
            return Err(ErrorKind::TablePrepared(name).into());
        }

        let columns = if insert.columns.is_empty() {
            (0..table.columns().len()).collect()
        } else {
            let mut columns = vec![];
            for ident in &insert.columns {
                let col = ident_name(ident);
                let index = table
                    .column_index(&col)
                    .ok_or_else(|| ErrorKind::InvalidColumn(col.clone()))?;
                if columns.contains(&index) {
                    return Err(ErrorKind::ColumnExists(col).into());
                }
                columns.push(index);
            }
            columns
        };
        // columns left out are filled with NULL
        for (i, col) in table.columns().iter().enumerate() {
            if !columns.contains(&i) && !col.is_nullable() {
                return Err(ErrorKind::NotNullableColumn(col.name().into()).into());
            }
        }

        let source = insert
            .source
            .as_ref()
            .ok_or_else(|| ErrorKind::Todo("INSERT without VALUES".into()))?;
        let SetExpr::Values(values) = &*source.body else {
            return Err(ErrorKind::Todo("INSERT ... SELECT".into()).into());
        };

        let mut binder = ExprBinder::new(None, None);
        let mut rows = Vec::with_capacity(values.rows.len());
        for row in &values.rows {
            if row.len() != columns.len() {
                return Err(
                    ErrorKind::ColumnCountMismatch(name, columns.len(), row.len()).into(),
                );
            }
            let mut bound = Vec::with_capacity(row.len());
            for (ast, &index) in row.iter().zip(&columns) {
                let expr = binder.bind_expr(ast, Clause::Values)?;
                let column = &table.columns()[index];
                if expr.return_type.union(&column.datatype()).is_none() {
                    return Err(ErrorKind::CastError(ast.to_string(), column.datatype()).into());
                }
                bound.push(expr);
            }
            rows.push(bound);
        }
        Ok(BoundStatement::Insert(BoundInsert {
            table,
            columns,
            rows,
        }))
    }
}
