// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::collections::HashSet;

use super::*;
use crate::catalog::{check_name, ColumnCatalog, ColumnDesc, ColumnId, TableCatalog};
use crate::parser::{ColumnDef, ColumnOption, CreateTable};
use crate::types::DataType;

/// A bound `CREATE TABLE` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCreateTable {
    pub table: TableCatalog,
    /// Do nothing if the table exists.
    pub if_not_exists: bool,
}

impl Binder {
    pub(super) fn bind_create_table(&self, create: &CreateTable) -> Result<BoundStatement> {
        let name = object_name(&create.name)?;
        check_name(&name).map_err(|_| ErrorKind::InvalidTable(name.clone()))?;
        if self.catalog.get_table(&name).is_some() && !create.if_not_exists {
            return Err(ErrorKind::TableExists(name).into());
        }
        if create.columns.is_empty() {
            return Err(ErrorKind::InvalidExpression(format!("table {name:?} has no columns")).into());
        }

        // check duplicated column names
        let mut set = HashSet::new();
        for col in &create.columns {
            let col_name = ident_name(&col.name);
            if !set.insert(col_name.clone()) {
                return Err(ErrorKind::ColumnExists(col_name).into());
            }
        }

        let columns = create
            .columns
            .iter()
            .enumerate()
            .map(|(id, col)| bind_column(id as ColumnId, col))
            .collect::<Result<Vec<_>>>()?;
        let table =
            TableCatalog::new(name.clone(), columns).map_err(|_| ErrorKind::InvalidTable(name))?;
        Ok(BoundStatement::CreateTable(BoundCreateTable {
            table,
            if_not_exists: create.if_not_exists,
        }))
    }
}

fn bind_column(id: ColumnId, col: &ColumnDef) -> Result<ColumnCatalog> {
    let name = ident_name(&col.name);
    check_name(&name).map_err(|_| ErrorKind::InvalidColumn(name.clone()))?;
    let datatype: DataType = col.data_type.to_string().parse()?;
    let mut nullable = true;
    for option in &col.options {
        match option.option {
            ColumnOption::Null => nullable = true,
            ColumnOption::NotNull => nullable = false,
            ColumnOption::Unique {
                is_primary: true, ..
            } => nullable = false,
            ref option => return Err(ErrorKind::Todo(format!("column option {option}")).into()),
        }
    }
    Ok(ColumnCatalog::new(id, name, ColumnDesc::new(datatype, nullable)))
}
