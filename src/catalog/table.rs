// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use serde::{Deserialize, Serialize};

use super::*;

/// The catalog of a table: its name and ordered columns.
///
/// The schema is fixed after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCatalog {
    name: String,
    columns: Vec<ColumnCatalog>,
}

impl TableCatalog {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnCatalog>) -> Result<Self, CatalogError> {
        let name = name.into();
        check_name(&name)?;
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name() == col.name()) {
                return Err(CatalogError::Duplicated("column", col.name().into()));
            }
        }
        Ok(TableCatalog { name, columns })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnCatalog] {
        &self.columns
    }

    /// Position of the column in a row.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnCatalog> {
        self.columns.iter().find(|c| c.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn test_table_catalog() {
        let table = TableCatalog::new(
            "t",
            vec![
                ColumnCatalog::new(0, "a", ColumnDesc::new(DataType::Int, true)),
                ColumnCatalog::new(1, "b", ColumnDesc::new(DataType::Varchar(Some(100)), true)),
            ],
        )
        .unwrap();
        assert_eq!(table.column_index("b"), Some(1));
        assert_eq!(table.column_index("c"), None);
        assert_eq!(table.column("a").unwrap().datatype(), DataType::Int);
    }

    #[test]
    fn duplicated_column() {
        let col = ColumnCatalog::new(0, "a", ColumnDesc::new(DataType::Int, true));
        let err = TableCatalog::new("t", vec![col.clone(), col]).unwrap_err();
        assert_eq!(err, CatalogError::Duplicated("column", "a".into()));
    }
}
