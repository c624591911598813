// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use parking_lot::RwLock;

use super::*;

/// The root of all catalogs.
#[derive(Debug, Default)]
pub struct RootCatalog {
    tables: RwLock<HashMap<String, TableCatalogRef>>,
}

impl RootCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&self, table: TableCatalog) -> Result<TableCatalogRef, CatalogError> {
        let mut tables = self.tables.write();
        if tables.contains_key(table.name()) {
            return Err(CatalogError::Duplicated("table", table.name().into()));
        }
        let table = Arc::new(table);
        tables.insert(table.name().into(), table.clone());
        Ok(table)
    }

    pub fn get_table(&self, name: &str) -> Option<TableCatalogRef> {
        self.tables.read().get(name).cloned()
    }

    pub fn drop_table(&self, name: &str) -> Result<TableCatalogRef, CatalogError> {
        self.tables
            .write()
            .remove(name)
            .ok_or_else(|| CatalogError::NotFound("table", name.into()))
    }

    /// Names of all tables, sorted.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().sorted().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn test_root_catalog() {
        let catalog = RootCatalog::new();
        let col = ColumnCatalog::new(0, "a", ColumnDesc::new(DataType::Int, true));
        catalog
            .add_table(TableCatalog::new("t", vec![col.clone()]).unwrap())
            .unwrap();
        assert!(catalog.get_table("t").is_some());
        assert!(catalog
            .add_table(TableCatalog::new("t", vec![col]).unwrap())
            .is_err());
        assert_eq!(catalog.table_names(), vec!["t".to_string()]);
        catalog.drop_table("t").unwrap();
        assert!(catalog.get_table("t").is_none());
    }
}
