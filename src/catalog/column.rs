// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use serde::{Deserialize, Serialize};

use super::ColumnId;
use crate::types::DataType;

/// A descriptor of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDesc {
    datatype: DataType,
    nullable: bool,
}

impl ColumnDesc {
    pub const fn new(datatype: DataType, nullable: bool) -> Self {
        ColumnDesc { datatype, nullable }
    }

    pub const fn datatype(&self) -> DataType {
        self.datatype
    }

    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// The catalog of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCatalog {
    id: ColumnId,
    name: String,
    desc: ColumnDesc,
}

impl ColumnCatalog {
    pub fn new(id: ColumnId, name: impl Into<String>, desc: ColumnDesc) -> ColumnCatalog {
        ColumnCatalog {
            id,
            name: name.into(),
            desc,
        }
    }

    pub const fn id(&self) -> ColumnId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn desc(&self) -> &ColumnDesc {
        &self.desc
    }

    pub const fn datatype(&self) -> DataType {
        self.desc.datatype
    }

    pub const fn is_nullable(&self) -> bool {
        self.desc.nullable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_catalog() {
        let col = ColumnCatalog::new(0, "grade", ColumnDesc::new(DataType::Int, false));
        assert_eq!(col.id(), 0);
        assert_eq!(col.name(), "grade");
        assert_eq!(col.datatype(), DataType::Int);
        assert!(!col.is_nullable());
    }
}
