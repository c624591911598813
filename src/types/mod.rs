// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! SQL data types and values.

use std::str::FromStr;

use parse_display::Display;
use serde::{Deserialize, Serialize};

mod value;

pub use self::value::*;

/// Data type of a column or an expression.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[display("NULL")]
    Null,
    #[display("BOOLEAN")]
    Bool,
    /// 64-bit signed integer.
    #[display("INT")]
    Int,
    /// 64-bit float.
    #[display("REAL")]
    Real,
    /// Fixed maximum length string.
    #[display("CHAR({0})")]
    Char(u32),
    /// Variable length string with an optional length limit.
    #[display("VARCHAR")]
    Varchar(Option<u32>),
}

impl DataType {
    /// Returns `true` for `INT` and `REAL`.
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Real)
    }

    /// Returns `true` for `CHAR` and `VARCHAR`.
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::Char(_) | Self::Varchar(_))
    }

    /// Maximum length of a string type.
    pub const fn max_len(&self) -> Option<u32> {
        match self {
            Self::Char(n) => Some(*n),
            Self::Varchar(n) => *n,
            _ => None,
        }
    }

    /// The common type of two operands, used by arithmetic and comparison.
    ///
    /// `NULL` unifies with everything.
    pub fn union(&self, other: &Self) -> Option<Self> {
        use DataType::*;
        match (self, other) {
            (Null, t) | (t, Null) => Some(*t),
            (Int, Int) => Some(Int),
            (Int | Real, Int | Real) => Some(Real),
            (Bool, Bool) => Some(Bool),
            (a, b) if a.is_string() && b.is_string() => Some(Varchar(None)),
            _ => None,
        }
    }
}

/// Failed to recognize a type name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported data type: {0}")]
pub struct ParseTypeError(pub String);

impl FromStr for DataType {
    type Err = ParseTypeError;

    /// Parses SQL type names, e.g. `INT`, `DOUBLE PRECISION`, `VARCHAR(100)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        let (name, arg) = match upper.split_once('(') {
            Some((name, rest)) => {
                let arg = rest.trim_end_matches(')').trim();
                (name.trim(), Some(arg))
            }
            None => (upper.as_str(), None),
        };
        let len = || -> Result<u32, ParseTypeError> {
            match arg {
                Some(n) => n.parse().map_err(|_| ParseTypeError(s.into())),
                None => Ok(1),
            }
        };
        Ok(match name {
            "INT" | "INTEGER" | "INT4" | "INT8" | "BIGINT" | "SMALLINT" | "TINYINT" => Self::Int,
            "REAL" | "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" | "DECIMAL"
            | "NUMERIC" => Self::Real,
            "BOOL" | "BOOLEAN" => Self::Bool,
            "CHAR" | "CHARACTER" | "BPCHAR" => Self::Char(len()?),
            "VARCHAR" | "CHARACTER VARYING" => match arg {
                Some(_) => Self::Varchar(Some(len()?)),
                None => Self::Varchar(None),
            },
            "TEXT" | "STRING" => Self::Varchar(None),
            _ => return Err(ParseTypeError(s.into())),
        })
    }
}

/// Failed to convert a value.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("failed to cast {0} to {1}")]
    Cast(String, DataType),
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("value too long for type {1}: {0:?}")]
    ExceedLengthLimit(String, DataType),
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("int", DataType::Int)]
    #[test_case("INTEGER", DataType::Int)]
    #[test_case("bigint", DataType::Int)]
    #[test_case("double", DataType::Real)]
    #[test_case("DOUBLE PRECISION", DataType::Real)]
    #[test_case("varchar(100)", DataType::Varchar(Some(100)))]
    #[test_case("VARCHAR", DataType::Varchar(None))]
    #[test_case("char(1)", DataType::Char(1))]
    #[test_case("text", DataType::Varchar(None))]
    #[test_case("boolean", DataType::Bool)]
    fn parse_type(s: &str, expected: DataType) {
        assert_eq!(s.parse::<DataType>().unwrap(), expected);
    }

    #[test]
    fn parse_unknown_type() {
        assert!("blob".parse::<DataType>().is_err());
    }

    #[test]
    fn union() {
        assert_eq!(DataType::Int.union(&DataType::Real), Some(DataType::Real));
        assert_eq!(DataType::Null.union(&DataType::Int), Some(DataType::Int));
        assert_eq!(DataType::Int.union(&DataType::Char(1)), None);
        assert_eq!(
            DataType::Char(1).union(&DataType::Varchar(Some(4))),
            Some(DataType::Varchar(None))
        );
    }
}
