// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use parse_display::Display;

use super::*;
use crate::types::DataType;

/// Aggregation kind.
///
/// Every kind has a mergeable state, so partial results over chunks can be combined.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display(style = "snake_case")]
pub enum AggKind {
    Sum,
    Count,
    /// `COUNT(*)`
    RowCount,
    Avg,
    Min,
    Max,
    VarPop,
    VarSamp,
    StddevPop,
    StddevSamp,
}

impl AggKind {
    /// Look up a supported aggregate by its lower-case function name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sum" => Self::Sum,
            "count" => Self::Count,
            "avg" => Self::Avg,
            "min" => Self::Min,
            "max" => Self::Max,
            "var_pop" => Self::VarPop,
            "var_samp" | "variance" => Self::VarSamp,
            "stddev_pop" => Self::StddevPop,
            "stddev_samp" | "stddev" => Self::StddevSamp,
            _ => return None,
        })
    }
}

/// An aggregate function call.
#[derive(Debug, Clone, PartialEq)]
pub struct AggCall {
    pub kind: AggKind,
    /// The argument. `None` for `COUNT(*)`.
    pub arg: Option<BoundExpr>,
    pub return_type: DataType,
}

impl AggCall {
    pub fn new(kind: AggKind, arg: Option<BoundExpr>) -> Result<Self, BindError> {
        let arg_type = arg.as_ref().map_or(DataType::Null, |a| a.return_type);
        let numeric = arg_type.is_numeric() || arg_type == DataType::Null;
        let return_type = match kind {
            AggKind::Count | AggKind::RowCount => DataType::Int,
            AggKind::Min | AggKind::Max => arg_type,
            AggKind::Sum if numeric => match arg_type {
                DataType::Null => DataType::Int,
                t => t,
            },
            AggKind::Avg
            | AggKind::VarPop
            | AggKind::VarSamp
            | AggKind::StddevPop
            | AggKind::StddevSamp
                if numeric =>
            {
                DataType::Real
            }
            kind => {
                return Err(ErrorKind::TypeError(format!(
                    "{}({arg_type}) is not defined, the argument must be numeric",
                    kind.to_string().to_uppercase()
                ))
                .into())
            }
        };
        Ok(AggCall {
            kind,
            arg,
            return_type,
        })
    }
}
