// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;
use parse_display::Display;
use serde::{Deserialize, Serialize};

use super::*;

/// A wrapper around floats providing implementations of `Eq`, `Ord`, and `Hash`.
pub type F64 = OrderedFloat<f64>;

/// Primitive SQL value.
#[derive(
    Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum DataValue {
    // NOTE: Null comes first.
    // => NULL is less than any non-NULL values
    #[default]
    #[display("null")]
    Null,
    #[display("{0}")]
    Bool(bool),
    #[display("{0}")]
    Int64(i64),
    #[display("{0}")]
    Float64(F64),
    #[display("'{0}'")]
    String(String),
}

/// A row of values, in column order.
pub type Row = Vec<DataValue>;

macro_rules! impl_checked_arith {
    ($name:ident, $checked:ident, $op:tt) => {
        /// Arithmetic on two values. NULL in, NULL out.
        pub fn $name(&self, rhs: &Self) -> Result<Self, ConvertError> {
            use DataValue::*;
            Ok(match (self, rhs) {
                (Null, _) | (_, Null) => Null,
                (Int64(x), Int64(y)) => Int64(x.$checked(*y).ok_or_else(|| {
                    ConvertError::InvalidOperation(format!("integer overflow: {x} {} {y}", stringify!($op)))
                })?),
                (a, b) => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => Float64((x $op y).into()),
                    _ => {
                        return Err(ConvertError::InvalidOperation(format!(
                            "{a} {} {b}",
                            stringify!($op)
                        )))
                    }
                },
            })
        }
    };
}

impl DataValue {
    /// Returns `true` if value is null.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type of value.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Bool(_) => DataType::Bool,
            Self::Int64(_) => DataType::Int,
            Self::Float64(_) => DataType::Real,
            Self::String(_) => DataType::Varchar(None),
        }
    }

    /// Numeric value as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int64(v) => Some(*v as f64),
            Self::Float64(v) => Some(v.0),
            _ => None,
        }
    }

    /// Boolean value. NULL is `None`.
    pub fn as_bool(&self) -> Result<Option<bool>, ConvertError> {
        match self {
            Self::Null => Ok(None),
            Self::Bool(b) => Ok(Some(*b)),
            v => Err(ConvertError::Cast(v.to_string(), DataType::Bool)),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    impl_checked_arith!(add, checked_add, +);
    impl_checked_arith!(sub, checked_sub, -);
    impl_checked_arith!(mul, checked_mul, *);

    /// Division. Integer division truncates; dividing by zero is an error.
    pub fn div(&self, rhs: &Self) -> Result<Self, ConvertError> {
        if rhs.is_zero() {
            return Err(ConvertError::DivisionByZero);
        }
        match (self, rhs) {
            (Self::Int64(x), Self::Int64(y)) => x
                .checked_div(*y)
                .map(Self::Int64)
                .ok_or_else(|| ConvertError::InvalidOperation(format!("{x} / {y}"))),
            _ => self.float_op(rhs, "/", |x, y| x / y),
        }
    }

    /// Remainder. Dividing by zero is an error.
    pub fn rem(&self, rhs: &Self) -> Result<Self, ConvertError> {
        if rhs.is_zero() {
            return Err(ConvertError::DivisionByZero);
        }
        match (self, rhs) {
            (Self::Int64(x), Self::Int64(y)) => x
                .checked_rem(*y)
                .map(Self::Int64)
                .ok_or_else(|| ConvertError::InvalidOperation(format!("{x} % {y}"))),
            _ => self.float_op(rhs, "%", |x, y| x % y),
        }
    }

    fn float_op(&self, rhs: &Self, op: &str, f: impl Fn(f64, f64) -> f64) -> Result<Self, ConvertError> {
        if self.is_null() || rhs.is_null() {
            return Ok(Self::Null);
        }
        match (self.as_f64(), rhs.as_f64()) {
            (Some(x), Some(y)) => Ok(Self::Float64(f(x, y).into())),
            _ => Err(ConvertError::InvalidOperation(format!("{self} {op} {rhs}"))),
        }
    }

    /// Negation.
    pub fn neg(&self) -> Result<Self, ConvertError> {
        match self {
            Self::Null => Ok(Self::Null),
            Self::Int64(v) => v
                .checked_neg()
                .map(Self::Int64)
                .ok_or_else(|| ConvertError::InvalidOperation(format!("-{v}"))),
            Self::Float64(v) => Ok(Self::Float64(-*v)),
            v => Err(ConvertError::InvalidOperation(format!("-{v}"))),
        }
    }

    /// Returns `true` if value is zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Int64(v) => *v == 0,
            Self::Float64(v) => v.0 == 0.0,
            _ => false,
        }
    }

    /// SQL comparison. Integers and floats compare numerically.
    ///
    /// Returns `None` if either side is NULL.
    pub fn sql_cmp(&self, other: &Self) -> Result<Option<Ordering>, ConvertError> {
        use DataValue::*;
        Ok(match (self, other) {
            (Null, _) | (_, Null) => None,
            (Int64(a), Int64(b)) => Some(a.cmp(b)),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (String(a), String(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Some(F64::from(x).cmp(&F64::from(y))),
                _ => {
                    return Err(ConvertError::InvalidOperation(format!(
                        "cannot compare {a} with {b}"
                    )))
                }
            },
        })
    }

    /// Cast the value to another type.
    pub fn cast(&self, ty: &DataType) -> Result<Self, ConvertError> {
        let err = || ConvertError::Cast(self.to_string(), *ty);
        Ok(match (self, ty) {
            (Self::Null, _) => Self::Null,
            (v, DataType::Null) => v.clone(),
            (Self::Bool(b), DataType::Bool) => Self::Bool(*b),
            (Self::Bool(b), DataType::Int) => Self::Int64(*b as i64),
            (Self::Int64(v), DataType::Int) => Self::Int64(*v),
            (Self::Int64(v), DataType::Real) => Self::Float64((*v as f64).into()),
            (Self::Int64(v), DataType::Bool) => Self::Bool(*v != 0),
            (Self::Float64(v), DataType::Real) => Self::Float64(*v),
            (Self::Float64(v), DataType::Int) => {
                if !v.0.is_finite() || v.0 > i64::MAX as f64 || v.0 < i64::MIN as f64 {
                    return Err(err());
                }
                Self::Int64(v.0.round() as i64)
            }
            (Self::String(s), DataType::Int) => Self::Int64(s.trim().parse().map_err(|_| err())?),
            (Self::String(s), DataType::Real) => {
                Self::Float64(s.trim().parse::<f64>().map_err(|_| err())?.into())
            }
            (Self::String(s), DataType::Bool) => Self::Bool(s.trim().parse().map_err(|_| err())?),
            (v, t) if t.is_string() => {
                let s = match v {
                    Self::String(s) => s.clone(),
                    Self::Bool(b) => b.to_string(),
                    Self::Int64(i) => i.to_string(),
                    Self::Float64(f) => f.to_string(),
                    Self::Null => unreachable!(),
                };
                if let Some(max) = t.max_len() {
                    if s.chars().count() > max as usize {
                        return Err(ConvertError::ExceedLengthLimit(s, *t));
                    }
                }
                Self::String(s)
            }
            _ => return Err(err()),
        })
    }

    /// Compares and returns the minimum of two values. NULL is ignored.
    pub fn min(self, other: Self) -> Self {
        match (self, other) {
            (Self::Null, a) | (a, Self::Null) => a,
            (a, b) => match a.sql_cmp(&b) {
                Ok(Some(Ordering::Greater)) => b,
                _ => a,
            },
        }
    }

    /// Compares and returns the maximum of two values. NULL is ignored.
    pub fn max(self, other: Self) -> Self {
        match (self, other) {
            (Self::Null, a) | (a, Self::Null) => a,
            (a, b) => match a.sql_cmp(&b) {
                Ok(Some(Ordering::Less)) => b,
                _ => a,
            },
        }
    }
}

impl From<i64> for DataValue {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<i32> for DataValue {
    fn from(v: i32) -> Self {
        Self::Int64(v.into())
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        Self::Float64(v.into())
    }
}

impl From<bool> for DataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        Self::String(v.into())
    }
}

impl<T: Into<DataValue>> From<Option<T>> for DataValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
