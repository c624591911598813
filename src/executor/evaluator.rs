// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Apply expressions on rows.

use std::cmp::Ordering;

use crate::binder::{BinaryOp, BoundExpr, BoundExprKind, UnaryOp};
use crate::types::{ConvertError, DataValue};

impl BoundExpr {
    /// Evaluate the expression on a row. Follows SQL three-valued logic.
    pub fn eval(&self, row: &[DataValue]) -> Result<DataValue, ConvertError> {
        match &self.kind {
            BoundExprKind::Constant(v) => Ok(v.clone()),
            BoundExprKind::InputRef(i) => row
                .get(*i)
                .cloned()
                .ok_or_else(|| ConvertError::InvalidOperation(format!("column #{i} out of range"))),
            BoundExprKind::BinaryOp { op, left, right } => match op {
                BinaryOp::And => and(left, right, row),
                BinaryOp::Or => or(left, right, row),
                op => {
                    let left = left.eval(row)?;
                    let right = right.eval(row)?;
                    binary_op(*op, &left, &right)
                }
            },
            BoundExprKind::UnaryOp { op, expr } => {
                let v = expr.eval(row)?;
                match op {
                    UnaryOp::Neg => v.neg(),
                    UnaryOp::Not => Ok(v.as_bool()?.map(|b| !b).into()),
                }
            }
            BoundExprKind::IsNull { expr, negated } => {
                Ok(DataValue::Bool(expr.eval(row)?.is_null() != *negated))
            }
            BoundExprKind::InList {
                expr,
                list,
                negated,
            } => {
                let v = expr.eval(row)?;
                if v.is_null() {
                    return Ok(DataValue::Null);
                }
                let mut has_null = false;
                for item in list {
                    match v.sql_cmp(&item.eval(row)?)? {
                        Some(Ordering::Equal) => return Ok(DataValue::Bool(!negated)),
                        Some(_) => {}
                        None => has_null = true,
                    }
                }
                Ok(match has_null {
                    true => DataValue::Null,
                    false => DataValue::Bool(*negated),
                })
            }
            BoundExprKind::Cast(expr) => expr.eval(row)?.cast(&self.return_type),
            BoundExprKind::FutureMask(terms) => {
                let mut mask = 0i64;
                for (bit, term) in terms.iter().enumerate() {
                    if term.eval(row)? == DataValue::Bool(true) {
                        mask |= 1 << bit;
                    }
                }
                Ok(DataValue::Int64(mask))
            }
            BoundExprKind::MaskBit { key, bit } => match row.get(*key) {
                Some(DataValue::Int64(mask)) => Ok(DataValue::Bool((mask >> bit) & 1 == 1)),
                Some(DataValue::Null) => Ok(DataValue::Null),
                _ => Err(ConvertError::InvalidOperation(format!(
                    "column #{key} is not a mask"
                ))),
            },
            BoundExprKind::GroupRef(_) | BoundExprKind::AggRef(_) | BoundExprKind::Pseudo(_) => {
                Err(ConvertError::InvalidOperation(format!(
                    "unresolved expression {:?}",
                    self.kind
                )))
            }
        }
    }

    /// Evaluate a predicate. Only `TRUE` keeps a row, `NULL` and `FALSE` drop it.
    pub fn eval_filter(&self, row: &[DataValue]) -> Result<bool, ConvertError> {
        Ok(self.eval(row)? == DataValue::Bool(true))
    }
}

fn and(left: &BoundExpr, right: &BoundExpr, row: &[DataValue]) -> Result<DataValue, ConvertError> {
    let l = left.eval(row)?.as_bool()?;
    if l == Some(false) {
        return Ok(DataValue::Bool(false));
    }
    let r = right.eval(row)?.as_bool()?;
    Ok(match (l, r) {
        (_, Some(false)) => DataValue::Bool(false),
        (Some(true), Some(true)) => DataValue::Bool(true),
        _ => DataValue::Null,
    })
}

fn or(left: &BoundExpr, right: &BoundExpr, row: &[DataValue]) -> Result<DataValue, ConvertError> {
    let l = left.eval(row)?.as_bool()?;
    if l == Some(true) {
        return Ok(DataValue::Bool(true));
    }
    let r = right.eval(row)?.as_bool()?;
    Ok(match (l, r) {
        (_, Some(true)) => DataValue::Bool(true),
        (Some(false), Some(false)) => DataValue::Bool(false),
        _ => DataValue::Null,
    })
}

fn binary_op(op: BinaryOp, left: &DataValue, right: &DataValue) -> Result<DataValue, ConvertError> {
    use BinaryOp::*;
    Ok(match op {
        Plus => left.add(right)?,
        Minus => left.sub(right)?,
        Multiply => left.mul(right)?,
        Divide if left.is_null() || right.is_null() => DataValue::Null,
        Divide => left.div(right)?,
        Modulo if left.is_null() || right.is_null() => DataValue::Null,
        Modulo => left.rem(right)?,
        cmp => {
            let Some(ord) = left.sql_cmp(right)? else {
                return Ok(DataValue::Null);
            };
            DataValue::Bool(match cmp {
                Eq => ord.is_eq(),
                NotEq => ord.is_ne(),
                Lt => ord.is_lt(),
                LtEq => ord.is_le(),
                Gt => ord.is_gt(),
                GtEq => ord.is_ge(),
                _ => unreachable!("{cmp} is not a comparison"),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn col(i: usize) -> BoundExpr {
        BoundExpr::input_ref(i, DataType::Int)
    }

    fn binary(op: BinaryOp, left: BoundExpr, right: BoundExpr) -> BoundExpr {
        BoundExpr {
            kind: BoundExprKind::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            return_type: DataType::Bool,
        }
    }

    #[test]
    fn three_valued_logic() {
        let null = BoundExpr::constant(DataValue::Null);
        let t = BoundExpr::constant(true.into());
        let f = BoundExpr::constant(false.into());
        let row: [DataValue; 0] = [];
        let eval = |e: BoundExpr| e.eval(&row).unwrap();
        assert_eq!(eval(binary(BinaryOp::And, null.clone(), f.clone())), false.into());
        assert_eq!(eval(binary(BinaryOp::And, null.clone(), t.clone())), DataValue::Null);
        assert_eq!(eval(binary(BinaryOp::Or, null.clone(), t)), true.into());
        assert_eq!(eval(binary(BinaryOp::Or, f, null)), DataValue::Null);
    }

    #[test]
    fn comparison_and_filter() {
        let gt = binary(BinaryOp::Gt, col(0), BoundExpr::constant(1.into()));
        assert!(gt.eval_filter(&[DataValue::from(5)]).unwrap());
        assert!(!gt.eval_filter(&[DataValue::from(0)]).unwrap());
        assert!(!gt.eval_filter(&[DataValue::Null]).unwrap());
        // numeric comparison across INT and REAL
        assert!(gt.eval_filter(&[DataValue::from(1.5)]).unwrap());
    }

    #[test]
    fn in_list() {
        let expr = |list: Vec<DataValue>, negated| BoundExpr {
            kind: BoundExprKind::InList {
                expr: Box::new(col(0)),
                list: list.into_iter().map(BoundExpr::constant).collect(),
                negated,
            },
            return_type: DataType::Bool,
        };
        let row = [DataValue::from(2)];
        assert_eq!(expr(vec![1.into(), 2.into()], false).eval(&row).unwrap(), true.into());
        assert_eq!(expr(vec![1.into(), 2.into()], true).eval(&row).unwrap(), false.into());
        assert_eq!(expr(vec![1.into(), DataValue::Null], false).eval(&row).unwrap(), DataValue::Null);
        assert_eq!(expr(vec![1.into(), 3.into()], false).eval(&row).unwrap(), false.into());
    }

    #[test]
    fn future_mask() {
        let eq = |v: i64| binary(BinaryOp::Eq, col(0), BoundExpr::constant(v.into()));
        let mask = BoundExpr {
            kind: BoundExprKind::FutureMask(vec![eq(1), eq(2), col(1)]),
            return_type: DataType::Int,
        };
        assert_eq!(mask.eval(&[DataValue::from(2), true.into()]).unwrap(), DataValue::Int64(0b110));
        assert_eq!(mask.eval(&[DataValue::from(1), DataValue::Null]).unwrap(), DataValue::Int64(0b001));

        let bit = |bit| BoundExpr {
            kind: BoundExprKind::MaskBit { key: 0, bit },
            return_type: DataType::Bool,
        };
        assert!(bit(1).eval_filter(&[DataValue::Int64(0b110)]).unwrap());
        assert!(!bit(0).eval_filter(&[DataValue::Int64(0b110)]).unwrap());
    }

    #[test]
    fn division_by_zero() {
        let div = BoundExpr {
            kind: BoundExprKind::BinaryOp {
                op: BinaryOp::Divide,
                left: Box::new(col(0)),
                right: Box::new(BoundExpr::constant(0.into())),
            },
            return_type: DataType::Int,
        };
        assert_eq!(div.eval(&[DataValue::from(1)]), Err(ConvertError::DivisionByZero));
        assert_eq!(div.eval(&[DataValue::Null]).unwrap(), DataValue::Null);
    }
}
