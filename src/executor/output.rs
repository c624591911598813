// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::cmp::Ordering;

use super::{ProgressToken, Result};
use crate::binder::{BindError, BoundExpr, BoundSelect};
use crate::types::{DataValue, Row};

/// Turns aggregate snapshots into result rows.
///
/// Snapshot rows are tagged with the partition and progress of the batch,
/// then the output expressions and sort keys are evaluated over
/// `[group keys.., aggregates.., partition, progress]`.
#[derive(Debug, Clone)]
pub struct OutputShaper {
    outputs: Vec<BoundExpr>,
    order_by: Vec<SortKey>,
}

#[derive(Debug, Clone)]
struct SortKey {
    expr: BoundExpr,
    desc: bool,
    nulls_first: bool,
}

impl OutputShaper {
    /// Outputs already resolved against the snapshot layout, kept in snapshot order.
    pub fn new(outputs: Vec<BoundExpr>) -> Self {
        OutputShaper {
            outputs,
            order_by: vec![],
        }
    }

    pub fn for_select(select: &BoundSelect) -> Result<Self, BindError> {
        let layout = select.layout();
        let outputs = select
            .outputs
            .iter()
            .map(|e| e.resolve(&layout))
            .collect::<Result<_, _>>()?;
        let order_by = select
            .order_by
            .iter()
            .map(|o| {
                Ok(SortKey {
                    expr: o.expr.resolve(&layout)?,
                    desc: o.desc,
                    nulls_first: o.nulls_first,
                })
            })
            .collect::<Result<_, BindError>>()?;
        Ok(OutputShaper { outputs, order_by })
    }

    /// Shape the snapshot of a batch. Rows keep the snapshot order unless ORDER BY says otherwise.
    pub fn rows(&self, snapshot: Vec<Row>, token: &ProgressToken) -> Result<Vec<Row>> {
        let mut shaped = Vec::with_capacity(snapshot.len());
        for mut row in snapshot {
            row.push(token.partition_value());
            row.push(token.progress_value());
            let keys = self
                .order_by
                .iter()
                .map(|k| k.expr.eval(&row))
                .collect::<Result<Vec<_>, _>>()?;
            let output = self
                .outputs
                .iter()
                .map(|e| e.eval(&row))
                .collect::<Result<Row, _>>()?;
            shaped.push((keys, output));
        }
        if !self.order_by.is_empty() {
            // stable, ties keep the group key order
            shaped.sort_by(|(a, _), (b, _)| {
                self.order_by
                    .iter()
                    .zip(a.iter().zip(b))
                    .map(|(key, (a, b))| key.compare(a, b))
                    .find(|o| o.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }
        Ok(shaped.into_iter().map(|(_, row)| row).collect())
    }
}

impl SortKey {
    fn compare(&self, a: &DataValue, b: &DataValue) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) if self.nulls_first => return Ordering::Less,
            (true, false) => return Ordering::Greater,
            (false, true) if self.nulls_first => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }
        let ord = match a.sql_cmp(b) {
            Ok(Some(ord)) => ord,
            _ => a.cmp(b),
        };
        if self.desc {
            ord.reverse()
        } else {
            ord
        }
    }
}
