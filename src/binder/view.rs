// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Binding of progressive views and their `WITH FUTURE` reads.
//!
//! A view keeps a live aggregate state grouped by its state keys:
//! the GROUP BY expressions, followed by a mask of the FUTURE WHERE terms
//! if there is any. A read filters the groups of the state by predicates
//! over these keys, and merges the groups on the keys it asks for.

use std::collections::BTreeSet;

use super::select::{simple_select, where_terms};
use super::*;
use crate::parser::{GroupByExpr, SelectItem, TableFactor};
use crate::types::DataType;

/// The mask of FUTURE terms is a 64-bit integer.
const MAX_FUTURE_TERMS: usize = 63;

/// A bound progressive view definition.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundView {
    /// The definition. `select.group_keys` are the state keys.
    pub select: BoundSelect,
    /// Number of GROUP BY expressions, the leading state keys.
    pub group_count: usize,
    /// Indexes of the GROUP BY expressions tagged with FUTURE.
    pub future_groups: BTreeSet<usize>,
    /// WHERE terms tagged with FUTURE. Bit `i` of the mask key is `future_terms[i]`.
    pub future_terms: Vec<BoundExpr>,
    /// Position of the mask among the state keys.
    pub mask_key: Option<usize>,
    /// For each output, the FUTURE group key it shows.
    pub future_outputs: Vec<Option<usize>>,
}

/// A bound read of a progressive view.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundViewRead {
    pub view: String,
    /// Predicate over the state keys of the view.
    pub filter: Option<BoundExpr>,
    /// State keys to group on, in order.
    pub active: Vec<usize>,
    /// Outputs over `[active keys.., aggregates.., partition, progress]`.
    pub outputs: Vec<BoundExpr>,
    pub output_names: Vec<String>,
}

impl BoundViewRead {
    pub fn output_types(&self) -> Vec<DataType> {
        self.outputs.iter().map(|e| e.return_type).collect()
    }
}

impl Binder {
    pub(super) fn bind_view_definition(
        &self,
        query: &Query,
        futures: &FutureMarkers,
    ) -> Result<BoundView> {
        if query.order_by.is_some() {
            return Err(ErrorKind::Todo("ORDER BY in a progressive view".into()).into());
        }
        let mut select = self.bind_select(query)?;
        let group_count = select.group_keys.len();
        let invalid = |msg: String| -> BindError { ErrorKind::InvalidFuture(msg).into() };

        // FUTURE group keys
        for &i in &futures.group_by {
            if i >= group_count {
                return Err(invalid(format!("GROUP BY item #{} does not exist", i + 1)));
            }
        }

        // FUTURE where terms, compiled into a mask key
        let mut future_terms = vec![];
        if !futures.where_terms.is_empty() {
            let stmt = simple_select(query)?;
            let selection = stmt
                .selection
                .as_ref()
                .ok_or_else(|| invalid("FUTURE term without WHERE".into()))?;
            let terms = where_terms(selection);
            let (_, alias) = self.bind_from(stmt)?;
            let mut binder = ExprBinder::new(Some(select.table.as_ref()), alias);
            for &(d, c) in &futures.where_terms {
                let term = terms
                    .get(d)
                    .and_then(|t| t.get(c))
                    .ok_or_else(|| invalid(format!("WHERE term ({d}, {c}) does not exist")))?;
                future_terms.push(binder.bind_expr(term, Clause::Where)?);
            }
        }
        if future_terms.len() > MAX_FUTURE_TERMS {
            return Err(invalid(format!(
                "at most {MAX_FUTURE_TERMS} WHERE terms can be tagged FUTURE"
            )));
        }
        let mask_key = if future_terms.is_empty() {
            None
        } else {
            select.group_keys.push(BoundExpr {
                kind: BoundExprKind::FutureMask(future_terms.clone()),
                return_type: DataType::Int,
            });
            Some(group_count)
        };

        // FUTURE select items must show a FUTURE group key
        let mut future_outputs = vec![None; select.outputs.len()];
        for &i in &futures.select_items {
            let output = select
                .outputs
                .get(i)
                .ok_or_else(|| invalid(format!("select item #{} does not exist", i + 1)))?;
            match output.kind {
                BoundExprKind::GroupRef(k) if futures.group_by.contains(&k) => {
                    future_outputs[i] = Some(k);
                }
                _ => {
                    return Err(invalid(format!(
                        "select item {:?} is not a FUTURE group key",
                        select.output_names[i]
                    )))
                }
            }
        }
        for (i, output) in select.outputs.iter().enumerate() {
            if future_outputs[i].is_none()
                && output
                    .group_refs()
                    .iter()
                    .any(|k| futures.group_by.contains(k))
            {
                return Err(invalid(format!(
                    "select item {:?} uses a FUTURE group key and must be tagged FUTURE",
                    select.output_names[i]
                )));
            }
        }

        Ok(BoundView {
            select,
            group_count,
            future_groups: futures.group_by.clone(),
            future_terms,
            mask_key,
            future_outputs,
        })
    }

    /// Bind `SELECT * FROM v [WHERE ...] [GROUP BY ...]` against the view definition.
    pub fn bind_view_read(&self, view: &BoundView, query: &Query) -> Result<BoundViewRead> {
        if query.order_by.is_some() {
            return Err(ErrorKind::Todo("ORDER BY in a view read".into()).into());
        }
        let stmt = simple_select(query)?;
        let name = view_name(query)?;
        if !matches!(stmt.projection.as_slice(), [SelectItem::Wildcard(_)]) {
            return Err(ErrorKind::Todo("a view read other than SELECT *".into()).into());
        }
        let table = &view.select.table;
        let mut binder = ExprBinder::new(Some(table.as_ref()), None);

        let filter = match &stmt.selection {
            Some(expr) => {
                let bound = binder.bind_expr(expr, Clause::Where)?;
                Some(view.rewrite_read_filter(bound, &expr.to_string())?)
            }
            None => None,
        };

        let mut requested = BTreeSet::new();
        match &stmt.group_by {
            GroupByExpr::Expressions(exprs, modifiers) if modifiers.is_empty() => {
                for expr in exprs {
                    let bound = binder.bind_expr(expr, Clause::GroupBy)?;
                    let key = view.select.group_keys[..view.group_count]
                        .iter()
                        .position(|k| k == &bound)
                        .ok_or_else(|| {
                            ErrorKind::InvalidFuture(format!(
                                "{expr} is not a GROUP BY item of view {name:?}"
                            ))
                        })?;
                    requested.insert(key);
                }
            }
            _ => return Err(ErrorKind::Todo(format!("GROUP BY {}", stmt.group_by)).into()),
        }
        let active: Vec<usize> = (0..view.group_count)
            .filter(|k| !view.future_groups.contains(k) || requested.contains(k))
            .collect();

        let layout = OutputLayout::new(view.select.group_keys.len(), &active, view.select.aggs.len());
        let mut outputs = vec![];
        let mut output_names = vec![];
        for (i, output) in view.select.outputs.iter().enumerate() {
            if let Some(k) = view.future_outputs[i] {
                if !active.contains(&k) {
                    continue;
                }
            }
            outputs.push(output.resolve(&layout)?);
            output_names.push(view.select.output_names[i].clone());
        }

        Ok(BoundViewRead {
            view: name,
            filter,
            active,
            outputs,
            output_names,
        })
    }
}

impl BoundView {
    /// Rewrite a read predicate over table columns into one over the state keys.
    ///
    /// A FUTURE term becomes a bit test on the mask key, and a GROUP BY
    /// expression becomes a reference to its key. Any other column access
    /// can not be answered from the state.
    fn rewrite_read_filter(&self, filter: BoundExpr, sql: &str) -> Result<BoundExpr> {
        filter.rewrite(&mut |e| -> Result<Rewrite> {
            if let (Some(mask), Some(bit)) = (
                self.mask_key,
                self.future_terms.iter().position(|t| t == &e),
            ) {
                return Ok(Rewrite::Done(BoundExpr {
                    kind: BoundExprKind::MaskBit { key: mask, bit },
                    return_type: DataType::Bool,
                }));
            }
            if let Some(key) = self.select.group_keys[..self.group_count]
                .iter()
                .position(|k| k == &e)
            {
                return Ok(Rewrite::Done(BoundExpr::input_ref(key, e.return_type)));
            }
            if let BoundExprKind::InputRef(i) = e.kind {
                let column = self.select.table.columns()[i].name().to_string();
                return Err(ErrorKind::InvalidFuture(format!(
                    "{sql} reads column {column:?}, which is neither a FUTURE term nor a GROUP BY item"
                ))
                .into());
            }
            Ok(Rewrite::Continue(e))
        })
    }
}

/// The view name in `FROM`.
pub fn view_name(query: &Query) -> Result<String> {
    let stmt = simple_select(query)?;
    match stmt.from.as_slice() {
        [from] if from.joins.is_empty() => match &from.relation {
            TableFactor::Table { name, .. } => object_name(name),
            relation => Err(ErrorKind::Todo(format!("FROM {relation}")).into()),
        },
        _ => Err(ErrorKind::Todo("a view read over multiple relations".into()).into()),
    }
}
