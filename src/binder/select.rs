// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use super::*;
use crate::catalog::TableCatalogRef;
use crate::parser::{
    BinaryOperator, Expr, GroupByExpr, OrderByExpr, Query, Select, SelectItem, SetExpr,
    TableFactor, Value,
};
use crate::types::DataType;

/// A bound aggregate query over a single table.
///
/// Rows of the table are filtered by `filter`, grouped by `group_keys`
/// and aggregated by `aggs`. `outputs` and `order_by` refer to group keys,
/// aggregates and pseudo-columns, see [`OutputLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSelect {
    pub table: TableCatalogRef,
    pub filter: Option<BoundExpr>,
    pub group_keys: Vec<BoundExpr>,
    pub aggs: Vec<AggCall>,
    pub outputs: Vec<BoundExpr>,
    pub output_names: Vec<String>,
    pub order_by: Vec<BoundOrderBy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundOrderBy {
    pub expr: BoundExpr,
    pub desc: bool,
    /// Defaults to NULLs first for ascending order, last for descending.
    pub nulls_first: bool,
}

impl BoundSelect {
    /// Layout of the output rows when every group key is kept.
    pub fn layout(&self) -> OutputLayout {
        let active: Vec<usize> = (0..self.group_keys.len()).collect();
        OutputLayout::new(self.group_keys.len(), &active, self.aggs.len())
    }

    pub fn output_types(&self) -> Vec<DataType> {
        self.outputs.iter().map(|e| e.return_type).collect()
    }

    /// Returns true if any output or sort key is a pseudo-column.
    pub fn has_pseudo_column(&self) -> bool {
        self.outputs
            .iter()
            .chain(self.order_by.iter().map(|o| &o.expr))
            .any(|e| {
                let mut found = false;
                e.visit(&mut |e| found |= matches!(e.kind, BoundExprKind::Pseudo(_)));
                found
            })
    }
}

impl Binder {
    /// Bind a single-table aggregate query.
    pub(super) fn bind_select(&self, query: &Query) -> Result<BoundSelect, BindError> {
        let select = simple_select(query)?;
        let (table, alias) = self.bind_from(select)?;
        let mut binder = ExprBinder::new(Some(table.as_ref()), alias);

        let filter = match &select.selection {
            Some(expr) => {
                let filter = binder.bind_expr(expr, Clause::Where)?;
                if !matches!(filter.return_type, DataType::Bool | DataType::Null) {
                    return Err(ErrorKind::TypeError(format!(
                        "WHERE condition must be boolean, found {}",
                        filter.return_type
                    ))
                    .into());
                }
                Some(filter)
            }
            None => None,
        };

        binder.group_keys = match &select.group_by {
            GroupByExpr::Expressions(exprs, modifiers) => {
                if !modifiers.is_empty() {
                    return Err(ErrorKind::Todo("GROUP BY modifiers".into()).into());
                }
                exprs
                    .iter()
                    .map(|e| binder.bind_expr(e, Clause::GroupBy))
                    .collect::<Result<_, _>>()?
            }
            GroupByExpr::All(_) => return Err(ErrorKind::Todo("GROUP BY ALL".into()).into()),
        };

        let mut outputs = vec![];
        let mut output_names = vec![];
        for item in &select.projection {
            let (expr, alias) = match item {
                SelectItem::UnnamedExpr(expr) => (expr, None),
                SelectItem::ExprWithAlias { expr, alias } => (expr, Some(ident_name(alias))),
                _ => {
                    return Err(ErrorKind::InvalidExpression(format!(
                        "{item} is not allowed in an aggregate query"
                    ))
                    .into())
                }
            };
            outputs.push(binder.bind_expr(expr, Clause::Select)?);
            output_names.push(alias.unwrap_or_else(|| output_name(expr)));
        }

        let mut order_by = vec![];
        if let Some(order) = &query.order_by {
            for OrderByExpr {
                expr,
                asc,
                nulls_first,
                ..
            } in &order.exprs
            {
                let expr = match order_by_output(expr, &outputs, &output_names) {
                    Some(output) => output,
                    None => binder.bind_expr(expr, Clause::OrderBy)?,
                };
                let desc = *asc == Some(false);
                order_by.push(BoundOrderBy {
                    expr,
                    desc,
                    nulls_first: nulls_first.unwrap_or(!desc),
                });
            }
        }

        let (group_keys, aggs) = (binder.group_keys, binder.aggs);
        Ok(BoundSelect {
            table,
            filter,
            group_keys,
            aggs,
            outputs,
            output_names,
            order_by,
        })
    }

    /// Resolve the single table in FROM.
    pub(super) fn bind_from(
        &self,
        select: &Select,
    ) -> Result<(TableCatalogRef, Option<String>), BindError> {
        let [from] = select.from.as_slice() else {
            return Err(ErrorKind::Todo("query over multiple tables".into()).into());
        };
        if !from.joins.is_empty() {
            return Err(ErrorKind::Todo("JOIN".into()).into());
        }
        let TableFactor::Table { name, alias, .. } = &from.relation else {
            return Err(ErrorKind::Todo(format!("FROM {}", from.relation)).into());
        };
        let name = object_name(name)?;
        let table = self
            .catalog
            .get_table(&name)
            .ok_or_else(|| ErrorKind::InvalidTable(name))?;
        Ok((table, alias.as_ref().map(|a| ident_name(&a.name))))
    }
}

/// The SELECT of a query without set operations, CTEs, DISTINCT, HAVING or LIMIT.
pub(super) fn simple_select(query: &Query) -> Result<&Select, BindError> {
    if query.with.is_some() {
        return Err(ErrorKind::Todo("WITH".into()).into());
    }
    if query.limit.is_some() || query.offset.is_some() {
        return Err(ErrorKind::Todo("LIMIT and OFFSET".into()).into());
    }
    let SetExpr::Select(select) = &*query.body else {
        return Err(ErrorKind::Todo(format!("query {}", query.body)).into());
    };
    if select.distinct.is_some() {
        return Err(ErrorKind::Todo("DISTINCT".into()).into());
    }
    if select.having.is_some() {
        return Err(ErrorKind::Todo("HAVING".into()).into());
    }
    Ok(select)
}

/// An ORDER BY item naming an output by its alias or position.
fn order_by_output(expr: &Expr, outputs: &[BoundExpr], names: &[String]) -> Option<BoundExpr> {
    match expr {
        Expr::Identifier(ident) => {
            let name = ident_name(ident);
            let mut found = names.iter().enumerate().filter(|(_, n)| **n == name);
            // output names shadow columns, ambiguous names fall back to columns
            match (found.next(), found.next()) {
                (Some((i, _)), None) => Some(outputs[i].clone()),
                _ => None,
            }
        }
        Expr::Value(Value::Number(n, _)) => {
            let pos: usize = n.parse().ok()?;
            outputs.get(pos.checked_sub(1)?).cloned()
        }
        _ => None,
    }
}

/// The default name of an output column.
fn output_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident_name(ident),
        Expr::CompoundIdentifier(idents) => idents.last().map(ident_name).unwrap_or_default(),
        Expr::Function(func) => func.name.to_string().to_lowercase(),
        Expr::Nested(expr) => output_name(expr),
        _ => "?column?".into(),
    }
}

/// Split a condition into `OR` of `AND`s at the top level, without looking into parentheses.
pub(super) fn where_terms(expr: &Expr) -> Vec<Vec<&Expr>> {
    fn split<'a>(expr: &'a Expr, op: &BinaryOperator, out: &mut Vec<&'a Expr>) {
        match expr {
            Expr::BinaryOp { left, op: o, right } if o == op => {
                split(left, op, out);
                split(right, op, out);
            }
            expr => out.push(expr),
        }
    }
    let mut disjuncts = vec![];
    split(expr, &BinaryOperator::Or, &mut disjuncts);
    disjuncts
        .into_iter()
        .map(|d| {
            let mut conjuncts = vec![];
            split(d, &BinaryOperator::And, &mut conjuncts);
            conjuncts
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_query;

    #[test]
    fn split_where() {
        let query = parse_query("SELECT 1 FROM t WHERE (a = 1 OR b = 2) OR c = 3 AND d = 4 OR e").unwrap();
        let select = simple_select(&query).unwrap();
        let terms = where_terms(select.selection.as_ref().unwrap());
        let shape: Vec<usize> = terms.iter().map(|t| t.len()).collect();
        assert_eq!(shape, vec![1, 2, 1]);
    }
}
