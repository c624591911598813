// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use parse_display::Display;

use super::*;
use crate::catalog::TableCatalog;
use crate::parser::{
    BinaryOperator, Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, Ident,
    UnaryOperator, Value,
};
use crate::types::{DataType, DataValue};

/// A bound expression.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundExpr {
    pub kind: BoundExprKind,
    pub return_type: DataType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundExprKind {
    Constant(DataValue),
    /// A column of the input row.
    InputRef(usize),
    BinaryOp {
        op: BinaryOp,
        left: Box<BoundExpr>,
        right: Box<BoundExpr>,
    },
    UnaryOp {
        op: UnaryOp,
        expr: Box<BoundExpr>,
    },
    IsNull {
        expr: Box<BoundExpr>,
        negated: bool,
    },
    InList {
        expr: Box<BoundExpr>,
        list: Vec<BoundExpr>,
        negated: bool,
    },
    /// Cast to `return_type`.
    Cast(Box<BoundExpr>),
    /// The i-th group key of an aggregate output.
    GroupRef(usize),
    /// The i-th aggregate of an aggregate output.
    AggRef(usize),
    Pseudo(PseudoColumn),
    /// An integer with bit `i` set when `terms[i]` is true.
    FutureMask(Vec<BoundExpr>),
    /// Whether the bit is set in the mask stored in column `key`.
    MaskBit { key: usize, bit: usize },
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Multiply,
    #[display("/")]
    Divide,
    #[display("%")]
    Modulo,
    #[display("=")]
    Eq,
    #[display("<>")]
    NotEq,
    #[display("<")]
    Lt,
    #[display("<=")]
    LtEq,
    #[display(">")]
    Gt,
    #[display(">=")]
    GtEq,
    #[display("AND")]
    And,
    #[display("OR")]
    Or,
}

impl BinaryOp {
    pub const fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            Self::Plus | Self::Minus | Self::Multiply | Self::Divide | Self::Modulo
        )
    }

    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq
        )
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    #[display("-")]
    Neg,
    #[display("NOT")]
    Not,
}

/// Values attached to every output row by the progressive executor.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[display(style = "snake_case")]
pub enum PseudoColumn {
    /// `PROGRESSIVE_PARTITION()`: the chunk index of the batch.
    ProgressivePartition,
    /// `PROGRESSIVE_PROGRESS()`: the fraction of chunks consumed.
    ProgressiveProgress,
}

impl PseudoColumn {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "progressive_partition" => Some(Self::ProgressivePartition),
            "progressive_progress" => Some(Self::ProgressiveProgress),
            _ => None,
        }
    }

    pub const fn return_type(&self) -> DataType {
        match self {
            Self::ProgressivePartition => DataType::Int,
            Self::ProgressiveProgress => DataType::Real,
        }
    }
}

impl BoundExpr {
    pub fn constant(value: DataValue) -> Self {
        BoundExpr {
            return_type: value.data_type(),
            kind: BoundExprKind::Constant(value),
        }
    }

    pub fn input_ref(index: usize, return_type: DataType) -> Self {
        BoundExpr {
            kind: BoundExprKind::InputRef(index),
            return_type,
        }
    }

    /// Returns true if the expression reads any column of the input row.
    pub fn has_input_ref(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            found |= matches!(e.kind, BoundExprKind::InputRef(_) | BoundExprKind::MaskBit { .. })
        });
        found
    }

    /// Returns true if the expression refers to a group key, an aggregate or a pseudo-column.
    pub fn has_output_ref(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            found |= matches!(
                e.kind,
                BoundExprKind::GroupRef(_) | BoundExprKind::AggRef(_) | BoundExprKind::Pseudo(_)
            )
        });
        found
    }

    /// Group keys referred by the expression.
    pub fn group_refs(&self) -> Vec<usize> {
        let mut refs = vec![];
        self.visit(&mut |e| {
            if let BoundExprKind::GroupRef(i) = e.kind {
                refs.push(i);
            }
        });
        refs
    }

    /// Visit the expression tree in pre-order.
    pub fn visit(&self, f: &mut impl FnMut(&BoundExpr)) {
        use BoundExprKind as K;
        f(self);
        match &self.kind {
            K::BinaryOp { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            K::UnaryOp { expr, .. } | K::IsNull { expr, .. } | K::Cast(expr) => expr.visit(f),
            K::InList { expr, list, .. } => {
                expr.visit(f);
                list.iter().for_each(|e| e.visit(f));
            }
            K::FutureMask(terms) => terms.iter().for_each(|e| e.visit(f)),
            K::Constant(_)
            | K::InputRef(_)
            | K::GroupRef(_)
            | K::AggRef(_)
            | K::Pseudo(_)
            | K::MaskBit { .. } => {}
        }
    }

    /// Rebuild the expression bottom-up. `f` may replace a node before its children are visited.
    pub fn rewrite<E>(
        self,
        f: &mut impl FnMut(BoundExpr) -> Result<Rewrite, E>,
    ) -> Result<BoundExpr, E> {
        use BoundExprKind as K;
        let expr = match f(self)? {
            Rewrite::Done(expr) => return Ok(expr),
            Rewrite::Continue(expr) => expr,
        };
        let kind = match expr.kind {
            K::BinaryOp { op, left, right } => K::BinaryOp {
                op,
                left: Box::new(left.rewrite(f)?),
                right: Box::new(right.rewrite(f)?),
            },
            K::UnaryOp { op, expr } => K::UnaryOp {
                op,
                expr: Box::new(expr.rewrite(f)?),
            },
            K::IsNull { expr, negated } => K::IsNull {
                expr: Box::new(expr.rewrite(f)?),
                negated,
            },
            K::InList {
                expr,
                list,
                negated,
            } => K::InList {
                expr: Box::new(expr.rewrite(f)?),
                list: list
                    .into_iter()
                    .map(|e| e.rewrite(f))
                    .collect::<Result<_, _>>()?,
                negated,
            },
            K::Cast(expr) => K::Cast(Box::new(expr.rewrite(f)?)),
            K::FutureMask(terms) => K::FutureMask(
                terms
                    .into_iter()
                    .map(|e| e.rewrite(f))
                    .collect::<Result<_, _>>()?,
            ),
            kind => kind,
        };
        Ok(BoundExpr {
            kind,
            return_type: expr.return_type,
        })
    }

    /// Resolve group keys, aggregates and pseudo-columns into columns of an output row.
    pub fn resolve(&self, layout: &OutputLayout) -> Result<BoundExpr, BindError> {
        self.clone().rewrite(&mut |e| -> Result<Rewrite, BindError> {
            let index = match e.kind {
                BoundExprKind::GroupRef(i) => layout
                    .groups
                    .get(i)
                    .copied()
                    .flatten()
                    .ok_or_else(|| {
                        ErrorKind::InvalidExpression(format!("group key #{i} is not in the output"))
                    })?,
                BoundExprKind::AggRef(i) => layout.agg_offset + i,
                BoundExprKind::Pseudo(PseudoColumn::ProgressivePartition) => layout.partition(),
                BoundExprKind::Pseudo(PseudoColumn::ProgressiveProgress) => layout.progress(),
                _ => return Ok(Rewrite::Continue(e)),
            };
            Ok(Rewrite::Done(BoundExpr::input_ref(index, e.return_type)))
        })
    }
}

/// The result of a rewrite step.
pub enum Rewrite {
    /// Replace the node and stop.
    Done(BoundExpr),
    /// Keep rewriting the children.
    Continue(BoundExpr),
}

/// Where group keys, aggregates and pseudo-columns are in an output row:
/// `[group keys.., aggregates.., partition, progress]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    /// Position of each group key, `None` if it is not in the output.
    pub groups: Vec<Option<usize>>,
    pub agg_offset: usize,
    pub agg_count: usize,
}

impl OutputLayout {
    /// A layout keeping the given group keys, in order.
    pub fn new(group_count: usize, active: &[usize], agg_count: usize) -> Self {
        let mut groups = vec![None; group_count];
        for (pos, &i) in active.iter().enumerate() {
            groups[i] = Some(pos);
        }
        OutputLayout {
            groups,
            agg_offset: active.len(),
            agg_count,
        }
    }

    pub fn partition(&self) -> usize {
        self.agg_offset + self.agg_count
    }

    pub fn progress(&self) -> usize {
        self.agg_offset + self.agg_count + 1
    }
}

/// The clause being bound. Decides what an expression may refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Clause {
    Where,
    GroupBy,
    Values,
    AggArgs,
    /// Probe whether an expression is a group key. Never reported.
    Probe,
    Select,
    OrderBy,
}

impl Clause {
    /// Aggregate output clauses refer to group keys and aggregates instead of columns.
    const fn is_output(&self) -> bool {
        matches!(self, Self::Select | Self::OrderBy)
    }

    const fn name(&self) -> &'static str {
        match self {
            Self::Where => "WHERE clause",
            Self::GroupBy => "GROUP BY clause",
            Self::Values => "VALUES",
            Self::AggArgs => "aggregate arguments",
            Self::Probe => "expression",
            Self::Select => "select list",
            Self::OrderBy => "ORDER BY clause",
        }
    }
}

/// Binds expressions of a single-table query.
pub(super) struct ExprBinder<'a> {
    table: Option<&'a TableCatalog>,
    /// The name the table can be qualified with: its alias or its name.
    table_ref: Option<String>,
    pub group_keys: Vec<BoundExpr>,
    pub aggs: Vec<AggCall>,
}

impl<'a> ExprBinder<'a> {
    pub fn new(table: Option<&'a TableCatalog>, alias: Option<String>) -> Self {
        ExprBinder {
            table_ref: alias.or_else(|| table.map(|t| t.name().to_string())),
            table,
            group_keys: vec![],
            aggs: vec![],
        }
    }

    pub fn bind_expr(&mut self, expr: &Expr, clause: Clause) -> Result<BoundExpr, BindError> {
        if clause.is_output() && !self.group_keys.is_empty() {
            if let Ok(bound) = self.bind_expr(expr, Clause::Probe) {
                if let Some(i) = self.group_keys.iter().position(|k| k == &bound) {
                    return Ok(BoundExpr {
                        kind: BoundExprKind::GroupRef(i),
                        return_type: bound.return_type,
                    });
                }
            }
        }
        match expr {
            Expr::Value(v) => Ok(BoundExpr::constant(bind_value(v)?)),
            Expr::Identifier(ident) => self.bind_column_ref(std::slice::from_ref(ident), clause),
            Expr::CompoundIdentifier(idents) => self.bind_column_ref(idents, clause),
            Expr::Nested(expr) => self.bind_expr(expr, clause),
            Expr::BinaryOp { left, op, right } => {
                let left = self.bind_expr(left, clause)?;
                let right = self.bind_expr(right, clause)?;
                bind_binary_op(left, op, right)
            }
            Expr::UnaryOp { op, expr } => {
                let expr = self.bind_expr(expr, clause)?;
                bind_unary_op(op, expr)
            }
            Expr::IsNull(expr) => self.bind_is_null(expr, false, clause),
            Expr::IsNotNull(expr) => self.bind_is_null(expr, true, clause),
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                // a BETWEEN l AND h => a >= l AND a <= h
                let expr = self.bind_expr(expr, clause)?;
                let low = self.bind_expr(low, clause)?;
                let high = self.bind_expr(high, clause)?;
                let ge = bind_binary_op(expr.clone(), &BinaryOperator::GtEq, low)?;
                let le = bind_binary_op(expr, &BinaryOperator::LtEq, high)?;
                let between = bind_binary_op(ge, &BinaryOperator::And, le)?;
                if *negated {
                    bind_unary_op(&UnaryOperator::Not, between)
                } else {
                    Ok(between)
                }
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let expr = self.bind_expr(expr, clause)?;
                let list = list
                    .iter()
                    .map(|e| self.bind_expr(e, clause))
                    .collect::<Result<Vec<_>, _>>()?;
                for item in &list {
                    if expr.return_type.union(&item.return_type).is_none() {
                        return Err(ErrorKind::TypeError(format!(
                            "cannot compare {} with {}",
                            expr.return_type, item.return_type
                        ))
                        .into());
                    }
                }
                Ok(BoundExpr {
                    kind: BoundExprKind::InList {
                        expr: Box::new(expr),
                        list,
                        negated: *negated,
                    },
                    return_type: DataType::Bool,
                })
            }
            Expr::Cast {
                expr, data_type, ..
            } => {
                let expr = self.bind_expr(expr, clause)?;
                let ty: DataType = data_type.to_string().parse()?;
                Ok(match expr.kind {
                    BoundExprKind::Constant(v) => BoundExpr::constant(v.cast(&ty)?),
                    _ => BoundExpr {
                        kind: BoundExprKind::Cast(Box::new(expr)),
                        return_type: ty,
                    },
                })
            }
            Expr::Function(func) => self.bind_function(func, clause),
            _ => Err(ErrorKind::Todo(format!("expression {expr}")).into()),
        }
    }

    fn bind_is_null(
        &mut self,
        expr: &Expr,
        negated: bool,
        clause: Clause,
    ) -> Result<BoundExpr, BindError> {
        Ok(BoundExpr {
            kind: BoundExprKind::IsNull {
                expr: Box::new(self.bind_expr(expr, clause)?),
                negated,
            },
            return_type: DataType::Bool,
        })
    }

    fn bind_column_ref(&mut self, idents: &[Ident], clause: Clause) -> Result<BoundExpr, BindError> {
        let (qualifier, column) = match idents {
            [column] => (None, column),
            [table, column] => (Some(ident_name(table)), column),
            _ => {
                let name = idents.iter().map(|i| i.value.as_str()).collect::<Vec<_>>();
                return Err(ErrorKind::InvalidColumn(name.join(".")).into());
            }
        };
        let name = ident_name(column);
        if let Some(qualifier) = &qualifier {
            if self.table_ref.as_ref() != Some(qualifier) {
                return Err(ErrorKind::InvalidTable(qualifier.clone()).into());
            }
        }
        let table = self
            .table
            .ok_or_else(|| ErrorKind::InvalidColumn(name.clone()))?;
        let index = table
            .column_index(&name)
            .ok_or_else(|| ErrorKind::InvalidColumn(name.clone()))?;
        if clause.is_output() {
            return Err(ErrorKind::ColumnNotInAgg(name).into());
        }
        Ok(BoundExpr::input_ref(
            index,
            table.columns()[index].datatype(),
        ))
    }

    fn bind_function(&mut self, func: &Function, clause: Clause) -> Result<BoundExpr, BindError> {
        let name = func.name.to_string().to_lowercase();
        let args = function_args(func)?;

        if let Some(pseudo) = PseudoColumn::from_name(&name) {
            if !args.is_empty() {
                return Err(ErrorKind::InvalidExpression(format!("{name} takes no arguments")).into());
            }
            if !clause.is_output() {
                return Err(ErrorKind::PseudoColumnNotAllowed(clause.name()).into());
            }
            return Ok(BoundExpr {
                kind: BoundExprKind::Pseudo(pseudo),
                return_type: pseudo.return_type(),
            });
        }

        let kind = AggKind::from_name(&name)
            .ok_or_else(|| ErrorKind::UnsupportedAggregate(func.to_string()))?;
        if distinct(func) {
            return Err(ErrorKind::UnsupportedAggregate(func.to_string()).into());
        }
        if func.filter.is_some() || func.over.is_some() {
            return Err(ErrorKind::Todo(format!("{func}")).into());
        }
        match clause {
            Clause::AggArgs => return Err(ErrorKind::NestedAgg.into()),
            c if !c.is_output() => return Err(ErrorKind::AggNotAllowed(c.name()).into()),
            _ => {}
        }

        let call = match (kind, args.as_slice()) {
            (AggKind::Count, [FunctionArgExpr::Wildcard]) | (AggKind::Count, []) => {
                AggCall::new(AggKind::RowCount, None)?
            }
            (kind, [FunctionArgExpr::Expr(arg)]) => {
                let arg = self.bind_expr(arg, Clause::AggArgs)?;
                AggCall::new(kind, Some(arg))?
            }
            _ => {
                return Err(ErrorKind::InvalidExpression(format!(
                    "invalid arguments of {func}"
                ))
                .into())
            }
        };
        let return_type = call.return_type;
        let index = match self.aggs.iter().position(|a| a == &call) {
            Some(i) => i,
            None => {
                self.aggs.push(call);
                self.aggs.len() - 1
            }
        };
        Ok(BoundExpr {
            kind: BoundExprKind::AggRef(index),
            return_type,
        })
    }
}

fn function_args(func: &Function) -> Result<Vec<FunctionArgExpr>, BindError> {
    match &func.args {
        FunctionArguments::None => Ok(vec![]),
        FunctionArguments::List(list) => list
            .args
            .iter()
            .map(|arg| match arg {
                FunctionArg::Unnamed(arg) => Ok(arg.clone()),
                _ => Err(ErrorKind::Todo(format!("named argument in {func}")).into()),
            })
            .collect(),
        FunctionArguments::Subquery(_) => Err(ErrorKind::Todo("subquery".into()).into()),
    }
}

fn distinct(func: &Function) -> bool {
    match &func.args {
        FunctionArguments::List(list) => matches!(
            list.duplicate_treatment,
            Some(crate::parser::DuplicateTreatment::Distinct)
        ),
        _ => false,
    }
}

fn bind_value(v: &Value) -> Result<DataValue, BindError> {
    Ok(match v {
        Value::Number(n, _) => {
            if let Ok(int) = n.parse::<i64>() {
                DataValue::Int64(int)
            } else if let Ok(float) = n.parse::<f64>() {
                DataValue::from(float)
            } else {
                return Err(ErrorKind::InvalidExpression(format!("invalid number {n}")).into());
            }
        }
        Value::SingleQuotedString(s) => DataValue::String(s.clone()),
        Value::Boolean(b) => DataValue::Bool(*b),
        Value::Null => DataValue::Null,
        v => return Err(ErrorKind::Todo(format!("value {v}")).into()),
    })
}

pub(super) fn bind_binary_op(
    left: BoundExpr,
    op: &BinaryOperator,
    right: BoundExpr,
) -> Result<BoundExpr, BindError> {
    let op = match op {
        BinaryOperator::Plus => BinaryOp::Plus,
        BinaryOperator::Minus => BinaryOp::Minus,
        BinaryOperator::Multiply => BinaryOp::Multiply,
        BinaryOperator::Divide => BinaryOp::Divide,
        BinaryOperator::Modulo => BinaryOp::Modulo,
        BinaryOperator::Eq => BinaryOp::Eq,
        BinaryOperator::NotEq => BinaryOp::NotEq,
        BinaryOperator::Lt => BinaryOp::Lt,
        BinaryOperator::LtEq => BinaryOp::LtEq,
        BinaryOperator::Gt => BinaryOp::Gt,
        BinaryOperator::GtEq => BinaryOp::GtEq,
        BinaryOperator::And => BinaryOp::And,
        BinaryOperator::Or => BinaryOp::Or,
        op => return Err(ErrorKind::Todo(format!("operator {op}")).into()),
    };
    let (lt, rt) = (left.return_type, right.return_type);
    let type_error = || -> BindError {
        ErrorKind::TypeError(format!("cannot apply {op} to {lt} and {rt}")).into()
    };
    let return_type = if op.is_arithmetic() {
        match lt.union(&rt) {
            Some(t @ (DataType::Int | DataType::Real | DataType::Null)) => t,
            _ => return Err(type_error()),
        }
    } else if op.is_comparison() {
        lt.union(&rt).ok_or_else(type_error)?;
        DataType::Bool
    } else {
        if !matches!(lt, DataType::Bool | DataType::Null)
            || !matches!(rt, DataType::Bool | DataType::Null)
        {
            return Err(type_error());
        }
        DataType::Bool
    };
    Ok(BoundExpr {
        kind: BoundExprKind::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        return_type,
    })
}

pub(super) fn bind_unary_op(op: &UnaryOperator, expr: BoundExpr) -> Result<BoundExpr, BindError> {
    let ty = expr.return_type;
    let (op, return_type) = match op {
        UnaryOperator::Plus if ty.is_numeric() || ty == DataType::Null => return Ok(expr),
        UnaryOperator::Minus if ty.is_numeric() || ty == DataType::Null => (UnaryOp::Neg, ty),
        UnaryOperator::Not if matches!(ty, DataType::Bool | DataType::Null) => {
            (UnaryOp::Not, DataType::Bool)
        }
        op => return Err(ErrorKind::TypeError(format!("cannot apply {op} to {ty}")).into()),
    };
    Ok(BoundExpr {
        kind: BoundExprKind::UnaryOp {
            op,
            expr: Box::new(expr),
        },
        return_type,
    })
}
