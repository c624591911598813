// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Mergeable aggregation states, and the partial aggregate state of a query.

use std::collections::HashMap;
use std::sync::Arc;

use enum_dispatch::enum_dispatch;
use smallvec::SmallVec;

use super::{ExecutorError, Result};
use crate::binder::{AggCall, AggKind, BoundExpr};
use crate::types::{ConvertError, DataValue, Row};

mod avg;
mod count;
mod min_max;
mod sum;
mod variance;

pub use self::avg::*;
pub use self::count::*;
pub use self::min_max::*;
pub use self::sum::*;
pub use self::variance::*;

/// `AggregationState` records the state of an aggregation.
///
/// States over disjoint sets of rows can be merged, in any order.
#[enum_dispatch]
pub trait AggregationState {
    /// Absorb one value. `NULL` is ignored except by `COUNT(*)`.
    fn update(&mut self, value: &DataValue) -> Result<()>;

    /// Combine with a state of the same aggregation over other rows.
    fn merge(&mut self, other: &AggState) -> Result<()>;

    fn output(&self) -> DataValue;
}

/// The state of one aggregate call.
#[enum_dispatch(AggregationState)]
#[derive(Debug, Clone, PartialEq)]
pub enum AggState {
    Sum(SumAggregationState),
    Count(CountAggregationState),
    Avg(AvgAggregationState),
    MinMax(MinMaxAggregationState),
    Variance(VarianceAggregationState),
}

impl AggState {
    /// The initial state of an aggregate call.
    pub fn new(call: &AggCall) -> Self {
        match call.kind {
            AggKind::Sum => SumAggregationState::new().into(),
            AggKind::Count => CountAggregationState::new(false).into(),
            AggKind::RowCount => CountAggregationState::new(true).into(),
            AggKind::Avg => AvgAggregationState::new().into(),
            AggKind::Min => MinMaxAggregationState::new(true).into(),
            AggKind::Max => MinMaxAggregationState::new(false).into(),
            AggKind::VarPop => VarianceAggregationState::new(false, true).into(),
            AggKind::VarSamp => VarianceAggregationState::new(false, false).into(),
            AggKind::StddevPop => VarianceAggregationState::new(true, true).into(),
            AggKind::StddevSamp => VarianceAggregationState::new(true, false).into(),
        }
    }
}

/// The values of the group keys of a row.
pub type GroupKeys = SmallVec<[DataValue; 4]>;

/// The aggregate states of a query, per group.
///
/// Chunks are absorbed one by one; [`snapshot`](Self::snapshot) finalizes
/// the current states without consuming them.
#[derive(Debug, Clone)]
pub struct PartialAggregateState {
    aggs: Arc<[AggCall]>,
    group_keys: Arc<[BoundExpr]>,
    groups: HashMap<GroupKeys, Vec<AggState>, ahash::RandomState>,
    /// Number of absorbed rows.
    rows: usize,
}

impl PartialAggregateState {
    pub fn new(aggs: Vec<AggCall>, group_keys: Vec<BoundExpr>) -> Self {
        PartialAggregateState {
            aggs: aggs.into(),
            group_keys: group_keys.into(),
            groups: HashMap::default(),
            rows: 0,
        }
    }

    /// An empty state of the same query.
    pub fn empty(&self) -> Self {
        PartialAggregateState {
            aggs: self.aggs.clone(),
            group_keys: self.group_keys.clone(),
            groups: HashMap::default(),
            rows: 0,
        }
    }

    fn has_group_by(&self) -> bool {
        !self.group_keys.is_empty()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Absorb rows of the input table. Rows must have passed the filter.
    pub fn absorb<'a>(&mut self, rows: impl IntoIterator<Item = &'a Row>) -> Result<()> {
        for row in rows {
            let key = self
                .group_keys
                .iter()
                .map(|e| e.eval(row))
                .collect::<std::result::Result<GroupKeys, _>>()?;
            let aggs = &self.aggs;
            let states = self
                .groups
                .entry(key)
                .or_insert_with(|| aggs.iter().map(AggState::new).collect());
            for (call, state) in aggs.iter().zip(states.iter_mut()) {
                match &call.arg {
                    Some(arg) => state.update(&arg.eval(row)?)?,
                    None => state.update(&DataValue::Null)?,
                }
            }
            self.rows += 1;
        }
        Ok(())
    }

    /// Merge the states of another partial result over different rows.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.aggs.len() != other.aggs.len() {
            return Err(ExecutorError::StateMismatch("different aggregates"));
        }
        for (key, other_states) in &other.groups {
            match self.groups.get_mut(key) {
                Some(states) => {
                    for (state, other) in states.iter_mut().zip(other_states) {
                        state.merge(other)?;
                    }
                }
                None => {
                    self.groups.insert(key.clone(), other_states.clone());
                }
            }
        }
        self.rows += other.rows;
        Ok(())
    }

    /// Keep the groups whose keys pass `filter`, and merge them on the keys in `project`.
    ///
    /// The result is grouped by the projected keys only.
    pub fn regroup(&self, filter: Option<&BoundExpr>, project: &[usize]) -> Result<Self> {
        let mut result = PartialAggregateState {
            aggs: self.aggs.clone(),
            group_keys: project.iter().map(|&i| self.group_keys[i].clone()).collect(),
            groups: HashMap::default(),
            rows: 0,
        };
        for (key, states) in &self.groups {
            if let Some(filter) = filter {
                if !filter.eval_filter(key)? {
                    continue;
                }
            }
            let new_key: GroupKeys = project.iter().map(|&i| key[i].clone()).collect();
            match result.groups.get_mut(&new_key) {
                Some(merged) => {
                    for (state, other) in merged.iter_mut().zip(states) {
                        state.merge(other)?;
                    }
                }
                None => {
                    result.groups.insert(new_key, states.clone());
                }
            }
        }
        result.rows = self.rows;
        Ok(result)
    }

    /// Finalize the current states: group keys followed by aggregate values,
    /// one row per group in ascending key order.
    ///
    /// Without GROUP BY, there is always exactly one row.
    pub fn snapshot(&self) -> Vec<Row> {
        if !self.has_group_by() && self.groups.is_empty() {
            return vec![self.aggs.iter().map(|a| AggState::new(a).output()).collect()];
        }
        let mut groups: Vec<_> = self.groups.iter().collect();
        groups.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));
        groups
            .into_iter()
            .map(|(key, states)| {
                key.iter()
                    .cloned()
                    .chain(states.iter().map(|s| s.output()))
                    .collect()
            })
            .collect()
    }
}
