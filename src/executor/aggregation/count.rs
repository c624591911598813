// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use super::*;

/// State for `COUNT(expr)` and `COUNT(*)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CountAggregationState {
    count: i64,
    /// Count every row, including NULLs.
    row_count: bool,
}

impl CountAggregationState {
    pub fn new(row_count: bool) -> Self {
        Self {
            count: 0,
            row_count,
        }
    }
}

impl AggregationState for CountAggregationState {
    fn update(&mut self, value: &DataValue) -> Result<()> {
        if self.row_count || !value.is_null() {
            self.count += 1;
        }
        Ok(())
    }

    fn merge(&mut self, other: &AggState) -> Result<()> {
        let AggState::Count(other) = other else {
            return Err(ExecutorError::StateMismatch("count"));
        };
        self.count += other.count;
        Ok(())
    }

    fn output(&self) -> DataValue {
        DataValue::Int64(self.count)
    }
}
