// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use super::*;

/// State for sum aggregation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SumAggregationState {
    result: DataValue,
}

impl SumAggregationState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AggregationState for SumAggregationState {
    fn update(&mut self, value: &DataValue) -> Result<()> {
        self.result = match (&self.result, value) {
            (_, DataValue::Null) => return Ok(()),
            (DataValue::Null, v) => v.clone(),
            (r, v) => r.add(v)?,
        };
        Ok(())
    }

    fn merge(&mut self, other: &AggState) -> Result<()> {
        let AggState::Sum(other) = other else {
            return Err(ExecutorError::StateMismatch("sum"));
        };
        self.update(&other.result)
    }

    fn output(&self) -> DataValue {
        self.result.clone()
    }
}
