// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use super::*;

/// State for min or max aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxAggregationState {
    result: DataValue,
    is_min: bool,
}

impl MinMaxAggregationState {
    pub fn new(is_min: bool) -> Self {
        Self {
            result: DataValue::Null,
            is_min,
        }
    }
}

impl AggregationState for MinMaxAggregationState {
    fn update(&mut self, value: &DataValue) -> Result<()> {
        let result = std::mem::take(&mut self.result);
        self.result = match self.is_min {
            true => result.min(value.clone()),
            false => result.max(value.clone()),
        };
        Ok(())
    }

    fn merge(&mut self, other: &AggState) -> Result<()> {
        match other {
            AggState::MinMax(other) if other.is_min == self.is_min => self.update(&other.result),
            _ => Err(ExecutorError::StateMismatch("min/max")),
        }
    }

    fn output(&self) -> DataValue {
        self.result.clone()
    }
}
