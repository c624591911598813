// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use super::*;

/// State for average aggregation: a sum and a count.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AvgAggregationState {
    sum: DataValue,
    count: i64,
}

impl AvgAggregationState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AggregationState for AvgAggregationState {
    fn update(&mut self, value: &DataValue) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        self.sum = match self.sum {
            DataValue::Null => value.clone(),
            ref sum => sum.add(value)?,
        };
        self.count += 1;
        Ok(())
    }

    fn merge(&mut self, other: &AggState) -> Result<()> {
        let AggState::Avg(other) = other else {
            return Err(ExecutorError::StateMismatch("avg"));
        };
        if other.count == 0 {
            return Ok(());
        }
        self.sum = match self.sum {
            DataValue::Null => other.sum.clone(),
            ref sum => sum.add(&other.sum)?,
        };
        self.count += other.count;
        Ok(())
    }

    fn output(&self) -> DataValue {
        match self.sum.as_f64() {
            Some(sum) if self.count > 0 => DataValue::from(sum / self.count as f64),
            _ => DataValue::Null,
        }
    }
}
