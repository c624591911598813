// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use super::*;

/// State for variance and standard deviation: count, sum and sum of squares.
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceAggregationState {
    count: i64,
    sum: f64,
    sum_sq: f64,
    /// Output the square root of the variance.
    stddev: bool,
    /// Population instead of sample statistics.
    population: bool,
}

impl VarianceAggregationState {
    pub fn new(stddev: bool, population: bool) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            stddev,
            population,
        }
    }
}

impl AggregationState for VarianceAggregationState {
    fn update(&mut self, value: &DataValue) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        let v = value.as_f64().ok_or_else(|| {
            ConvertError::InvalidOperation(format!("variance of non-numeric value {value}"))
        })?;
        self.count += 1;
        self.sum += v;
        self.sum_sq += v * v;
        Ok(())
    }

    fn merge(&mut self, other: &AggState) -> Result<()> {
        let AggState::Variance(other) = other else {
            return Err(ExecutorError::StateMismatch("variance"));
        };
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        Ok(())
    }

    fn output(&self) -> DataValue {
        let n = self.count as f64;
        let divisor = match self.population {
            true if self.count > 0 => n,
            false if self.count > 1 => n - 1.0,
            _ => return DataValue::Null,
        };
        // rounding may push a zero variance slightly below zero
        let variance = ((self.sum_sq - self.sum * self.sum / n) / divisor).max(0.0);
        DataValue::from(match self.stddev {
            true => variance.sqrt(),
            false => variance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(stddev: bool, population: bool, values: &[f64]) -> VarianceAggregationState {
        let mut s = VarianceAggregationState::new(stddev, population);
        for v in values {
            s.update(&DataValue::from(*v)).unwrap();
        }
        s
    }

    #[test]
    fn variance() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(state(false, true, &values).output(), DataValue::from(4.0));
        assert_eq!(state(true, true, &values).output(), DataValue::from(2.0));
        assert_eq!(
            state(false, false, &values).output(),
            DataValue::from(32.0 / 7.0)
        );
        assert_eq!(state(false, false, &[1.0]).output(), DataValue::Null);
        assert_eq!(state(false, true, &[]).output(), DataValue::Null);
    }

    #[test]
    fn merge() {
        let mut left = state(false, true, &[2.0, 4.0, 4.0, 4.0]);
        let right = state(false, true, &[5.0, 5.0, 7.0, 9.0]);
        left.merge(&right.into()).unwrap();
        assert_eq!(left.output(), DataValue::from(4.0));
    }
}
