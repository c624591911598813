// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Progress estimation.

/// Fraction of chunks consumed, in `[0, 1]`.
///
/// A table without chunks is complete from the start.
pub fn progress(consumed: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    consumed.min(total) as f64 / total as f64
}
