//! Running statistics for trajectory analysis and calibration scoring.

use serde::{Deserialize, Serialize};

/// Streaming mean/variance accumulator (Welford update).
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub mean: f64,
    pub std_dev: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            n_vals: 0,
            mean: 0.0,
            diff_2_sum: 0.0,
        }
    }

    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    pub fn mean(&self) -> f64 {
        if self.n_vals == 0 { f64::NAN } else { self.mean }
    }

    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            mean: self.mean(),
            std_dev: if self.n_vals > 1 {
                (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()
            } else {
                f64::NAN
            },
        }
    }
}

/// Sum of squared errors between a simulated and a target series.
///
/// The calibration evaluator minimizes this quantity; series must have
/// equal lengths (checked by config validation upstream).
pub fn sum_squared_error(simulated: &[f64], target: &[f64]) -> f64 {
    simulated
        .iter()
        .zip(target.iter())
        .map(|(sim, tgt)| (sim - tgt).powi(2))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_mean_and_std_dev() {
        let mut acc = Accumulator::new();
        for val in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            acc.add(val);
        }
        let report = acc.report();
        assert!((report.mean - 5.0).abs() < 1e-12);
        // Sample standard deviation of the series above.
        assert!((report.std_dev - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn sse_of_identical_series_is_zero() {
        let series = [1.0, 2.0, 3.0];
        assert_eq!(sum_squared_error(&series, &series), 0.0);
        assert_eq!(sum_squared_error(&[1.0, 2.0], &[2.0, 4.0]), 5.0);
    }
}
