use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Unweighted moving average over `window` consecutive values.
///
/// The result has `series.len() - window + 1` elements and is empty when
/// the series is shorter than the window.
pub fn moving_average(series: &[f64], window: usize) -> Result<Vec<f64>> {
    if window == 0 {
        bail!("window must be positive");
    }
    if series.len() < window {
        return Ok(Vec::new());
    }

    let avg = series
        .windows(window)
        .map(|vals| vals.iter().sum::<f64>() / window as f64)
        .collect();
    Ok(avg)
}

/// Arithmetic mean, or 0 for an empty series.
pub fn mean(series: &[f64]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    series.iter().sum::<f64>() / series.len() as f64
}

/// Running mean and sample standard deviation (Welford).
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub n_vals: usize,
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

    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            n_vals: self.n_vals,
            mean: self.mean,
            std_dev: if self.n_vals > 1 {
                (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()
            } else {
                f64::NAN
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn moving_average_of_ramp() {
        let avg = moving_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        assert_eq!(avg.len(), 3);
        for (val, exp) in avg.iter().zip([2.0, 3.0, 4.0]) {
            assert_relative_eq!(*val, exp, max_relative = 1e-12);
        }
    }

    #[test]
    fn moving_average_edge_cases() {
        assert!(moving_average(&[1.0, 2.0], 5).unwrap().is_empty());
        assert!(moving_average(&[], 1).unwrap().is_empty());
        assert_eq!(moving_average(&[4.0, 2.0], 2).unwrap(), vec![3.0]);
        assert_eq!(moving_average(&[4.0, 2.0], 1).unwrap(), vec![4.0, 2.0]);
        assert!(moving_average(&[1.0, 2.0], 0).is_err());
    }

    #[test]
    fn moving_average_of_zero_tail_is_exact() {
        let avg = moving_average(&[0.1, 0.7, 0.2, 0.0, 0.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(avg.len(), 5);
        assert_eq!(avg[3], 0.0);
        assert_eq!(avg[4], 0.0);

        let avg = moving_average(&[f64::INFINITY, 1.0, 0.0, 0.0], 2).unwrap();
        assert!(avg[0].is_infinite());
        assert_eq!(avg[2], 0.0);
    }

    #[test]
    fn mean_of_series() {
        assert_eq!(mean(&[]), 0.0);
        assert_relative_eq!(mean(&[0.5, 0.0, 1.0]), 0.5);
    }

    #[test]
    fn accumulator_matches_direct_formulas() {
        let vals = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut acc = Accumulator::new();
        vals.iter().for_each(|&val| acc.add(val));

        let report = acc.report();
        assert_eq!(report.n_vals, 8);
        assert_relative_eq!(report.mean, 5.0);
        assert_relative_eq!(report.std_dev, (32.0_f64 / 7.0).sqrt(), max_relative = 1e-12);

        let mut single = Accumulator::new();
        single.add(1.0);
        assert!(single.report().std_dev.is_nan());
    }
}
