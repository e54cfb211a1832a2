use crate::error::{HistoryError, Result};

/// Two-sided 95% critical values of Student's t for 1..=30 degrees of freedom.
const T_TABLE: [f64; 30] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, 2.201, 2.179, 2.16,
    2.145, 2.131, 2.12, 2.11, 2.101, 2.093, 2.086, 2.08, 2.074, 2.069, 2.064, 2.06, 2.056, 2.052,
    2.048, 2.045, 2.042,
];
const T_INFINITY: f64 = 1.96;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Run times of one benchmark in milliseconds, kept sorted ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct Samples {
    sorted: Vec<f64>,
}

impl Samples {
    pub fn new(name: &str, mut run_times_ms: Vec<f64>) -> Result<Self> {
        if run_times_ms.is_empty() {
            return Err(HistoryError::EmptySamples(name.to_string()));
        }
        if run_times_ms.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(HistoryError::InvalidRun(format!(
                "`{name}` has a negative or non-finite run time"
            )));
        }

        run_times_ms.sort_by(f64::total_cmp);

        Ok(Self {
            sorted: run_times_ms,
        })
    }

    pub fn sorted(&self) -> &[f64] {
        &self.sorted
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn min(&self) -> f64 {
        self.sorted[0]
    }

    pub fn max(&self) -> f64 {
        self.sorted[self.sorted.len() - 1]
    }

    /// Nearest-rank percentile, `p` in `0.0..=1.0`.
    pub fn percentile(&self, p: f64) -> f64 {
        let p = p.clamp(0.0, 1.0);
        let idx = ((self.sorted.len() - 1) as f64 * p).round() as usize;
        self.sorted[idx.min(self.sorted.len() - 1)]
    }

    pub fn mean(&self) -> f64 {
        self.sorted.iter().sum::<f64>() / self.sorted.len() as f64
    }

    /// Sample variance; zero for a single sample.
    pub fn variance(&self) -> f64 {
        let n = self.sorted.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean();
        self.sorted.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Standard error of the mean.
    pub fn sem(&self) -> f64 {
        self.std_dev() / (self.sorted.len() as f64).sqrt()
    }

    /// Margin of error at 95% confidence.
    pub fn moe(&self) -> f64 {
        self.sem() * t_critical(self.sorted.len().saturating_sub(1))
    }

    /// Relative margin of error in percent of the mean.
    pub fn rme(&self) -> f64 {
        let mean = self.mean();
        if mean == 0.0 {
            return 0.0;
        }
        self.moe() / mean * 100.0
    }

    pub fn ops_per_sec(&self) -> f64 {
        let mean = self.mean();
        if mean == 0.0 {
            return f64::INFINITY;
        }
        1000.0 / mean
    }

    /// MiB processed per second at the mean run time.
    pub fn throughput_mb_per_s(&self, byte_size: u64) -> f64 {
        let seconds = self.mean() / 1000.0;
        if seconds == 0.0 {
            return f64::INFINITY;
        }
        byte_size as f64 / BYTES_PER_MB / seconds
    }
}

fn t_critical(degrees_of_freedom: usize) -> f64 {
    match degrees_of_freedom {
        0 => T_TABLE[0],
        df if df <= T_TABLE.len() => T_TABLE[df - 1],
        _ => T_INFINITY,
    }
}
