//! Traffic history and congestion forecasting.
//!
//! [`TrafficAnalyzer`] keeps a bounded time-series of per-frame vehicle
//! counts. Two read paths: `density` averages counts over a trailing wall
//! clock window, `predict_congestion` extrapolates the recent trend with a
//! degree-1 least-squares fit. Both are cheap enough to recompute on every
//! status query.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

/// Default bound on the vehicle-count history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Forecasting looks at most this many trailing samples.
const TREND_SAMPLES: usize = 10;

/// One vehicle-count observation.
#[derive(Clone, Copy, Debug)]
pub struct TrafficSample {
    pub timestamp: SystemTime,
    pub vehicle_count: u32,
}

/// Bounded time-series of vehicle counts.
///
/// The history is owned by the analyzer and mutated only through
/// [`TrafficAnalyzer::update`]; the oldest samples are evicted FIFO once the
/// capacity is exceeded.
#[derive(Clone, Debug)]
pub struct TrafficAnalyzer {
    history: VecDeque<TrafficSample>,
    capacity: usize,
}

impl TrafficAnalyzer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    /// Append a sample stamped "now".
    pub fn update(&mut self, vehicle_count: u32) {
        self.update_at(vehicle_count, SystemTime::now());
    }

    /// Append a sample with an explicit timestamp.
    pub fn update_at(&mut self, vehicle_count: u32, timestamp: SystemTime) {
        self.history.push_back(TrafficSample {
            timestamp,
            vehicle_count,
        });
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn latest(&self) -> Option<TrafficSample> {
        self.history.back().copied()
    }

    /// Average vehicle count over samples within the trailing window.
    /// 0.0 when no sample falls inside it.
    pub fn density(&self, window: Duration) -> f64 {
        self.density_at(window, SystemTime::now())
    }

    pub fn density_at(&self, window: Duration, now: SystemTime) -> f64 {
        let mut sum = 0u64;
        let mut n = 0u64;
        for sample in &self.history {
            let age = now
                .duration_since(sample.timestamp)
                .unwrap_or(Duration::ZERO);
            if age <= window {
                sum += sample.vehicle_count as u64;
                n += 1;
            }
        }
        if n == 0 {
            0.0
        } else {
            sum as f64 / n as f64
        }
    }

    /// Forecast the vehicle count `lookahead` from the latest sample.
    ///
    /// Fits a degree-1 least-squares line over the last ten samples (count
    /// vs. minutes since the first of them) and extrapolates, clamped to
    /// zero. Degenerate histories fall back: no samples gives 0.0, a single
    /// sample gives its count, and zero spread in the timestamps gives the
    /// latest count.
    pub fn predict_congestion(&self, lookahead: Duration) -> f64 {
        let start = self.history.len().saturating_sub(TREND_SAMPLES);
        let recent: Vec<TrafficSample> = self.history.iter().skip(start).copied().collect();

        match recent.len() {
            0 => return 0.0,
            1 => return recent[0].vehicle_count as f64,
            _ => {}
        }

        let origin = recent[0].timestamp;
        let xs: Vec<f64> = recent
            .iter()
            .map(|s| {
                s.timestamp
                    .duration_since(origin)
                    .unwrap_or(Duration::ZERO)
                    .as_secs_f64()
                    / 60.0
            })
            .collect();
        let ys: Vec<f64> = recent.iter().map(|s| s.vehicle_count as f64).collect();

        let spread = xs.iter().cloned().fold(f64::MIN, f64::max)
            - xs.iter().cloned().fold(f64::MAX, f64::min);
        if spread <= 0.0 {
            // All samples share a timestamp; there is no trend to fit.
            return ys[ys.len() - 1];
        }

        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;
        let sxx: f64 = xs.iter().map(|x| (x - mean_x) * (x - mean_x)).sum();
        let sxy: f64 = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| (x - mean_x) * (y - mean_y))
            .sum();
        let slope = sxy / sxx;
        let intercept = mean_y - slope * mean_x;

        let target_x = xs[xs.len() - 1] + lookahead.as_secs_f64() / 60.0;
        (intercept + slope * target_x).max(0.0)
    }
}

impl Default for TrafficAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
