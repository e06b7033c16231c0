//! Configuration for offset learning.

/// Tunables for the offset engine.
#[derive(Debug, Clone)]
pub struct OffsetConfig {
    /// Largest offset magnitude ever applied (°).
    pub max_offset: f64,

    /// Samples kept in the learning history (oldest evicted first).
    pub history_size: usize,

    /// Weight of the newest sample in the smoothed mean (0.0 - 1.0).
    pub smoothing: f64,

    /// Samples an hour bucket needs before it influences predictions.
    pub min_bucket_samples: usize,

    /// Share of the prediction taken from a populated hour bucket.
    pub hour_weight: f64,

    /// Samples with an outdoor temperature needed for the regression.
    pub min_regression_samples: usize,

    /// Standard deviation of outdoor temperatures (°) needed for a usable
    /// slope.
    pub min_outdoor_spread: f64,

    /// Sample count that earns full sample confidence.
    pub target_samples: usize,

    /// Whether new observations are recorded.
    pub learning_enabled: bool,
}

impl Default for OffsetConfig {
    fn default() -> Self {
        Self {
            max_offset: 5.0,
            history_size: 1000,
            smoothing: 0.1,
            min_bucket_samples: 3,
            hour_weight: 0.5,
            min_regression_samples: 10,
            min_outdoor_spread: 2.0,
            target_samples: 50,
            learning_enabled: true,
        }
    }
}
