//! Statistical model of the sensor offset.
//!
//! Three layers, each only used once it has enough support:
//!
//! ```text
//! prediction = smoothed mean
//!            → blended with the hour-of-day bucket   (≥ min_bucket_samples)
//!            + slope · (outdoor − mean outdoor)      (≥ min_regression_samples,
//!                                                     outdoor spread ≥ min_outdoor_spread)
//! ```

use serde::{Deserialize, Serialize};

use super::config::OffsetConfig;
use super::types::{OffsetContext, OffsetSample};

/// Hours in a day, one bucket each.
const HOURS: usize = 24;

/// Running mean of samples taken during one hour of the day.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HourBucket {
    pub mean: f64,
    pub count: usize,
}

/// Linear dependence of the offset on outdoor temperature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutdoorRegression {
    /// Offset change per degree outdoor.
    pub slope: f64,
    /// Mean outdoor temperature of the fitted samples.
    pub mean_outdoor: f64,
    pub samples: usize,
}

/// Fitted offset model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetModel {
    /// Exponentially smoothed mean of the observed deltas.
    pub mean: f64,
    /// Exponentially smoothed variance around `mean`.
    pub variance: f64,
    pub hourly: Vec<HourBucket>,
    pub outdoor: Option<OutdoorRegression>,
    pub sample_count: usize,
}

impl Default for OffsetModel {
    fn default() -> Self {
        Self {
            mean: 0.0,
            variance: 0.0,
            hourly: vec![HourBucket::default(); HOURS],
            outdoor: None,
            sample_count: 0,
        }
    }
}

/// Raw model output before clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawOffset {
    pub value: f64,
    pub used_hour_bucket: bool,
    pub used_outdoor: bool,
}

impl OffsetModel {
    /// Fit from samples in chronological order.
    pub fn fit<'a>(samples: impl IntoIterator<Item = &'a OffsetSample>, config: &OffsetConfig) -> Self {
        let alpha = config.smoothing.clamp(f64::EPSILON, 1.0);
        let mut model = Self::default();
        let mut outdoor_points = Vec::new();

        for sample in samples {
            let delta = sample.observed_delta;
            if model.sample_count == 0 {
                model.mean = delta;
            } else {
                let diff = delta - model.mean;
                model.mean += alpha * diff;
                model.variance = (1.0 - alpha) * (model.variance + alpha * diff * diff);
            }
            model.sample_count += 1;

            let bucket = &mut model.hourly[sample.features.hour as usize % HOURS];
            bucket.count += 1;
            bucket.mean += (delta - bucket.mean) / bucket.count as f64;

            if let Some(outdoor) = sample.features.outdoor_temperature {
                outdoor_points.push((outdoor, delta));
            }
        }

        model.outdoor = fit_outdoor(&outdoor_points, config);
        model
    }

    /// Standard deviation of the deltas around the smoothed mean.
    pub fn std_dev(&self) -> f64 {
        self.variance.max(0.0).sqrt()
    }

    /// Predict the offset for a context.
    pub fn predict(&self, context: &OffsetContext, config: &OffsetConfig) -> RawOffset {
        let mut value = self.mean;

        let bucket = self.hourly.get(context.hour as usize % HOURS);
        let used_hour_bucket = match bucket {
            Some(bucket) if bucket.count >= config.min_bucket_samples.max(1) => {
                let weight = config.hour_weight.clamp(0.0, 1.0);
                value = value * (1.0 - weight) + bucket.mean * weight;
                true
            }
            _ => false,
        };

        let used_outdoor = match (self.outdoor, context.outdoor_temperature) {
            (Some(regression), Some(outdoor)) => {
                value += regression.slope * (outdoor - regression.mean_outdoor);
                true
            }
            _ => false,
        };

        RawOffset {
            value,
            used_hour_bucket,
            used_outdoor,
        }
    }
}

fn fit_outdoor(points: &[(f64, f64)], config: &OffsetConfig) -> Option<OutdoorRegression> {
    if points.len() < config.min_regression_samples.max(2) {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), (x, y)| {
        let dx = x - mean_x;
        (sxx + dx * dx, sxy + dx * (y - mean_y))
    });

    let spread = (sxx / n).sqrt();
    if spread < config.min_outdoor_spread || sxx <= 0.0 {
        return None;
    }

    Some(OutdoorRegression {
        slope: sxy / sxx,
        mean_outdoor: mean_x,
        samples: points.len(),
    })
}
