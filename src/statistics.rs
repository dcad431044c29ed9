//! Rolling statistics computed over a window of tick values.
//!
//! Each statistic is stateless: the consumer hands it a fresh window copied
//! out of the feed, oldest value first.

use serde::Serialize;
use std::fmt::Debug;

/// Trading days per year used to annualize per-step volatility.
pub const TRADING_DAYS: f64 = 252.0;

pub trait Statistic: Send + Sync + 'static {
    type Reading: Debug + Serialize;

    /// Label reported to the metrics sink and logs.
    fn name(&self) -> &'static str;

    /// Number of most recent ticks to request from the feed.
    fn window(&self) -> usize;

    /// Windows shorter than this are skipped.
    fn min_samples(&self) -> usize;

    /// `None` when the window cannot produce a meaningful value.
    fn compute(&self, values: &[f64]) -> Option<Self::Reading>;

    /// Log one reading every this many computations.
    fn log_every(&self) -> u64 {
        20
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by n).
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Per-step simple returns. `None` if any base value is not positive.
pub fn simple_returns(values: &[f64]) -> Option<Vec<f64>> {
    values
        .windows(2)
        .map(|w| if w[0] > 0.0 { Some((w[1] - w[0]) / w[0]) } else { None })
        .collect()
}

// =============================================================================
// Rolling mean
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MeanReading {
    pub mean: f64,
    pub latest: f64,
    /// Newest value relative to the mean, in percent.
    pub deviation_pct: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct RollingMean {
    window: usize,
}

impl RollingMean {
    pub const MIN_SAMPLES: usize = 2;

    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl Default for RollingMean {
    fn default() -> Self {
        Self::new(20)
    }
}

impl Statistic for RollingMean {
    type Reading = MeanReading;

    fn name(&self) -> &'static str {
        "mean"
    }

    fn window(&self) -> usize {
        self.window
    }

    fn min_samples(&self) -> usize {
        Self::MIN_SAMPLES
    }

    fn compute(&self, values: &[f64]) -> Option<MeanReading> {
        if values.len() < Self::MIN_SAMPLES {
            return None;
        }
        let m = mean(values)?;
        let latest = *values.last()?;
        let deviation_pct = if m != 0.0 { (latest - m) / m * 100.0 } else { 0.0 };
        Some(MeanReading {
            mean: m,
            latest,
            deviation_pct,
            samples: values.len(),
        })
    }
}

// =============================================================================
// Rolling volatility
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolatilityTier {
    Low,
    Moderate,
    High,
}

impl VolatilityTier {
    /// `<15` low, `[15, 30)` moderate, `>=30` high (annualized percent).
    pub fn classify(annualized_pct: f64) -> Self {
        if annualized_pct < 15.0 {
            VolatilityTier::Low
        } else if annualized_pct < 30.0 {
            VolatilityTier::Moderate
        } else {
            VolatilityTier::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VolatilityTier::Low => "LOW",
            VolatilityTier::Moderate => "MODERATE",
            VolatilityTier::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolatilityReading {
    pub annualized_pct: f64,
    pub tier: VolatilityTier,
    pub latest: f64,
    /// Number of returns, one fewer than the window length.
    pub samples: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct RollingVolatility {
    window: usize,
}

impl RollingVolatility {
    pub const MIN_SAMPLES: usize = 3;

    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl Default for RollingVolatility {
    fn default() -> Self {
        Self::new(20)
    }
}

impl Statistic for RollingVolatility {
    type Reading = VolatilityReading;

    fn name(&self) -> &'static str {
        "volatility"
    }

    fn window(&self) -> usize {
        self.window
    }

    fn min_samples(&self) -> usize {
        Self::MIN_SAMPLES
    }

    fn compute(&self, values: &[f64]) -> Option<VolatilityReading> {
        if values.len() < Self::MIN_SAMPLES {
            return None;
        }
        let returns = simple_returns(values)?;
        let per_step = population_std(&returns)?;
        let annualized_pct = per_step * TRADING_DAYS.sqrt() * 100.0;
        Some(VolatilityReading {
            annualized_pct,
            tier: VolatilityTier::classify(annualized_pct),
            latest: *values.last()?,
            samples: returns.len(),
        })
    }

    fn log_every(&self) -> u64 {
        15
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_deviation() {
        let r = RollingMean::new(20).compute(&[10.0, 20.0, 30.0]).unwrap();
        assert_eq!(r.mean, 20.0);
        assert_eq!(r.latest, 30.0);
        assert!((r.deviation_pct - 50.0).abs() < 1e-12);
        assert_eq!(r.samples, 3);
    }

    #[test]
    fn test_mean_needs_two_samples() {
        let stat = RollingMean::new(20);
        assert!(stat.compute(&[]).is_none());
        assert!(stat.compute(&[5.0]).is_none());
        assert!(stat.compute(&[5.0, 7.0]).is_some());
    }

    #[test]
    fn test_volatility_reference_window() {
        // returns: 0.01, -2/101, 1/99
        let r = RollingVolatility::new(20).compute(&[100.0, 101.0, 99.0, 100.0]).unwrap();
        let returns = [0.01, -2.0 / 101.0, 1.0 / 99.0];
        let m = returns.iter().sum::<f64>() / 3.0;
        let var = returns.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / 3.0;
        let expected = var.sqrt() * 252f64.sqrt() * 100.0;
        assert!((r.annualized_pct - expected).abs() < 1e-9);
        assert!((r.annualized_pct - 22.3397).abs() < 1e-3, "got {}", r.annualized_pct);
        assert_eq!(r.tier, VolatilityTier::Moderate);
        assert_eq!(r.samples, 3);
    }

    #[test]
    fn test_flat_series_is_low() {
        let r = RollingVolatility::new(20).compute(&[50.0; 10]).unwrap();
        assert_eq!(r.annualized_pct, 0.0);
        assert_eq!(r.tier, VolatilityTier::Low);
    }

    #[test]
    fn test_volatility_rejects_short_or_non_positive() {
        let stat = RollingVolatility::new(20);
        assert!(stat.compute(&[100.0, 101.0]).is_none());
        assert!(stat.compute(&[0.0, 1.0, 2.0]).is_none());
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(VolatilityTier::classify(14.999), VolatilityTier::Low);
        assert_eq!(VolatilityTier::classify(15.0), VolatilityTier::Moderate);
        assert_eq!(VolatilityTier::classify(29.999), VolatilityTier::Moderate);
        assert_eq!(VolatilityTier::classify(30.0), VolatilityTier::High);
    }

    #[test]
    fn test_tier_serializes_uppercase() {
        let v = serde_json::to_value(VolatilityTier::Moderate).unwrap();
        assert_eq!(v, "MODERATE");
        assert_eq!(VolatilityTier::High.as_str(), "HIGH");
    }
}
