use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::time::Duration;

use crate::feed::{WakePolicy, DEFAULT_CAPACITY};
use crate::producer::ProducerConfig;
use crate::statistics::{RollingMean, RollingVolatility};

pub const DEFAULT_SYMBOLS: &[&str] = &["AAPL", "GOOGL", "MSFT", "AMZN", "BTC"];
pub const DEFAULT_RUNTIME_SECS: u64 = 45;
/// Used when a runtime argument is present but unusable.
pub const FALLBACK_RUNTIME_SECS: u64 = 30;
pub const MIN_RUNTIME_SECS: u64 = 5;
pub const MAX_RUNTIME_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub symbols: Vec<String>,
    pub history_capacity: usize,
    pub producer_period_ms: u64,
    pub board_period_ms: u64,
    pub mean_period_ms: u64,
    pub mean_window: usize,
    pub vol_period_ms: u64,
    pub vol_window: usize,
    pub noise_std: f64,
    pub price_floor: f64,
    pub initial_low: f64,
    pub initial_high: f64,
    pub seed: Option<u64>,
    pub wake_policy: WakePolicy,
    pub runtime_secs: u64,
    pub startup_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_vars(|_| None)
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup; unset or unparsable values use defaults.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let num = |key: &str| var(key).and_then(|v| v.trim().parse::<u64>().ok());
        let size = |key: &str| var(key).and_then(|v| v.trim().parse::<usize>().ok());
        let real = |key: &str| var(key).and_then(|v| v.trim().parse::<f64>().ok());
        Self {
            symbols: var("SYMBOLS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|| DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()),
            history_capacity: size("HISTORY_CAPACITY").unwrap_or(DEFAULT_CAPACITY),
            producer_period_ms: num("PRODUCER_PERIOD_MS").unwrap_or(100),
            board_period_ms: num("BOARD_PERIOD_MS").unwrap_or(500),
            mean_period_ms: num("MEAN_PERIOD_MS").unwrap_or(1000),
            mean_window: size("MEAN_WINDOW").unwrap_or(20),
            vol_period_ms: num("VOL_PERIOD_MS").unwrap_or(1500),
            vol_window: size("VOL_WINDOW").unwrap_or(20),
            noise_std: real("NOISE_STD").unwrap_or(0.5),
            price_floor: real("PRICE_FLOOR").unwrap_or(1.0),
            initial_low: real("INITIAL_LOW").unwrap_or(100.0),
            initial_high: real("INITIAL_HIGH").unwrap_or(500.0),
            seed: num("SEED"),
            wake_policy: var("WAKE_POLICY")
                .and_then(|v| WakePolicy::parse(&v))
                .unwrap_or_default(),
            runtime_secs: num("RUNTIME_SECS").unwrap_or(DEFAULT_RUNTIME_SECS),
            startup_delay_ms: num("STARTUP_DELAY_MS").unwrap_or(200),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("no symbols configured");
        }
        if self.history_capacity == 0 {
            bail!("history capacity must be at least 1");
        }
        for (name, ms) in [
            ("producer", self.producer_period_ms),
            ("board", self.board_period_ms),
            ("mean", self.mean_period_ms),
            ("volatility", self.vol_period_ms),
        ] {
            if ms == 0 {
                bail!("{} period must be non-zero", name);
            }
        }
        if self.mean_window < RollingMean::MIN_SAMPLES {
            bail!("mean window {} is below {}", self.mean_window, RollingMean::MIN_SAMPLES);
        }
        if self.vol_window < RollingVolatility::MIN_SAMPLES {
            bail!(
                "volatility window {} is below {}",
                self.vol_window,
                RollingVolatility::MIN_SAMPLES
            );
        }
        if !(self.price_floor > 0.0 && self.price_floor.is_finite()) {
            bail!("price floor must be positive and finite, got {}", self.price_floor);
        }
        if !self.initial_low.is_finite() || !self.initial_high.is_finite() {
            bail!(
                "initial price bounds must be finite, got [{}, {})",
                self.initial_low,
                self.initial_high
            );
        }
        if !(self.initial_low < self.initial_high) {
            bail!("initial price range is empty");
        }
        if !(self.initial_high - self.initial_low).is_finite() {
            bail!("initial price range is too wide");
        }
        if !(self.noise_std >= 0.0 && self.noise_std.is_finite()) {
            bail!("noise std must be non-negative and finite, got {}", self.noise_std);
        }
        Ok(())
    }

    pub fn producer_settings(&self) -> ProducerConfig {
        ProducerConfig {
            period: Duration::from_millis(self.producer_period_ms),
            noise_std: self.noise_std,
            floor: self.price_floor,
            initial_low: self.initial_low,
            initial_high: self.initial_high,
            seed: self.seed,
        }
    }

    pub fn board_period(&self) -> Duration {
        Duration::from_millis(self.board_period_ms)
    }

    pub fn mean_period(&self) -> Duration {
        Duration::from_millis(self.mean_period_ms)
    }

    pub fn vol_period(&self) -> Duration {
        Duration::from_millis(self.vol_period_ms)
    }

    pub fn runtime(&self) -> Duration {
        Duration::from_secs(self.runtime_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

/// Parse a runtime in seconds, accepting only `[5, 300]`.
pub fn parse_runtime(raw: &str) -> Result<u64> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid runtime argument {:?}", raw))?;
    if !(MIN_RUNTIME_SECS..=MAX_RUNTIME_SECS).contains(&secs) {
        bail!(
            "runtime must be between {} and {} seconds, got {}",
            MIN_RUNTIME_SECS,
            MAX_RUNTIME_SECS,
            secs
        );
    }
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.symbols, vec!["AAPL", "GOOGL", "MSFT", "AMZN", "BTC"]);
        assert_eq!(cfg.history_capacity, 100);
        assert_eq!(cfg.producer_period_ms, 100);
        assert_eq!(cfg.mean_period_ms, 1000);
        assert_eq!(cfg.vol_period_ms, 1500);
        assert_eq!(cfg.wake_policy, WakePolicy::NewWrite);
        assert!(cfg.seed.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let cfg = Config::from_vars(lookup(&[
            ("SYMBOLS", " X, Y ,,Z "),
            ("HISTORY_CAPACITY", "7"),
            ("SEED", "42"),
            ("WAKE_POLICY", "any_write"),
            ("MEAN_WINDOW", "not-a-number"),
        ]));
        assert_eq!(cfg.symbols, vec!["X", "Y", "Z"]);
        assert_eq!(cfg.history_capacity, 7);
        assert_eq!(cfg.seed, Some(42));
        assert_eq!(cfg.wake_policy, WakePolicy::AnyWrite);
        assert_eq!(cfg.mean_window, 20);
    }

    #[test]
    fn test_validate_rejects() {
        let base = Config::default();
        let cases = [
            Config { symbols: vec![], ..base.clone() },
            Config { history_capacity: 0, ..base.clone() },
            Config { producer_period_ms: 0, ..base.clone() },
            Config { mean_window: 1, ..base.clone() },
            Config { vol_window: 2, ..base.clone() },
            Config { price_floor: 0.0, ..base.clone() },
            Config { initial_low: 500.0, initial_high: 100.0, ..base.clone() },
            Config { noise_std: -0.1, ..base.clone() },
            Config { noise_std: f64::INFINITY, ..base.clone() },
            Config { noise_std: f64::NAN, ..base.clone() },
            Config { price_floor: f64::INFINITY, ..base.clone() },
            Config { initial_high: f64::INFINITY, ..base.clone() },
            Config { initial_low: f64::NEG_INFINITY, ..base.clone() },
            Config { initial_low: -1e308, initial_high: 1e308, ..base.clone() },
        ];
        for cfg in cases {
            assert!(cfg.validate().is_err(), "{:?}", cfg);
        }
    }

    #[test]
    fn test_infinite_env_values_fail_validation() {
        for (key, raw) in [
            ("INITIAL_HIGH", "inf"),
            ("NOISE_STD", "inf"),
            ("PRICE_FLOOR", "inf"),
            ("INITIAL_LOW", "-inf"),
        ] {
            let cfg = Config::from_vars(lookup(&[(key, raw)]));
            assert!(cfg.validate().is_err(), "{}={} accepted", key, raw);
        }
        let wide = Config::from_vars(lookup(&[
            ("INITIAL_LOW", "-1e308"),
            ("INITIAL_HIGH", "1e308"),
        ]));
        assert!(wide.validate().is_err());
    }

    #[test]
    fn test_valid_config_builds_price_walk() {
        let cfg = Config::from_vars(lookup(&[("SEED", "5"), ("NOISE_STD", "0")]));
        cfg.validate().unwrap();
        let walk = crate::producer::PriceWalk::new(cfg.symbols.clone(), &cfg.producer_settings())
            .unwrap();
        assert_eq!(walk.prices().len(), cfg.symbols.len());
    }

    #[test]
    fn test_parse_runtime_bounds() {
        assert_eq!(parse_runtime("5").unwrap(), 5);
        assert_eq!(parse_runtime(" 300 ").unwrap(), 300);
        assert!(parse_runtime("4").is_err());
        assert!(parse_runtime("301").is_err());
        assert!(parse_runtime("soon").is_err());
    }

    #[test]
    fn test_producer_settings_carry_config() {
        let cfg = Config { seed: Some(9), producer_period_ms: 25, ..Config::default() };
        let p = cfg.producer_settings();
        assert_eq!(p.period, Duration::from_millis(25));
        assert_eq!(p.seed, Some(9));
        assert_eq!(p.floor, 1.0);
    }
}
