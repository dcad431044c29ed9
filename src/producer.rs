//! Tick producer: random walk per symbol, pushed into the feed on a fixed period.

use anyhow::{anyhow, bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::feed::{lock_recover, SharedFeed};
use crate::logging::{info, obj, v_int, v_num, Domain};
use crate::metrics::MetricsSink;
use crate::observation::Observation;
use crate::worker::{LoopControl, RunState, Worker};

const LOG_EVERY_ITERATIONS: u64 = 50;

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub period: Duration,
    /// Standard deviation of the zero-mean step noise.
    pub noise_std: f64,
    /// Values never drop below this.
    pub floor: f64,
    pub initial_low: f64,
    pub initial_high: f64,
    pub seed: Option<u64>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            noise_std: 0.5,
            floor: 1.0,
            initial_low: 100.0,
            initial_high: 500.0,
            seed: None,
        }
    }
}

/// Per-symbol random walk clamped at a positive floor.
#[derive(Debug)]
pub struct PriceWalk {
    symbols: Vec<String>,
    prices: Vec<f64>,
    noise: Normal<f64>,
    floor: f64,
    rng: StdRng,
}

impl PriceWalk {
    pub fn new(symbols: Vec<String>, cfg: &ProducerConfig) -> Result<Self> {
        if !(cfg.floor > 0.0 && cfg.floor.is_finite()) {
            bail!("price floor must be positive and finite, got {}", cfg.floor);
        }
        if !cfg.initial_low.is_finite() || !cfg.initial_high.is_finite() {
            bail!("initial range [{}, {}) is not finite", cfg.initial_low, cfg.initial_high);
        }
        if !(cfg.initial_low < cfg.initial_high) {
            bail!("initial range [{}, {}) is empty", cfg.initial_low, cfg.initial_high);
        }
        // gen_range rejects spans that overflow to infinity
        if !(cfg.initial_high - cfg.initial_low).is_finite() {
            bail!("initial range [{}, {}) is too wide", cfg.initial_low, cfg.initial_high);
        }
        if !cfg.noise_std.is_finite() {
            bail!("noise std must be finite, got {}", cfg.noise_std);
        }
        let noise = Normal::new(0.0, cfg.noise_std)
            .map_err(|e| anyhow!("invalid noise std {}: {}", cfg.noise_std, e))?;
        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let prices = symbols
            .iter()
            .map(|_| rng.gen_range(cfg.initial_low..cfg.initial_high).max(cfg.floor))
            .collect();
        Ok(Self {
            symbols,
            prices,
            noise,
            floor: cfg.floor,
            rng,
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    /// Advance every symbol by one step, in symbol order.
    pub fn step(&mut self) -> Vec<Observation> {
        let now = Instant::now();
        let mut out = Vec::with_capacity(self.symbols.len());
        for (symbol, price) in self.symbols.iter().zip(self.prices.iter_mut()) {
            let previous = *price;
            let next = (previous + self.noise.sample(&mut self.rng)).max(self.floor);
            *price = next;
            out.push(Observation::at(symbol.clone(), next, next - previous, now));
        }
        out
    }
}

pub struct Producer {
    feed: Arc<SharedFeed>,
    metrics: Arc<dyn MetricsSink>,
    period: Duration,
    walk: Mutex<Option<PriceWalk>>,
    worker: Worker,
}

impl Producer {
    pub fn new(
        feed: Arc<SharedFeed>,
        metrics: Arc<dyn MetricsSink>,
        symbols: Vec<String>,
        cfg: ProducerConfig,
    ) -> Result<Self> {
        if cfg.period.is_zero() {
            bail!("producer period must be non-zero");
        }
        let walk = PriceWalk::new(symbols, &cfg)?;
        Ok(Self {
            feed,
            metrics,
            period: cfg.period,
            walk: Mutex::new(Some(walk)),
            worker: Worker::new("producer"),
        })
    }

    /// Idempotent; a second call (or a call after stop) returns `Ok(false)`.
    pub fn start(&self) -> Result<bool> {
        let Some(walk) = lock_recover(&self.walk, "producer_walk").take() else {
            return Ok(false);
        };
        let feed = Arc::clone(&self.feed);
        let metrics = Arc::clone(&self.metrics);
        let period = self.period;
        self.worker.start(move |ctl| run(ctl, feed, metrics, walk, period))
    }

    /// Returns once the loop has exited; no push happens after this.
    pub fn stop(&self) -> bool {
        self.worker.stop()
    }

    pub fn state(&self) -> RunState {
        self.worker.state()
    }
}

fn run(
    ctl: Arc<LoopControl>,
    feed: Arc<SharedFeed>,
    metrics: Arc<dyn MetricsSink>,
    mut walk: PriceWalk,
    period: Duration,
) {
    info(
        Domain::Producer,
        "loop_started",
        obj(&[
            ("symbols", v_int(walk.symbols().len() as u64)),
            ("period_ms", v_int(period.as_millis() as u64)),
        ]),
    );
    let mut iteration = 0u64;
    while ctl.is_running() {
        let started = Instant::now();
        for obs in walk.step() {
            let key = obs.key.clone();
            let at = obs.generated_at;
            feed.push(obs);
            metrics.record_generation(&key, at);
        }
        iteration += 1;
        if iteration % LOG_EVERY_ITERATIONS == 0 {
            info(
                Domain::Producer,
                "generation",
                obj(&[
                    ("iteration", v_int(iteration)),
                    ("elapsed_us", v_num(started.elapsed().as_secs_f64() * 1_000_000.0)),
                ]),
            );
        }
        if !ctl.pause(period) {
            break;
        }
    }
    info(Domain::Producer, "loop_exited", obj(&[("iterations", v_int(iteration))]));
}
