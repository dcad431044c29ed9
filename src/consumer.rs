//! Generic consumer loop: wait on the feed, compute a statistic per key.

use anyhow::{bail, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::feed::SharedFeed;
use crate::logging::{debug, info, obj, v_int, v_str, Domain, ProfileScope};
use crate::metrics::MetricsSink;
use crate::statistics::Statistic;
use crate::worker::{LoopControl, RunState, Worker};

/// Back-off while the feed has no keys yet.
const EMPTY_FEED_BACKOFF: Duration = Duration::from_millis(100);

pub struct Consumer<S: Statistic> {
    feed: Arc<SharedFeed>,
    metrics: Arc<dyn MetricsSink>,
    statistic: Arc<S>,
    period: Duration,
    worker: Worker,
}

impl<S: Statistic> Consumer<S> {
    pub fn new(
        feed: Arc<SharedFeed>,
        metrics: Arc<dyn MetricsSink>,
        statistic: S,
        period: Duration,
    ) -> Result<Self> {
        if period.is_zero() {
            bail!("{} consumer period must be non-zero", statistic.name());
        }
        if statistic.window() < statistic.min_samples() {
            bail!(
                "{} window {} is below the minimum of {} samples",
                statistic.name(),
                statistic.window(),
                statistic.min_samples()
            );
        }
        let worker = Worker::new(format!("consumer-{}", statistic.name()));
        Ok(Self {
            feed,
            metrics,
            statistic: Arc::new(statistic),
            period,
            worker,
        })
    }

    pub fn start(&self) -> Result<bool> {
        let feed = Arc::clone(&self.feed);
        let metrics = Arc::clone(&self.metrics);
        let statistic = Arc::clone(&self.statistic);
        let period = self.period;
        self.worker
            .start(move |ctl| run(ctl, feed, metrics, statistic, period))
    }

    pub fn stop(&self) -> bool {
        self.worker.stop()
    }

    pub fn state(&self) -> RunState {
        self.worker.state()
    }
}

/// One pass over every known key. Returns how many readings were produced.
pub fn process_keys<S: Statistic>(
    feed: &SharedFeed,
    metrics: &dyn MetricsSink,
    statistic: &S,
    keys: &[String],
    computations: &mut u64,
) -> usize {
    let mut produced = 0;
    for key in keys {
        let window = feed.window(key, statistic.window());
        if window.len() < statistic.min_samples() {
            debug(
                Domain::Consumer,
                "insufficient_samples",
                obj(&[
                    ("symbol", v_str(key)),
                    ("statistic", v_str(statistic.name())),
                    ("samples", v_int(window.len() as u64)),
                ]),
            );
            continue;
        }
        let Some(newest) = window.last() else {
            continue;
        };
        let values: Vec<f64> = window.iter().map(|o| o.value).collect();
        let Some(reading) = statistic.compute(&values) else {
            continue;
        };
        metrics.record_processing(key, statistic.name(), newest.generated_at, Instant::now());
        produced += 1;
        *computations += 1;
        if *computations % statistic.log_every().max(1) == 0 {
            let mut fields = obj(&[
                ("symbol", v_str(key)),
                ("statistic", v_str(statistic.name())),
                ("computations", v_int(*computations)),
            ]);
            if let Ok(Value::Object(reading)) = serde_json::to_value(&reading) {
                fields.extend(reading);
            }
            info(Domain::Consumer, "reading", fields);
        }
    }
    produced
}

fn run<S: Statistic>(
    ctl: Arc<LoopControl>,
    feed: Arc<SharedFeed>,
    metrics: Arc<dyn MetricsSink>,
    statistic: Arc<S>,
    period: Duration,
) {
    info(
        Domain::Consumer,
        "loop_started",
        obj(&[
            ("statistic", v_str(statistic.name())),
            ("window", v_int(statistic.window() as u64)),
            ("period_ms", v_int(period.as_millis() as u64)),
        ]),
    );
    let mut computations = 0u64;
    while ctl.is_running() {
        feed.wait_for_update(period);
        if !ctl.is_running() {
            break;
        }
        let keys = feed.list_keys();
        if keys.is_empty() {
            if !ctl.pause(EMPTY_FEED_BACKOFF) {
                break;
            }
            continue;
        }
        {
            let _scope = ProfileScope::with_context(
                "consumer_pass",
                &[("statistic", v_str(statistic.name())), ("keys", v_int(keys.len() as u64))],
            );
            process_keys(&feed, metrics.as_ref(), statistic.as_ref(), &keys, &mut computations);
        }
        if !ctl.pause(period) {
            break;
        }
    }
    info(
        Domain::Consumer,
        "loop_exited",
        obj(&[
            ("statistic", v_str(statistic.name())),
            ("computations", v_int(computations)),
        ]),
    );
}
