use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::time::sleep;

use tickfeed::board::Board;
use tickfeed::config::{parse_runtime, Config, FALLBACK_RUNTIME_SECS};
use tickfeed::consumer::Consumer;
use tickfeed::feed::SharedFeed;
use tickfeed::logging::{self, info, obj, v_int, v_num, v_str, warn, Domain};
use tickfeed::metrics::LatencyMonitor;
use tickfeed::producer::Producer;
use tickfeed::statistics::{RollingMean, RollingVolatility};

#[tokio::main]
async fn main() -> Result<()> {
    let mut cfg = Config::from_env();
    if let Some(raw) = std::env::args().nth(1) {
        cfg.runtime_secs = match parse_runtime(&raw) {
            Ok(secs) => secs,
            Err(err) => {
                warn(
                    Domain::System,
                    "runtime_arg_rejected",
                    obj(&[
                        ("msg", v_str(&err.to_string())),
                        ("fallback_secs", v_int(FALLBACK_RUNTIME_SECS)),
                    ]),
                );
                FALLBACK_RUNTIME_SECS
            }
        };
    }
    cfg.validate().context("invalid configuration")?;

    let feed = Arc::new(SharedFeed::with_policy(cfg.history_capacity, cfg.wake_policy));

    let mut fields = obj(&[
        ("run_id", v_str(logging::run_id())),
        ("feed_capacity", v_int(feed.capacity() as u64)),
    ]);
    fields.insert("wake_policy".to_string(), serde_json::to_value(feed.policy())?);
    fields.insert("config".to_string(), serde_json::to_value(&cfg)?);
    info(Domain::System, "startup", fields);
    let monitor = Arc::new(LatencyMonitor::new());

    let producer = Producer::new(
        Arc::clone(&feed),
        monitor.clone(),
        cfg.symbols.clone(),
        cfg.producer_settings(),
    )?;
    let board = Board::new(Arc::clone(&feed), cfg.board_period())?;
    let mean = Consumer::new(
        Arc::clone(&feed),
        monitor.clone(),
        RollingMean::new(cfg.mean_window),
        cfg.mean_period(),
    )?;
    let volatility = Consumer::new(
        Arc::clone(&feed),
        monitor.clone(),
        RollingVolatility::new(cfg.vol_window),
        cfg.vol_period(),
    )?;

    producer.start()?;
    // Let some history accumulate before readers attach.
    sleep(cfg.startup_delay()).await;
    board.start()?;
    mean.start()?;
    volatility.start()?;

    info(
        Domain::System,
        "running",
        obj(&[("runtime_secs", v_int(cfg.runtime_secs))]),
    );
    tokio::select! {
        res = signal::ctrl_c() => {
            if let Err(err) = res {
                warn(Domain::System, "signal_error", obj(&[("msg", v_str(&err.to_string()))]));
            }
            info(Domain::System, "interrupted", obj(&[]));
        }
        _ = sleep(cfg.runtime()) => {
            info(Domain::System, "runtime_elapsed", obj(&[]));
        }
    }

    feed.shutdown_now();
    // Joining worker threads blocks; keep it off the async workers.
    tokio::task::spawn_blocking(move || {
        producer.stop();
        board.stop();
        mean.stop();
        volatility.stop();
    })
    .await
    .context("shutdown task failed")?;

    let report = monitor.report();
    let stats = feed.stats();
    println!();
    println!("{}", report);
    println!("--- Shared Buffer Statistics ---");
    println!("Total Writes: {}", stats.writes);
    println!("Total Reads: {}", stats.reads);
    println!("Read/Write Ratio: {:.2}", stats.read_write_ratio());

    let mut fields = obj(&[
        ("writes", v_int(stats.writes)),
        ("reads", v_int(stats.reads)),
        ("read_write_ratio", v_num(stats.read_write_ratio())),
    ]);
    fields.insert("report".to_string(), serde_json::to_value(&report)?);
    info(Domain::Metrics, "final_report", fields);
    Ok(())
}
