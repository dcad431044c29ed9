//! Console ticker board: latest price per symbol, redrawn in place.

use anyhow::{bail, Result};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use crate::feed::SharedFeed;
use crate::logging::{info, obj, v_int, v_str, warn, Domain, ProfileScope};
use crate::observation::Observation;
use crate::worker::{LoopControl, RunState, Worker};

const EMPTY_FEED_BACKOFF: Duration = Duration::from_millis(100);

/// `AAPL: $  101.25 ↑  +0.50 | ...`
pub fn render_line(ticks: &[Observation]) -> String {
    let mut line = String::new();
    for obs in ticks {
        let arrow = if obs.is_uptick() { "↑" } else { "↓" };
        line.push_str(&format!(
            "{}: ${:>8.2} {} {:>+6.2} | ",
            obs.key, obs.value, arrow, obs.delta
        ));
    }
    line
}

pub struct Board {
    feed: Arc<SharedFeed>,
    period: Duration,
    worker: Worker,
}

impl Board {
    pub fn new(feed: Arc<SharedFeed>, period: Duration) -> Result<Self> {
        if period.is_zero() {
            bail!("board period must be non-zero");
        }
        Ok(Self {
            feed,
            period,
            worker: Worker::new("board"),
        })
    }

    pub fn start(&self) -> Result<bool> {
        let feed = Arc::clone(&self.feed);
        let period = self.period;
        self.worker.start(move |ctl| run(ctl, feed, period))
    }

    pub fn stop(&self) -> bool {
        self.worker.stop()
    }

    pub fn state(&self) -> RunState {
        self.worker.state()
    }
}

/// Redraw the board line in place.
pub fn draw<W: Write>(out: &mut W, ticks: &[Observation]) -> io::Result<()> {
    write!(out, "\r{}", render_line(ticks))?;
    out.flush()
}

/// Records console write failures, logging only the first one.
#[derive(Debug, Default)]
pub struct OutputErrors {
    count: u64,
}

impl OutputErrors {
    pub fn note(&mut self, result: io::Result<()>) {
        let Err(err) = result else {
            return;
        };
        self.count += 1;
        if self.count == 1 {
            warn(
                Domain::Board,
                "stdout_error",
                obj(&[("msg", v_str(&err.to_string()))]),
            );
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Latest tick for every key that has one.
pub fn snapshot(feed: &SharedFeed) -> Vec<Observation> {
    feed.list_keys()
        .iter()
        .filter_map(|key| feed.latest(key))
        .collect()
}

fn run(ctl: Arc<LoopControl>, feed: Arc<SharedFeed>, period: Duration) {
    info(
        Domain::Board,
        "loop_started",
        obj(&[("period_ms", v_int(period.as_millis() as u64))]),
    );
    let mut frames = 0u64;
    let mut errors = OutputErrors::default();
    let stdout = io::stdout();
    while ctl.is_running() {
        feed.wait_for_update(period);
        if !ctl.is_running() {
            break;
        }
        let ticks = snapshot(&feed);
        if ticks.is_empty() {
            if !ctl.pause(EMPTY_FEED_BACKOFF) {
                break;
            }
            continue;
        }
        {
            let _scope = ProfileScope::new("board_frame");
            errors.note(draw(&mut stdout.lock(), &ticks));
        }
        frames += 1;
        if !ctl.pause(period) {
            break;
        }
    }
    errors.note(writeln!(stdout.lock()));
    info(
        Domain::Board,
        "loop_exited",
        obj(&[("frames", v_int(frames)), ("write_errors", v_int(errors.count()))]),
    );
}
