//! Simulated tick feed: one producer thread writes bounded per-symbol
//! histories into a shared feed, several consumer threads block on it and
//! compute rolling statistics.

pub mod board;
pub mod config;
pub mod consumer;
pub mod feed;
pub mod history;
pub mod logging;
pub mod metrics;
pub mod observation;
pub mod producer;
pub mod statistics;
pub mod worker;

pub use feed::{FeedStats, SharedFeed, WakePolicy};
pub use observation::Observation;
