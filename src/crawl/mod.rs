//! Crawl orchestration: the page worker state machine (C9), the run manifest (§3/§6),
//! and the controller that owns the queue, admission, and worker pool (C10).

mod controller;
mod manifest;
mod worker;

pub use controller::{Controller, LoggingProgress, ProgressSink};
pub use manifest::{PageRecord, RunManifest, Stats};
pub use worker::ProcessResult;
