//! # Pushkin Core
//!
//! Ingestion-and-delivery pipeline for the Pushkin segment relay: watch a
//! directory a media segmenter drops files into, queue every new file, and
//! POST each one to a list of HTTP targets, deleting or archiving it once
//! every target has acknowledged delivery.
//!
//! ## Pipeline
//!
//! - [`scan`] enqueues the backlog already on disk at startup
//! - [`watch`] feeds live filesystem events into the queue
//! - [`queue`] is the unbounded FIFO between producers and the uploader
//! - [`upload`] drains the queue and fans each file out to every target
//! - [`disposal`] settles a delivered file (delete, archive, or leave)
//!
//! Delivery is at-least-once per target: a failed fan-out re-enqueues the
//! path and the retry resends to all targets from the start. Queue contents
//! are in-memory only; after a crash the backlog scan rediscovers whatever
//! is still on disk.

pub mod config;
pub mod disposal;
pub mod error;
pub mod queue;
pub mod scan;
pub mod upload;
pub mod watch;

pub use config::{FileClass, RelayConfig};
pub use error::{RelayError, Result};
pub use queue::PendingQueue;
pub use upload::{Disposition, RetryPolicy, Uploader};
pub use watch::CacheWatcher;
