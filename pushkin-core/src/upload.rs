//! The uploader: drains the pending queue and fans each file out to every
//! configured target in order.
//!
//! Strictly serial: one file at a time, one target at a time. The per-file
//! fan-out is modeled as a small state machine so retry semantics and
//! disposal decisions stay testable without network I/O. A retry resends to
//! all targets from the start; targets must tolerate duplicate submissions
//! of the same named file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::disposal;
use crate::error::Result;
use crate::queue::PendingQueue;

/// Header carrying the file's basename.
pub const FILENAME_HEADER: &str = "X-Pushkin-Filename";
/// Header carrying the configured remote logical directory.
pub const DIRECTORY_HEADER: &str = "X-Pushkin-Directory";

/// Result of one (file, target) delivery attempt. Never cached; lives for
/// the duration of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// 201 with a JSON body.
    Delivered,
    /// A well-formed error response, or a transport failure / timeout.
    Rejected { message: String },
    /// The response body could not be parsed as JSON.
    Malformed,
}

/// Per-file fan-out progress across the target list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Attempting(usize),
    Delivered,
    Failed(usize),
}

impl DeliveryState {
    /// Leave `Pending`. With no targets configured the file is vacuously
    /// delivered.
    pub fn start(self, target_count: usize) -> Self {
        match self {
            DeliveryState::Pending if target_count == 0 => DeliveryState::Delivered,
            DeliveryState::Pending => DeliveryState::Attempting(0),
            other => other,
        }
    }

    /// Fold one attempt outcome into the state. The first non-delivered
    /// outcome is terminal; terminal states absorb further outcomes.
    pub fn advance(self, outcome: &UploadOutcome, target_count: usize) -> Self {
        match self {
            DeliveryState::Attempting(i) => match outcome {
                UploadOutcome::Delivered if i + 1 >= target_count => DeliveryState::Delivered,
                UploadOutcome::Delivered => DeliveryState::Attempting(i + 1),
                UploadOutcome::Rejected { .. } | UploadOutcome::Malformed => {
                    DeliveryState::Failed(i)
                }
            },
            other => other,
        }
    }
}

/// Aggregate result for one file after the fan-out ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    AllDelivered,
    /// Index of the first target that did not acknowledge the file.
    FailedAt(usize),
}

/// What to do with a path after a failed fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Requeue(Option<Duration>),
    Drop,
}

/// Retry semantics for failed deliveries, kept as an explicit value so the
/// baseline (retry forever, immediately) is visible and overridable.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    /// Give up on a path after this many failed fan-outs. `None` retries
    /// indefinitely.
    pub max_attempts: Option<u32>,
    /// Wait this long before re-enqueueing. `None` requeues immediately.
    pub backoff: Option<Duration>,
}

impl RetryPolicy {
    /// The baseline policy: unbounded retries, no backoff.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Decide the fate of a path that has now failed `attempts_made` times.
    pub fn after_failure(&self, attempts_made: u32) -> RetryAction {
        if let Some(cap) = self.max_attempts
            && attempts_made >= cap
        {
            return RetryAction::Drop;
        }
        RetryAction::Requeue(self.backoff)
    }
}

/// Classify one HTTP response into an [`UploadOutcome`].
pub fn parse_response(status: StatusCode, body: &str) -> UploadOutcome {
    let Ok(body) = serde_json::from_str::<serde_json::Value>(body) else {
        return UploadOutcome::Malformed;
    };
    if status == StatusCode::CREATED {
        return UploadOutcome::Delivered;
    }
    let message = body
        .get("message")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("upload failed with status {status}"));
    UploadOutcome::Rejected { message }
}

/// Serial drain loop over the pending queue.
pub struct Uploader {
    client: reqwest::Client,
    config: Arc<RelayConfig>,
    queue: Arc<PendingQueue>,
    retry: RetryPolicy,
    // Failed fan-outs per path, consulted by the retry policy. Entries are
    // cleared on success or drop; the map stays small because the queue
    // carries no per-path metadata.
    attempts: HashMap<PathBuf, u32>,
}

impl std::fmt::Debug for Uploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("targets", &self.config.target_urls.len())
            .field("retry", &self.retry)
            .field("tracked_paths", &self.attempts.len())
            .finish()
    }
}

impl Uploader {
    pub fn new(
        config: Arc<RelayConfig>,
        queue: Arc<PendingQueue>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            queue,
            retry,
            attempts: HashMap::new(),
        })
    }

    /// Drain the queue for the lifetime of the process.
    pub async fn run(mut self) {
        loop {
            let path = self.queue.pop().await;
            self.process(path).await;
        }
    }

    /// One drain iteration: read the file, fan it out, settle its fate.
    /// Returns `None` when the file vanished before it could be read.
    pub async fn process(&mut self, path: PathBuf) -> Option<Disposition> {
        let payload = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                // Racing a concurrent disposal or an external cleanup; the
                // path is no longer valid, so there is nothing to retry.
                debug!(path = %path.display(), error = %err, "file unreadable, dropping");
                self.attempts.remove(&path);
                return None;
            }
        };
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let disposition = self.fan_out(&basename, &payload).await;
        match disposition {
            Disposition::AllDelivered => {
                self.attempts.remove(&path);
                if let Some(class) = self.config.classify(&path) {
                    disposal::dispose(&path, class, &self.config).await;
                }
            }
            Disposition::FailedAt(_) => self.handle_failure(path).await,
        }

        let depth = self.queue.depth();
        if depth > 0 {
            debug!(depth, "files still enqueued");
        }

        Some(disposition)
    }

    /// Attempt every target in configured order, stopping at the first
    /// failure.
    async fn fan_out(&self, basename: &str, payload: &[u8]) -> Disposition {
        let target_count = self.config.target_urls.len();
        let mut state = DeliveryState::Pending.start(target_count);

        loop {
            match state {
                DeliveryState::Attempting(i) => {
                    let url = &self.config.target_urls[i];
                    let outcome = self.attempt(url, basename, payload).await;
                    match &outcome {
                        UploadOutcome::Delivered => {
                            info!(file = %basename, target = %url, "uploaded");
                        }
                        UploadOutcome::Rejected { message } => {
                            error!(file = %basename, target = %url, %message, "upload rejected");
                        }
                        UploadOutcome::Malformed => {
                            error!(file = %basename, target = %url, "non-JSON response from target");
                        }
                    }
                    state = state.advance(&outcome, target_count);
                }
                DeliveryState::Delivered => return Disposition::AllDelivered,
                DeliveryState::Failed(i) => return Disposition::FailedAt(i),
                DeliveryState::Pending => state = state.start(target_count),
            }
        }
    }

    /// One POST to one target.
    async fn attempt(&self, url: &str, basename: &str, payload: &[u8]) -> UploadOutcome {
        let response = match self
            .client
            .post(url)
            .header(FILENAME_HEADER, basename)
            .header(DIRECTORY_HEADER, self.config.remote_dir.as_str())
            .body(payload.to_vec())
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return UploadOutcome::Rejected {
                    message: format!("request failed: {err}"),
                };
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                return UploadOutcome::Rejected {
                    message: format!("failed to read response body: {err}"),
                };
            }
        };

        parse_response(status, &body)
    }

    /// Count the failure and either requeue the path or give up on it.
    async fn handle_failure(&mut self, path: PathBuf) {
        let attempts = self.attempts.entry(path.clone()).or_insert(0);
        *attempts += 1;
        let made = *attempts;

        match self.retry.after_failure(made) {
            RetryAction::Requeue(delay) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                self.queue.push(path);
            }
            RetryAction::Drop => {
                warn!(path = %path.display(), attempts = made, "giving up on file after repeated delivery failures");
                self.attempts.remove(&path);
            }
        }
    }
}
