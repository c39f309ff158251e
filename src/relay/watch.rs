// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Watch replay: the downstream side of a relay
//!
//! A watch is a stream generator. It optionally starts with a snapshot sent as
//! ADDED events, then loops: wait (bounded) for the log to move past the
//! watermark, replay what was missed, advance the watermark. The HTTP body
//! drives the stream, so a disconnected client simply drops it at the next
//! suspension point.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::event_log::{EventKind, LogEntry, ReplayStatus, format_version};
use super::{Relay, RelayError, Selector, UpstreamState, with_resource_version};

/// Upper bound on a single wait; idle watches wake at least this often
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);

pub type WatchStream = Pin<Box<dyn Stream<Item = WatchEvent> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    Error,
}

impl From<EventKind> for WatchEventType {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Added => WatchEventType::Added,
            EventKind::Modified => WatchEventType::Modified,
            EventKind::Deleted => WatchEventType::Deleted,
        }
    }
}

/// One frame of a watch response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub event_type: WatchEventType,
    pub object: Value,
}

impl WatchEvent {
    /// Frame for a log entry, stamped with the watermark that follows it
    fn from_entry(entry: &LogEntry) -> Self {
        Self {
            event_type: entry.event.kind.into(),
            object: with_resource_version(
                entry.event.object.clone(),
                &format_version(entry.version + 1),
            ),
        }
    }

    /// Snapshot frame; list items already carry the snapshot version
    fn added(object: Value) -> Self {
        Self {
            event_type: WatchEventType::Added,
            object,
        }
    }

    fn error(err: &RelayError) -> Self {
        Self {
            event_type: WatchEventType::Error,
            object: serde_json::to_value(err.to_status()).unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// End the stream after this long (`timeoutSeconds`)
    pub timeout: Option<Duration>,
    /// Maximum time between wake-ups of an idle stream
    pub keepalive: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            keepalive: KEEPALIVE_INTERVAL,
        }
    }
}

impl Relay {
    /// Start a watch from `since`
    ///
    /// An empty or `"0"` version starts with a fresh snapshot. Any other
    /// version is validated before the stream is created, so expired and
    /// malformed versions are reported as errors instead of stream frames.
    pub fn watch(
        self: &Arc<Self>,
        since: &str,
        selector: Selector,
        options: WatchOptions,
    ) -> Result<WatchStream, RelayError> {
        self.ensure_available()?;

        let (mut watermark, initial) = if since.is_empty() || since == "0" {
            let snapshot = self.list(&selector)?;
            let frames: Vec<WatchEvent> = snapshot
                .items
                .into_iter()
                .map(WatchEvent::added)
                .collect();
            (snapshot.version, frames)
        } else {
            let replay = self.log.get(since);
            match replay.status {
                ReplayStatus::Ok => (since.to_string(), Vec::new()),
                ReplayStatus::Gone => {
                    return Err(RelayError::Expired {
                        requested: since.to_string(),
                        current: replay.current_version,
                    });
                }
                ReplayStatus::Invalid => {
                    return Err(RelayError::InvalidVersion(since.to_string()));
                }
            }
        };

        debug!(
            resource = %self.id,
            from = %watermark,
            snapshot = initial.len(),
            "Watch started"
        );

        let relay = Arc::clone(self);
        let deadline = options.timeout.map(|t| Instant::now() + t);
        let keepalive = options.keepalive;

        Ok(Box::pin(async_stream::stream! {
            for frame in initial {
                yield frame;
            }

            loop {
                let wait = match deadline {
                    Some(deadline) => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            debug!(resource = %relay.id, "Watch timeout reached");
                            break;
                        }
                        remaining.min(keepalive)
                    }
                    None => keepalive,
                };

                relay.log.wait_for_change(&watermark, wait).await;

                let replay = relay.log.get(&watermark);
                match replay.status {
                    ReplayStatus::Gone => {
                        debug!(
                            resource = %relay.id,
                            watermark = %watermark,
                            oldest = ?relay.log.oldest_version(),
                            "Watcher fell behind the log"
                        );
                        yield WatchEvent::error(&RelayError::Expired {
                            requested: watermark.clone(),
                            current: replay.current_version,
                        });
                        break;
                    }
                    ReplayStatus::Invalid => {
                        yield WatchEvent::error(&RelayError::InvalidVersion(watermark.clone()));
                        break;
                    }
                    ReplayStatus::Ok if replay.entries.is_empty() => {
                        if let UpstreamState::Failed(reason) = relay.state() {
                            yield WatchEvent::error(&RelayError::UpstreamUnavailable {
                                resource: relay.id.to_string(),
                                reason,
                            });
                            break;
                        }
                        trace!(resource = %relay.id, "Watch keepalive");
                    }
                    ReplayStatus::Ok => {
                        for entry in &replay.entries {
                            if selector.matches(&entry.event.object) {
                                yield WatchEvent::from_entry(entry);
                            }
                        }
                        watermark = replay.current_version;
                    }
                }
            }
        }))
    }
}
