// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Bounded, version-indexed change log for one resource type
//!
//! Every pushed event gets the current `next_version` and the counter moves on
//! by one. Only the newest `capacity` entries are kept; readers ask for
//! everything from a watermark onwards and get `Gone` once that watermark has
//! been evicted.
//!
//! The retained entries live behind a `parking_lot::RwLock` that is never held
//! across an await point. Waiters are woken through a `tokio::sync::watch`
//! channel carrying the latest `next_version`, so the producer never waits on
//! slow readers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

/// Default number of retained events per resource type
pub const DEFAULT_CAPACITY: usize = 0x10000;

/// Kind of change carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Added => "ADDED",
            EventKind::Modified => "MODIFIED",
            EventKind::Deleted => "DELETED",
        }
    }
}

/// A single change to an object; its version is its position in the log
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: EventKind,
    pub object: Value,
}

impl ChangeEvent {
    pub fn new(kind: EventKind, object: Value) -> Self {
        Self { kind, object }
    }

    pub fn added(object: Value) -> Self {
        Self::new(EventKind::Added, object)
    }

    pub fn modified(object: Value) -> Self {
        Self::new(EventKind::Modified, object)
    }

    pub fn deleted(object: Value) -> Self {
        Self::new(EventKind::Deleted, object)
    }
}

/// A retained event together with the version it was assigned
#[derive(Debug, PartialEq)]
pub struct LogEntry {
    pub version: u64,
    pub event: ChangeEvent,
}

/// Outcome of a replay request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStatus {
    Ok,
    /// The requested watermark is no longer (or never was) retained
    Gone,
    /// The requested watermark is not a version token
    Invalid,
}

/// Result of [`EventLog::get`]
#[derive(Debug)]
pub struct Replay {
    pub status: ReplayStatus,
    pub entries: Vec<Arc<LogEntry>>,
    /// `next_version` at the time of the call, whatever the status
    pub current_version: String,
}

impl Replay {
    fn status(status: ReplayStatus, next_version: u64) -> Self {
        Self {
            status,
            entries: Vec::new(),
            current_version: format_version(next_version),
        }
    }
}

/// Parse a version token (base-10 unsigned integer)
pub fn parse_version(token: &str) -> Option<u64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

pub fn format_version(version: u64) -> String {
    version.to_string()
}

struct LogState {
    next_version: u64,
    entries: VecDeque<Arc<LogEntry>>,
}

impl LogState {
    fn append(&mut self, event: ChangeEvent, capacity: usize) {
        let entry = LogEntry {
            version: self.next_version,
            event,
        };
        self.entries.push_back(Arc::new(entry));
        self.next_version += 1;

        while self.entries.len() > capacity {
            self.entries.pop_front();
        }
    }
}

/// Replay cursor store for one resource type
pub struct EventLog {
    capacity: usize,
    state: RwLock<LogState>,
    notify: watch::Sender<u64>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (notify, _) = watch::channel(1);
        Self {
            capacity,
            state: RwLock::new(LogState {
                next_version: 1,
                entries: VecDeque::with_capacity(capacity.min(1024)),
            }),
            notify,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Version of the oldest retained entry, if any
    pub fn oldest_version(&self) -> Option<u64> {
        self.state.read().entries.front().map(|e| e.version)
    }

    /// Append a batch of events under a single lock acquisition
    pub fn push_all<I>(&self, events: I)
    where
        I: IntoIterator<Item = ChangeEvent>,
    {
        let next_version = {
            let mut state = self.state.write();
            for event in events {
                state.append(event, self.capacity);
            }
            state.next_version
        };
        self.notify.send_replace(next_version);
    }

    /// Return every retained entry from `since` (inclusive) onwards
    pub fn get(&self, since: &str) -> Replay {
        let state = self.state.read();
        let next_version = state.next_version;

        let Some(since) = parse_version(since) else {
            return Replay::status(ReplayStatus::Invalid, next_version);
        };

        if since == next_version {
            return Replay::status(ReplayStatus::Ok, next_version);
        }
        if since > next_version {
            return Replay::status(ReplayStatus::Gone, next_version);
        }

        // Retained versions are contiguous, so the offset of `since` is direct
        let Some(oldest) = state.entries.front().map(|e| e.version) else {
            return Replay::status(ReplayStatus::Gone, next_version);
        };
        if since < oldest {
            return Replay::status(ReplayStatus::Gone, next_version);
        }

        let offset = (since - oldest) as usize;
        Replay {
            status: ReplayStatus::Ok,
            entries: state.entries.range(offset..).cloned().collect(),
            current_version: format_version(next_version),
        }
    }

    /// Wait until `next_version` moves past `since`, or `max_wait` elapses
    ///
    /// Does not report which of the two happened; callers re-check with `get`.
    pub async fn wait_for_change(&self, since: &str, max_wait: Duration) {
        let Some(since) = parse_version(since) else {
            return;
        };

        // Subscribe before checking so a push in between still wakes us
        let mut rx = self.notify.subscribe();
        if *rx.borrow_and_update() > since {
            return;
        }

        let _ = tokio::time::timeout(max_wait, async {
            while rx.changed().await.is_ok() {
                if *rx.borrow_and_update() > since {
                    break;
                }
            }
        })
        .await;
    }

    /// Current `next_version` as an opaque token
    pub fn current_version(&self) -> String {
        format_version(self.state.read().next_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    fn obj(name: &str) -> Value {
        json!({"metadata": {"name": name}})
    }

    fn names(replay: &Replay) -> Vec<String> {
        replay
            .entries
            .iter()
            .map(|e| e.event.object["metadata"]["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_new_log_is_caught_up_at_one() {
        let log = EventLog::new(3);
        assert_eq!(log.current_version(), "1");
        assert_eq!(log.oldest_version(), None);

        let replay = log.get("1");
        assert_eq!(replay.status, ReplayStatus::Ok);
        assert!(replay.entries.is_empty());
        assert_eq!(replay.current_version, "1");
    }

    #[test]
    fn test_eviction_scenario() {
        let log = EventLog::new(3);
        for name in ["a", "b", "c", "d"] {
            log.push_all([ChangeEvent::added(obj(name))]);
        }

        assert_eq!(log.oldest_version(), Some(2));

        let gone = log.get("1");
        assert_eq!(gone.status, ReplayStatus::Gone);
        assert_eq!(gone.current_version, "5");

        let replay = log.get("2");
        assert_eq!(replay.status, ReplayStatus::Ok);
        assert_eq!(names(&replay), vec!["b", "c", "d"]);
        assert_eq!(replay.current_version, "5");

        let caught_up = log.get("5");
        assert_eq!(caught_up.status, ReplayStatus::Ok);
        assert!(caught_up.entries.is_empty());
    }

    #[test]
    fn test_versions_strictly_increase_across_evictions() {
        let log = EventLog::new(2);
        let mut last = 0u64;
        for i in 0..20 {
            log.push_all([ChangeEvent::modified(obj(&format!("o{}", i)))]);
            let current: u64 = log.current_version().parse().unwrap();
            assert!(current > last);
            last = current;
        }
        assert_eq!(last, 21);

        let replay = log.get("19");
        let versions: Vec<u64> = replay.entries.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![19, 20]);
    }

    #[test]
    fn test_incremental_reads_preserve_push_order() {
        let log = EventLog::new(100);
        let mut watermark = log.current_version();
        let mut seen = Vec::new();

        for batch in [vec!["a", "b"], vec![], vec!["c"], vec!["d", "e", "f"]] {
            for name in batch {
                log.push_all([ChangeEvent::added(obj(name))]);
            }
            let replay = log.get(&watermark);
            assert_eq!(replay.status, ReplayStatus::Ok);
            seen.extend(names(&replay));
            watermark = replay.current_version;
        }

        assert_eq!(seen, vec!["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn test_slow_reader_gets_gone() {
        let log = EventLog::new(3);
        log.push_all([ChangeEvent::added(obj("a"))]);
        let watermark = log.current_version();
        for name in ["b", "c", "d", "e"] {
            log.push_all([ChangeEvent::added(obj(name))]);
        }

        assert_eq!(log.get(&watermark).status, ReplayStatus::Gone);
    }

    #[test]
    fn test_invalid_and_future_tokens() {
        let log = EventLog::new(3);
        log.push_all([ChangeEvent::added(obj("a"))]);

        for token in ["", "abc", "-1", "1.5", " 1"] {
            let replay = log.get(token);
            assert_eq!(replay.status, ReplayStatus::Invalid, "token {:?}", token);
            assert_eq!(replay.current_version, "2");
        }

        assert_eq!(log.get("99").status, ReplayStatus::Gone);
        assert_eq!(log.get("0").status, ReplayStatus::Gone);
    }

    #[test]
    fn test_batch_push_assigns_consecutive_versions() {
        let log = EventLog::new(10);
        log.push_all(vec![
            ChangeEvent::added(obj("a")),
            ChangeEvent::modified(obj("a")),
            ChangeEvent::deleted(obj("a")),
        ]);

        let replay = log.get("1");
        let kinds: Vec<EventKind> = replay.entries.iter().map(|e| e.event.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Added, EventKind::Modified, EventKind::Deleted]
        );
        assert_eq!(replay.current_version, "4");
    }

    #[test]
    fn test_independent_readers() {
        let log = EventLog::new(10);
        for name in ["a", "b", "c", "d"] {
            log.push_all([ChangeEvent::added(obj(name))]);
        }

        let early = log.get("1");
        let late = log.get("3");
        assert_eq!(names(&early), vec!["a", "b", "c", "d"]);
        assert_eq!(names(&late), vec!["c", "d"]);

        log.push_all([ChangeEvent::added(obj("e"))]);
        assert_eq!(names(&log.get(&late.current_version)), vec!["e"]);
        assert_eq!(names(&log.get(&early.current_version)), vec!["e"]);
    }

    #[tokio::test]
    async fn test_wait_times_out_without_pushes() {
        let log = EventLog::new(3);
        let start = Instant::now();
        log.wait_for_change("1", Duration::from_millis(50)).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(40));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_behind() {
        let log = EventLog::new(3);
        log.push_all([ChangeEvent::added(obj("a"))]);

        let start = Instant::now();
        log.wait_for_change("1", Duration::from_secs(5)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_on_invalid_token() {
        let log = EventLog::new(3);

        let start = Instant::now();
        log.wait_for_change("not-a-version", Duration::from_secs(5)).await;
        log.wait_for_change("", Duration::from_secs(5)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_push() {
        let log = Arc::new(EventLog::new(3));
        let waiter = {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let start = Instant::now();
                log.wait_for_change("1", Duration::from_secs(10)).await;
                start.elapsed()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        log.push_all([ChangeEvent::added(obj("a"))]);

        let elapsed = waiter.await.unwrap();
        assert!(elapsed < Duration::from_secs(5));
        assert_eq!(names(&log.get("1")), vec!["a"]);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_see_their_own_suffix() {
        let log = Arc::new(EventLog::new(10));
        log.push_all([ChangeEvent::added(obj("a"))]);
        log.push_all([ChangeEvent::added(obj("b"))]);

        let spawn_reader = |from: &'static str| {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let mut watermark = from.to_string();
                let mut seen = Vec::new();
                while seen.len() < 10 {
                    log.wait_for_change(&watermark, Duration::from_millis(100))
                        .await;
                    let replay = log.get(&watermark);
                    assert_eq!(replay.status, ReplayStatus::Ok);
                    seen.extend(names(&replay));
                    watermark = replay.current_version;
                    if seen.last().map(String::as_str) == Some("e") {
                        break;
                    }
                }
                seen
            })
        };

        let first = spawn_reader("1");
        let second = spawn_reader("2");

        for name in ["c", "d", "e"] {
            tokio::time::sleep(Duration::from_millis(5)).await;
            log.push_all([ChangeEvent::added(obj(name))]);
        }

        assert_eq!(first.await.unwrap(), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(second.await.unwrap(), vec!["b", "c", "d", "e"]);
    }

    #[test]
    fn test_event_kind_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&EventKind::Modified).unwrap(),
            "\"MODIFIED\""
        );
        assert_eq!(EventKind::Deleted.as_str(), "DELETED");
    }
}
