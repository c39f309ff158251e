// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Per-resource relay between the upstream change feed and downstream readers
//!
//! A [`Relay`] owns the object index and the event log of one resource type.
//! Its upstream task is the only writer; every list and watch request is a
//! reader. The writer holds the index lock while it pushes into the log, so a
//! snapshot and the version paired with it are always consistent.

mod error;
pub mod event_log;
pub mod index;
pub mod registry;
pub mod selector;
mod watch;

use std::sync::Arc;

use anyhow::{Result, anyhow};
use futures::StreamExt;
use kube::api::DynamicObject;
use kube::runtime::watcher::Event;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::watch as state_watch;
use tracing::{debug, error, info, trace, warn};

use crate::kubernetes::upstream::{self, UpstreamStream};
use crate::kubernetes::{ResourceId, ResourceInfo};

pub use error::RelayError;
pub use event_log::{ChangeEvent, EventKind, EventLog};
pub use index::{ObjectIndex, ObjectKey};
pub use registry::RelayRegistry;
pub use selector::Selector;
pub use watch::{WatchOptions, WatchStream};

/// Sync state of a relay's upstream subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamState {
    /// Initial list not finished yet
    Syncing,
    Ready,
    /// Subscription ended; the relay no longer receives changes
    Failed(String),
}

/// Objects of a resource type at one point of its event history
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Watermark to resume watching from
    pub version: String,
    pub items: Vec<Value>,
}

pub struct Relay {
    id: ResourceId,
    info: ResourceInfo,
    index: RwLock<ObjectIndex>,
    log: EventLog,
    state: state_watch::Sender<UpstreamState>,
}

impl Relay {
    pub fn new(id: ResourceId, info: ResourceInfo, capacity: usize) -> Self {
        let (state, _) = state_watch::channel(UpstreamState::Syncing);
        Self {
            id,
            info,
            index: RwLock::new(ObjectIndex::new()),
            log: EventLog::new(capacity),
            state,
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn info(&self) -> &ResourceInfo {
        &self.info
    }

    pub fn state(&self) -> UpstreamState {
        self.state.borrow().clone()
    }

    /// Wait until the initial sync completes or the subscription fails
    pub async fn wait_ready(&self) -> UpstreamState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|s| *s != UpstreamState::Syncing).await {
            Ok(state) => (*state).clone(),
            Err(_) => self.state(),
        }
    }

    /// Consume the upstream feed until it ends or fails permanently
    pub async fn run(self: Arc<Self>, mut stream: UpstreamStream) -> Result<()> {
        info!(
            resource = %self.id,
            kind = %self.info.kind(),
            capacity = self.log.capacity(),
            "Starting upstream subscription"
        );

        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => self.apply(event),
                Err(e) if upstream::is_fatal(&e) => {
                    self.fail(e.to_string());
                    return Err(anyhow!("Upstream watch for {} failed: {}", self.id, e));
                }
                Err(e) => {
                    warn!(resource = %self.id, error = %e, "Upstream watch error, retrying");
                }
            }
        }

        self.fail("upstream stream ended".to_string());
        Err(anyhow!("Upstream stream for {} ended", self.id))
    }

    /// Apply one upstream event to the index and record the resulting changes
    pub fn apply(&self, event: Event<DynamicObject>) {
        let mut relisted = false;
        let mut index = self.index.write();

        let changes: Vec<ChangeEvent> = match event {
            Event::Apply(object) => index.upsert(self.to_value(object)).into_iter().collect(),
            Event::Delete(object) => index.remove(self.to_value(object)).into_iter().collect(),
            Event::Init => {
                index.begin_relist();
                Vec::new()
            }
            Event::InitApply(object) => {
                index.stage(self.to_value(object));
                Vec::new()
            }
            Event::InitDone => {
                relisted = true;
                index.finish_relist()
            }
        };

        for change in &changes {
            trace!(
                resource = %self.id,
                kind = change.kind.as_str(),
                object = %ObjectKey::of(&change.object).map(|k| k.to_string()).unwrap_or_default(),
                "Recording change"
            );
        }

        let change_count = changes.len();
        if change_count > 0 {
            self.log.push_all(changes);
        }
        let object_count = index.len();
        drop(index);

        if relisted {
            debug!(
                resource = %self.id,
                objects = object_count,
                changes = change_count,
                version = %self.log.current_version(),
                "Upstream list complete"
            );
            self.mark_ready(object_count);
        }
    }

    fn to_value(&self, object: DynamicObject) -> Value {
        upstream::object_to_value(object, &self.info.api_resource)
    }

    fn mark_ready(&self, objects: usize) {
        let became_ready = self.state.send_if_modified(|state| {
            if *state == UpstreamState::Syncing {
                *state = UpstreamState::Ready;
                true
            } else {
                false
            }
        });
        if became_ready {
            info!(resource = %self.id, objects, "Initial snapshot ready");
        }
    }

    fn fail(&self, reason: String) {
        error!(resource = %self.id, reason = %reason, "Upstream subscription stopped");
        self.state.send_replace(UpstreamState::Failed(reason));
    }

    fn ensure_available(&self) -> Result<(), RelayError> {
        let reason = match &*self.state.borrow() {
            UpstreamState::Ready => return Ok(()),
            UpstreamState::Syncing => "initial sync in progress".to_string(),
            UpstreamState::Failed(reason) => reason.clone(),
        };
        Err(RelayError::UpstreamUnavailable {
            resource: self.id.to_string(),
            reason,
        })
    }

    /// Current objects matching `selector`, with the version to watch from
    ///
    /// Every item carries the snapshot version as its `resourceVersion`.
    pub fn list(&self, selector: &Selector) -> Result<Snapshot, RelayError> {
        self.ensure_available()?;

        let index = self.index.read();
        let version = self.log.current_version();
        let items = index
            .iter()
            .filter(|object| selector.matches(object))
            .map(|object| with_resource_version(object.clone(), &version))
            .collect();

        Ok(Snapshot { version, items })
    }

    /// A single current object, stamped with the current log version
    pub fn get_object(&self, namespace: Option<&str>, name: &str) -> Result<Value, RelayError> {
        self.ensure_available()?;

        let key = ObjectKey::new(namespace, name);
        let index = self.index.read();
        let object = index.get(&key).ok_or_else(|| RelayError::NotFound {
            resource: self.info.plural().to_string(),
            name: name.to_string(),
        })?;

        Ok(with_resource_version(object.clone(), &self.log.current_version()))
    }
}

/// Rewrite `metadata.resourceVersion` to a version of this relay's log
///
/// Upstream versions mean nothing to the log, so every object leaving the
/// relay carries the watermark a client should resume watching from.
fn with_resource_version(mut object: Value, version: &str) -> Value {
    if let Some(Value::Object(metadata)) = object.get_mut("metadata") {
        metadata.insert(
            "resourceVersion".to_string(),
            Value::String(version.to_string()),
        );
    }
    object
}
