// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Registry of relays, one per configured resource type
//!
//! Built once at startup and shared read-only with the HTTP layer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{error, info, warn};

use super::{Relay, UpstreamState};
use crate::kubernetes::{ResourceDescriber, ResourceId, UpstreamSource};

pub struct RelayRegistry {
    /// Relays in configuration order
    relays: Vec<Arc<Relay>>,
}

impl RelayRegistry {
    /// Wrap already-created relays
    pub fn from_relays(relays: Vec<Arc<Relay>>) -> Self {
        Self { relays }
    }

    /// Describe every configured resource and start its upstream subscription
    ///
    /// Fails if a spec cannot be parsed, appears twice, or names a resource
    /// the API server does not know about. Does not wait for the initial
    /// snapshots; see [`RelayRegistry::wait_ready`].
    pub async fn start(
        specs: &[String],
        describer: &dyn ResourceDescriber,
        source: Arc<dyn UpstreamSource>,
        capacity: usize,
    ) -> Result<Self> {
        if specs.is_empty() {
            return Err(anyhow!("No resources configured"));
        }

        let mut ids = Vec::with_capacity(specs.len());
        let mut seen = HashSet::new();
        for spec in specs {
            let id = ResourceId::parse(spec)
                .with_context(|| format!("Invalid resource spec '{}'", spec))?;
            if !seen.insert(id.clone()) {
                return Err(anyhow!("Resource '{}' is configured more than once", id));
            }
            ids.push(id);
        }

        // Describe all resources in parallel
        let described = futures::future::join_all(ids.iter().map(|id| async move {
            describer
                .describe(id)
                .await
                .with_context(|| format!("Failed to describe resource '{}'", id))
        }))
        .await;

        let mut relays = Vec::with_capacity(ids.len());
        for (id, info) in ids.into_iter().zip(described) {
            let info = info?;
            info!(
                resource = %id,
                kind = %info.kind(),
                namespaced = info.is_namespaced(),
                verbs = ?info.verbs(),
                "Relaying resource"
            );
            relays.push(Arc::new(Relay::new(id, info, capacity)));
        }

        for relay in &relays {
            let stream = source.subscribe(relay.info());
            let task_relay = Arc::clone(relay);
            tokio::spawn(async move {
                let id = task_relay.id().clone();
                if let Err(e) = task_relay.run(stream).await {
                    error!(resource = %id, error = %e, "Upstream task terminated");
                }
            });
        }

        Ok(Self::from_relays(relays))
    }

    /// Wait for every relay's initial snapshot, up to `timeout`
    ///
    /// Returns the resources that are not ready when the wait ends, either
    /// because the deadline passed or because their subscription failed.
    pub async fn wait_ready(&self, timeout: Duration) -> Vec<ResourceId> {
        let start = Instant::now();
        let waits = futures::future::join_all(self.relays.iter().map(|relay| relay.wait_ready()));

        if tokio::time::timeout(timeout, waits).await.is_err() {
            warn!(
                timeout_secs = timeout.as_secs(),
                "Timed out waiting for initial snapshots"
            );
        }

        let unready = self.unready();
        if unready.is_empty() {
            info!(
                resources = self.relays.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "All initial snapshots ready"
            );
        }
        unready
    }

    /// Resources whose relay is not currently serving
    pub fn unready(&self) -> Vec<ResourceId> {
        self.relays
            .iter()
            .filter(|relay| relay.state() != UpstreamState::Ready)
            .map(|relay| relay.id().clone())
            .collect()
    }

    pub fn relays(&self) -> &[Arc<Relay>] {
        &self.relays
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }
}
