// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Resource discovery for relayed resource types.
//!
//! Each configured resource is described once at startup by asking the API
//! server for the resources of its group/version. The result is immutable for
//! the life of the relay.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResource;
use kube::Client;
use kube::core::GroupVersionKind;
use kube::discovery::{ApiCapabilities, ApiResource, Scope};
use serde_json::{Value, json};
use tracing::debug;

use super::resource_id::ResourceId;

/// Information about a discovered Kubernetes resource
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    /// The API resource definition
    pub api_resource: ApiResource,
    /// API capabilities (verbs, scope)
    pub capabilities: ApiCapabilities,
    /// Singular name (e.g., "service")
    pub singular_name: String,
    /// Short names (e.g., "svc")
    pub short_names: Vec<String>,
    /// API group (empty string for core v1)
    pub group: String,
    /// API version
    pub version: String,
}

impl ResourceInfo {
    /// Build from the discovery entry the API server returned for `id`
    pub fn from_api_resource(id: &ResourceId, resource: &APIResource) -> Self {
        let gvk = GroupVersionKind::gvk(&id.group, &id.version, &resource.kind);
        let scope = if resource.namespaced {
            Scope::Namespaced
        } else {
            Scope::Cluster
        };

        Self {
            api_resource: ApiResource::from_gvk_with_plural(&gvk, &resource.name),
            capabilities: ApiCapabilities {
                scope,
                subresources: vec![],
                operations: resource.verbs.clone(),
            },
            singular_name: resource.singular_name.clone(),
            short_names: resource.short_names.clone().unwrap_or_default(),
            group: id.group.clone(),
            version: id.version.clone(),
        }
    }

    /// Check if this resource is namespace-scoped
    pub fn is_namespaced(&self) -> bool {
        self.capabilities.scope == Scope::Namespaced
    }

    pub fn kind(&self) -> &str {
        &self.api_resource.kind
    }

    pub fn plural(&self) -> &str {
        &self.api_resource.plural
    }

    /// Supported verbs as reported by discovery
    pub fn verbs(&self) -> &[String] {
        &self.capabilities.operations
    }

    /// Get the full API group/version string
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Entry for an `APIResourceList` served by the relay itself
    ///
    /// Only read verbs are advertised since the relay never writes.
    pub fn discovery_entry(&self) -> Value {
        let verbs: Vec<&str> = ["get", "list", "watch"]
            .into_iter()
            .filter(|verb| self.verbs().iter().any(|v| v == verb))
            .collect();

        let mut entry = json!({
            "name": self.plural(),
            "singularName": self.singular_name,
            "namespaced": self.is_namespaced(),
            "kind": self.kind(),
            "verbs": verbs,
        });
        if !self.short_names.is_empty()
            && let Value::Object(ref mut map) = entry
        {
            map.insert("shortNames".to_string(), json!(self.short_names));
        }
        entry
    }
}

/// Maps a resource identifier to its schema metadata
#[async_trait]
pub trait ResourceDescriber: Send + Sync {
    async fn describe(&self, id: &ResourceId) -> Result<ResourceInfo>;
}

/// Describes resources by querying the API server's discovery endpoints
pub struct ApiServerDescriber {
    client: Client,
}

impl ApiServerDescriber {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceDescriber for ApiServerDescriber {
    async fn describe(&self, id: &ResourceId) -> Result<ResourceInfo> {
        let list = if id.is_core() {
            self.client.list_core_api_resources(&id.version).await
        } else {
            self.client.list_api_group_resources(&id.api_version()).await
        }
        .with_context(|| format!("Failed to discover resources for '{}'", id.api_version()))?;

        debug!(
            group_version = %list.group_version,
            resources = list.resources.len(),
            "Discovered API group"
        );

        find_resource(id, &list.resources)
    }
}

/// Pick the entry for `id` out of a group/version's resource list
pub fn find_resource(id: &ResourceId, resources: &[APIResource]) -> Result<ResourceInfo> {
    resources
        .iter()
        // Skip subresources (e.g., services/status)
        .filter(|r| !r.name.contains('/'))
        .find(|r| r.name == id.resource)
        .map(|r| ResourceInfo::from_api_resource(id, r))
        .ok_or_else(|| anyhow!("Resource '{}' not found on the API server", id))
}
