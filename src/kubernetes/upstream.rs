// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Upstream change feed for a relayed resource type
//!
//! One `kube::runtime::watcher` per resource type, across all namespaces.
//! The watcher performs the initial list, resumes watches, and re-lists on
//! desync; the relay consumes its events in order.

use futures::StreamExt;
use futures::stream::BoxStream;
use kube::Api;
use kube::Client;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Event};
use serde_json::Value;

use super::discovery::ResourceInfo;

/// Ordered stream of watcher events for one resource type
pub type UpstreamStream = BoxStream<'static, Result<Event<DynamicObject>, watcher::Error>>;

/// Source of upstream change feeds
pub trait UpstreamSource: Send + Sync {
    fn subscribe(&self, info: &ResourceInfo) -> UpstreamStream;
}

/// Watches resources on a live API server
pub struct WatcherSource {
    client: Client,
}

impl WatcherSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl UpstreamSource for WatcherSource {
    fn subscribe(&self, info: &ResourceInfo) -> UpstreamStream {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &info.api_resource);
        watcher::watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed()
    }
}

/// Errors that will not go away by retrying (bad credentials, missing RBAC)
pub fn is_fatal(err: &watcher::Error) -> bool {
    let api_error = match err {
        watcher::Error::InitialListFailed(kube::Error::Api(e))
        | watcher::Error::WatchStartFailed(kube::Error::Api(e))
        | watcher::Error::WatchFailed(kube::Error::Api(e))
        | watcher::Error::WatchError(e) => e,
        _ => return false,
    };
    matches!(api_error.code, 401 | 403)
}

/// Convert a watched object to JSON
///
/// Objects from list responses don't carry apiVersion/kind, so both are
/// injected from the resource definition.
pub fn object_to_value(object: DynamicObject, resource: &ApiResource) -> Value {
    let mut value = serde_json::to_value(object).unwrap_or(Value::Null);
    if let Value::Object(ref mut map) = value {
        map.insert(
            "apiVersion".to_string(),
            Value::String(resource.api_version.clone()),
        );
        map.insert("kind".to_string(), Value::String(resource.kind.clone()));
    }
    value
}
