// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Discovery documents describing the relayed resource types
//!
//! Only configured resources are advertised, so clients using discovery see
//! exactly what the relay can serve.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use serde_json::{Value, json};

use crate::relay::RelayRegistry;

/// `GET /api`
pub async fn api_versions(State(registry): State<Arc<RelayRegistry>>) -> Json<Value> {
    let mut versions: Vec<&str> = registry
        .relays()
        .iter()
        .filter(|relay| relay.id().is_core())
        .map(|relay| relay.id().version.as_str())
        .collect();
    versions.sort_unstable();
    versions.dedup();
    if versions.is_empty() {
        versions.push("v1");
    }

    Json(json!({
        "kind": "APIVersions",
        "versions": versions,
        "serverAddressByClientCIDRs": [],
    }))
}

/// `GET /apis`
pub async fn api_groups(State(registry): State<Arc<RelayRegistry>>) -> Json<Value> {
    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for relay in registry.relays() {
        let id = relay.id();
        if id.is_core() {
            continue;
        }
        let versions = groups.entry(id.group.as_str()).or_default();
        if !versions.contains(&id.version.as_str()) {
            versions.push(id.version.as_str());
        }
    }

    let groups: Vec<Value> = groups
        .into_iter()
        .map(|(group, versions)| {
            let versions: Vec<Value> = versions
                .into_iter()
                .map(|version| {
                    json!({
                        "groupVersion": format!("{}/{}", group, version),
                        "version": version,
                    })
                })
                .collect();
            json!({
                "name": group,
                "preferredVersion": versions[0].clone(),
                "versions": versions,
            })
        })
        .collect();

    Json(json!({
        "kind": "APIGroupList",
        "apiVersion": "v1",
        "groups": groups,
    }))
}

/// `GET /api/{version}`
pub async fn core_resources(
    State(registry): State<Arc<RelayRegistry>>,
    Path(version): Path<String>,
) -> Response {
    resource_list(&registry, "", &version)
}

/// `GET /apis/{group}/{version}`
pub async fn group_resources(
    State(registry): State<Arc<RelayRegistry>>,
    Path((group, version)): Path<(String, String)>,
) -> Response {
    resource_list(&registry, &group, &version)
}

fn resource_list(registry: &RelayRegistry, group: &str, version: &str) -> Response {
    let resources: Vec<Value> = registry
        .relays()
        .iter()
        .filter(|relay| relay.id().group == group && relay.id().version == version)
        .map(|relay| relay.info().discovery_entry())
        .collect();

    let group_version = if group.is_empty() {
        version.to_string()
    } else {
        format!("{}/{}", group, version)
    };

    if resources.is_empty() {
        let status = Status {
            code: Some(404),
            message: Some(format!("the server could not find the requested resource ({})", group_version)),
            reason: Some("NotFound".to_string()),
            status: Some("Failure".to_string()),
            ..Default::default()
        };
        return (StatusCode::NOT_FOUND, Json(status)).into_response();
    }

    Json(json!({
        "kind": "APIResourceList",
        "apiVersion": "v1",
        "groupVersion": group_version,
        "resources": resources,
    }))
    .into_response()
}
