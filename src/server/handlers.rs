// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Request handlers for relayed resources

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::relay::{Relay, RelayError, Selector, Snapshot, WatchOptions, WatchStream};

/// Query parameters understood by resource endpoints
///
/// Anything else a client sends (`limit`, `allowWatchBookmarks`, ...) is
/// accepted and ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuery {
    pub watch: Option<String>,
    pub resource_version: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub field_selector: Option<String>,
    pub label_selector: Option<String>,
}

impl ResourceQuery {
    pub fn is_watch(&self) -> bool {
        matches!(self.watch.as_deref(), Some("1") | Some("true"))
    }

    fn selector(&self, base: Selector) -> Result<Selector, RelayError> {
        Ok(base.with_query(self.field_selector.as_deref(), self.label_selector.as_deref())?)
    }

    /// `timeoutSeconds=0` means no timeout, as on the API server
    fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            timeout: self
                .timeout_seconds
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            ..Default::default()
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let code = StatusCode::from_u16(self.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (code, Json(self.to_status())).into_response()
    }
}

/// List or watch a collection (optionally within one namespace)
pub fn collection(relay: &Arc<Relay>, namespace: Option<String>, query: ResourceQuery) -> Response {
    debug!(
        resource = %relay.id(),
        namespace = ?namespace,
        watch = query.is_watch(),
        resource_version = ?query.resource_version,
        "Collection request"
    );

    let mut base = Selector::all();
    if let Some(namespace) = namespace {
        base = base.in_namespace(namespace);
    }

    let result = query.selector(base).and_then(|selector| {
        if query.is_watch() {
            watch(relay, selector, &query)
        } else {
            relay.list(&selector).map(|snapshot| list_response(relay, snapshot))
        }
    });

    result.unwrap_or_else(IntoResponse::into_response)
}

/// Get or watch a single named object
pub fn object(
    relay: &Arc<Relay>,
    namespace: Option<String>,
    name: String,
    query: ResourceQuery,
) -> Response {
    debug!(
        resource = %relay.id(),
        namespace = ?namespace,
        name = %name,
        watch = query.is_watch(),
        "Object request"
    );

    if query.is_watch() {
        let mut base = Selector::all().named(name);
        if let Some(namespace) = namespace {
            base = base.in_namespace(namespace);
        }
        return query
            .selector(base)
            .and_then(|selector| watch(relay, selector, &query))
            .unwrap_or_else(IntoResponse::into_response);
    }

    match relay.get_object(namespace.as_deref(), &name) {
        Ok(object) => Json(object).into_response(),
        Err(e) => e.into_response(),
    }
}

fn list_response(relay: &Relay, snapshot: Snapshot) -> Response {
    let info = relay.info();
    Json(json!({
        "apiVersion": info.api_version(),
        "kind": format!("{}List", info.kind()),
        "metadata": {"resourceVersion": snapshot.version},
        "items": snapshot.items,
    }))
    .into_response()
}

fn watch(relay: &Arc<Relay>, selector: Selector, query: &ResourceQuery) -> Result<Response, RelayError> {
    let since = query.resource_version.as_deref().unwrap_or("");
    let stream = relay.watch(since, selector, query.watch_options())?;
    Ok(stream_response(stream))
}

/// Newline-delimited JSON body, one chunk per event
fn stream_response(stream: WatchStream) -> Response {
    let body = stream.map(|event| {
        serde_json::to_vec(&event).map(|mut line| {
            line.push(b'\n');
            Bytes::from(line)
        })
    });

    (
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(watch: Option<&str>) -> ResourceQuery {
        ResourceQuery {
            watch: watch.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_watch() {
        assert!(query(Some("1")).is_watch());
        assert!(query(Some("true")).is_watch());
        assert!(!query(Some("false")).is_watch());
        assert!(!query(Some("yes")).is_watch());
        assert!(!query(None).is_watch());
    }

    #[test]
    fn test_watch_options_timeout() {
        let q = ResourceQuery {
            timeout_seconds: Some(30),
            ..Default::default()
        };
        assert_eq!(q.watch_options().timeout, Some(Duration::from_secs(30)));
        assert_eq!(query(None).watch_options().timeout, None);
    }

    #[test]
    fn test_zero_timeout_means_unbounded() {
        let q = ResourceQuery {
            timeout_seconds: Some(0),
            ..Default::default()
        };
        assert_eq!(q.watch_options().timeout, None);
    }

    #[test]
    fn test_query_deserializes_camel_case() {
        let q: ResourceQuery = serde_json::from_value(json!({
            "watch": "true",
            "resourceVersion": "42",
            "fieldSelector": "metadata.name=web",
            "allowWatchBookmarks": "true"
        }))
        .unwrap();
        assert!(q.is_watch());
        assert_eq!(q.resource_version.as_deref(), Some("42"));
        assert_eq!(q.field_selector.as_deref(), Some("metadata.name=web"));
    }
}
