// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! HTTP front end of the relay
//!
//! Every relayed resource gets the conventional API paths:
//! - core group:    `/api/{version}/...`
//! - named groups:  `/apis/{group}/{version}/...`
//!
//! under which `{resource}`, `namespaces/{namespace}/{resource}` and
//! `namespaces/{namespace}/{resource}/{name}` are served (or `{resource}/{name}`
//! for cluster-scoped types). Each path answers `?watch=1|true` with a stream.

mod discovery;
mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::relay::{Relay, RelayRegistry};
use handlers::ResourceQuery;

/// HTTP server for relayed resources
pub struct RelayServer {
    port: u16,
    bind_address: String,
}

impl RelayServer {
    pub fn new(port: u16, bind_address: String) -> Self {
        Self { port, bind_address }
    }

    /// Serve until `shutdown` completes
    pub async fn run<F>(&self, registry: Arc<RelayRegistry>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(registry);

        let server_addr = format!("{}:{}", self.bind_address, self.port);
        let listener = TcpListener::bind(&server_addr)
            .await
            .with_context(|| format!("Failed to bind {}", server_addr))?;

        info!("kube-relay listening on {}", server_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server failed")
    }
}

/// Build the full router for a registry
pub fn router(registry: Arc<RelayRegistry>) -> Router {
    let mut app = Router::new()
        .route("/api", get(discovery::api_versions))
        .route("/apis", get(discovery::api_groups))
        .route("/api/{version}", get(discovery::core_resources))
        .route("/apis/{group}/{version}", get(discovery::group_resources))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(Arc::clone(&registry));

    for relay in registry.relays() {
        app = app.merge(resource_routes(relay));
    }

    app
}

/// Routes for one relayed resource
fn resource_routes(relay: &Arc<Relay>) -> Router {
    let prefix = relay.id().path_prefix();
    let plural = relay.info().plural().to_string();

    let collection = format!("{}/{}", prefix, plural);
    debug!(resource = %relay.id(), path = %collection, "Registering routes");

    let mut routes = Router::new().route(
        &collection,
        get({
            let relay = Arc::clone(relay);
            move |Query(query): Query<ResourceQuery>| async move {
                handlers::collection(&relay, None, query)
            }
        }),
    );

    if relay.info().is_namespaced() {
        routes = routes
            .route(
                &format!("{}/namespaces/{{namespace}}/{}", prefix, plural),
                get({
                    let relay = Arc::clone(relay);
                    move |Path(namespace): Path<String>, Query(query): Query<ResourceQuery>| async move {
                        handlers::collection(&relay, Some(namespace), query)
                    }
                }),
            )
            .route(
                &format!("{}/namespaces/{{namespace}}/{}/{{name}}", prefix, plural),
                get({
                    let relay = Arc::clone(relay);
                    move |Path((namespace, name)): Path<(String, String)>,
                          Query(query): Query<ResourceQuery>| async move {
                        handlers::object(&relay, Some(namespace), name, query)
                    }
                }),
            );
    } else {
        routes = routes.route(
            &format!("{}/{{name}}", collection),
            get({
                let relay = Arc::clone(relay);
                move |Path(name): Path<String>, Query(query): Query<ResourceQuery>| async move {
                    handlers::object(&relay, None, name, query)
                }
            }),
        );
    }

    routes
}

/// 200 once every relay has its initial snapshot, 503 with the rest listed
async fn readyz(State(registry): State<Arc<RelayRegistry>>) -> (StatusCode, String) {
    let unready = registry.unready();
    if unready.is_empty() {
        (StatusCode::OK, "ok".to_string())
    } else {
        let names: Vec<String> = unready.iter().map(|id| id.to_string()).collect();
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("waiting for: {}", names.join(", ")),
        )
    }
}
