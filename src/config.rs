// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Relay configuration
//!
//! Settings come from three layers, later ones winning:
//! - built-in defaults
//! - an optional JSON file (`--config`)
//! - command line flags

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::Args;
use crate::kubernetes::ClusterSettings;
use crate::relay::event_log::DEFAULT_CAPACITY;

fn default_resources() -> Vec<String> {
    vec![
        "services".to_string(),
        "endpointslices.discovery.k8s.io".to_string(),
    ]
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_sync_timeout_secs() -> u64 {
    60
}

/// kube-relay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Resource specs to relay (`resource[.group][/version]`)
    #[serde(default = "default_resources")]
    pub resources: Vec<String>,

    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Event log capacity per resource
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// How long startup waits for the initial snapshots
    #[serde(default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,

    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    #[serde(default)]
    pub context: Option<String>,

    #[serde(default)]
    pub apiserver: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resources: default_resources(),
            bind: default_bind(),
            port: default_port(),
            capacity: default_capacity(),
            sync_timeout_secs: default_sync_timeout_secs(),
            kubeconfig: None,
            context: None,
            apiserver: None,
        }
    }
}

impl Config {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the effective configuration for a command line
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.merge_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Override fields with any flags given on the command line
    pub fn merge_args(&mut self, args: &Args) {
        if let Some(resources) = &args.resources {
            self.resources = resources
                .iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect();
        }
        if let Some(bind) = &args.bind {
            self.bind = bind.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(capacity) = args.capacity {
            self.capacity = capacity;
        }
        if let Some(secs) = args.sync_timeout {
            self.sync_timeout_secs = secs;
        }
        if args.kubeconfig.is_some() {
            self.kubeconfig = args.kubeconfig.clone();
        }
        if args.context.is_some() {
            self.context = args.context.clone();
        }
        if args.apiserver.is_some() {
            self.apiserver = args.apiserver.clone();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.resources.is_empty() {
            anyhow::bail!("At least one resource must be configured");
        }
        if self.capacity == 0 {
            anyhow::bail!("Event log capacity must be greater than zero");
        }
        Ok(())
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    pub fn cluster_settings(&self) -> ClusterSettings<'_> {
        ClusterSettings {
            kubeconfig: self.kubeconfig.as_deref(),
            context: self.context.as_deref(),
            apiserver: self.apiserver.as_deref(),
        }
    }
}
