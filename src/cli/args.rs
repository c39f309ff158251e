// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "kube-relay")]
#[command(author, version, about = "Relay Kubernetes list/watch traffic from a local cache")]
pub struct Args {
    /// JSON configuration file. Command line flags take precedence over it.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the kubeconfig file (defaults to in-cluster or $KUBECONFIG)
    #[arg(long, value_name = "FILE")]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, value_name = "CONTEXT")]
    pub context: Option<String>,

    /// Upstream API server URL
    #[arg(long, value_name = "URL")]
    pub apiserver: Option<String>,

    /// Resources to relay, comma-separated.
    /// Examples: --resources services, --resources "services,endpointslices.discovery.k8s.io/v1"
    #[arg(short, long, value_delimiter = ',', value_name = "RESOURCE")]
    pub resources: Option<Vec<String>>,

    /// Address to bind to
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Events retained per resource for watch resumption
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Seconds to wait for initial snapshots before serving
    #[arg(long, value_name = "SECONDS")]
    pub sync_timeout: Option<u64>,

    /// Also write logs to rotating files in this directory
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_unset() {
        let args = Args::parse_from(["kube-relay"]);
        assert!(args.resources.is_none());
        assert!(args.port.is_none());
        assert!(!args.verbose);
    }

    #[test]
    fn test_resources_are_comma_delimited() {
        let args = Args::parse_from([
            "kube-relay",
            "--resources",
            "services,endpointslices.discovery.k8s.io",
            "-p",
            "9000",
            "-v",
        ]);
        assert_eq!(
            args.resources.unwrap(),
            vec!["services", "endpointslices.discovery.k8s.io"]
        );
        assert_eq!(args.port, Some(9000));
        assert!(args.verbose);
    }

    #[test]
    fn test_cluster_flags() {
        let args = Args::parse_from([
            "kube-relay",
            "--kubeconfig",
            "/tmp/kc",
            "--context",
            "prod",
            "--sync-timeout",
            "5",
        ]);
        assert_eq!(args.kubeconfig, Some(PathBuf::from("/tmp/kc")));
        assert_eq!(args.context.as_deref(), Some("prod"));
        assert_eq!(args.sync_timeout, Some(5));
    }
}
