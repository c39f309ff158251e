use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Timeout for connecting to K8s API
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where to find the upstream API server and its credentials
#[derive(Debug, Clone, Default)]
pub struct ClusterSettings<'a> {
    /// Path to a kubeconfig file
    pub kubeconfig: Option<&'a Path>,
    /// Context name inside the kubeconfig
    pub context: Option<&'a str>,
    /// API server URL, overriding the one from kubeconfig
    pub apiserver: Option<&'a str>,
}

impl ClusterSettings<'_> {
    fn uses_kubeconfig(&self) -> bool {
        self.kubeconfig.is_some() || self.context.is_some()
    }
}

/// Create a client for the upstream API server
///
/// Resolution order:
/// 1. Explicit kubeconfig and/or context (with optional apiserver override)
/// 2. Bare apiserver URL (no credentials)
/// 3. In-cluster service account, falling back to the default kubeconfig
pub async fn connect(settings: &ClusterSettings<'_>) -> Result<Client> {
    let mut config = if settings.uses_kubeconfig() {
        let kubeconfig = match settings.kubeconfig {
            Some(path) => Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?,
            None => Kubeconfig::read().context("Failed to read default kubeconfig")?,
        };
        let mut config = Config::from_custom_kubeconfig(
            kubeconfig,
            &KubeConfigOptions {
                context: settings.context.map(String::from),
                ..Default::default()
            },
        )
        .await
        .context("Failed to load kubeconfig")?;

        if let Some(server) = settings.apiserver {
            config.cluster_url = server
                .parse()
                .with_context(|| format!("Invalid apiserver URL '{}'", server))?;
        }
        config
    } else if let Some(server) = settings.apiserver {
        Config::new(
            server
                .parse()
                .with_context(|| format!("Invalid apiserver URL '{}'", server))?,
        )
    } else {
        Config::infer()
            .await
            .context("Unable to infer cluster configuration (in-cluster or kubeconfig)")?
    };

    config.connect_timeout = Some(CONNECT_TIMEOUT);

    info!(cluster_url = %config.cluster_url, "Connecting to upstream API server");

    Client::try_from(config).context("Failed to create Kubernetes client")
}
