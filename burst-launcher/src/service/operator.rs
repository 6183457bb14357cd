//! Cluster preparation
//!
//! Makes sure the target namespace exists and the Flux Operator is
//! installed before a MiniCluster is submitted. Both steps are best effort:
//! on a shared cluster the launcher may lack the rights to do either, and
//! then the operator is assumed to be present already.

use anyhow::Context;
use burst_client::ClusterApi;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Released install bundle of the Flux Operator
pub const DEFAULT_OPERATOR_MANIFEST: &str =
    "https://raw.githubusercontent.com/flux-framework/flux-operator/main/examples/dist/flux-operator.yaml";

/// Where the operator manifest comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    Url(String),
    Path(PathBuf),
    /// Operator is managed outside the launcher
    Skip,
}

impl ManifestSource {
    /// Interprets a `--flux-operator-yaml` value: a URL, a file path, or `none`
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("none") {
            ManifestSource::Skip
        } else if value.starts_with("http://") || value.starts_with("https://") {
            ManifestSource::Url(value.to_string())
        } else {
            ManifestSource::Path(PathBuf::from(value))
        }
    }
}

/// Installs the Flux Operator and the job namespace
pub struct OperatorInstaller {
    api: Arc<dyn ClusterApi>,
    source: ManifestSource,
    http: reqwest::Client,
}

impl OperatorInstaller {
    /// `http` downloads URL manifests and should carry a request timeout
    pub fn new(api: Arc<dyn ClusterApi>, source: ManifestSource, http: reqwest::Client) -> Self {
        Self { api, source, http }
    }

    /// Prepares the cluster for a MiniCluster in `namespace`
    ///
    /// Failures are logged and otherwise ignored; submission reports the
    /// real problem if the cluster turns out not to be ready. Returns early
    /// once `cancel` fires.
    pub async fn prepare(&self, namespace: &str, cancel: &CancellationToken) {
        let installed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Operator installation interrupted");
                return;
            }
            installed = self.install_operator() => installed,
        };
        if let Err(e) = installed {
            warn!(
                "Could not install the Flux Operator, assuming it is already present: {:#}",
                e
            );
        }

        let ensured = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            ensured = self.api.ensure_namespace(namespace) => ensured,
        };
        if let Err(e) = ensured {
            warn!(
                "Could not create namespace {}, assuming it exists: {}",
                namespace, e
            );
        }
    }

    async fn install_operator(&self) -> anyhow::Result<()> {
        let Some(manifest) = self.load().await? else {
            debug!("Operator installation skipped");
            return Ok(());
        };

        let applied = self
            .api
            .apply_manifest(&manifest)
            .await
            .context("Failed to apply operator manifest")?;
        info!("Applied Flux Operator manifest ({} objects)", applied);
        Ok(())
    }

    /// Reads the manifest text, `None` when installation is skipped
    async fn load(&self) -> anyhow::Result<Option<String>> {
        match &self.source {
            ManifestSource::Skip => Ok(None),
            ManifestSource::Path(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Ok(Some(text))
            }
            ManifestSource::Url(url) => {
                debug!("Fetching operator manifest from {}", url);
                let text = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .and_then(|response| response.error_for_status())
                    .with_context(|| format!("Failed to fetch {}", url))?
                    .text()
                    .await
                    .context("Failed to read operator manifest body")?;
                Ok(Some(text))
            }
        }
    }
}
