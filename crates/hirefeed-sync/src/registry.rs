use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use hirefeed_adapters::{adapter_for_source, AdapterCredentials, Source, SourceAdapter};
use hirefeed_storage::HttpFetcher;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source: Source,
    #[serde(default)]
    pub display_name: Option<String>,
    pub enabled: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SourceRegistry {
    /// Every known provider, enabled.
    pub fn all_enabled() -> Self {
        Self {
            sources: Source::ALL
                .into_iter()
                .map(|source| SourceConfig {
                    source,
                    display_name: None,
                    enabled: true,
                    notes: None,
                })
                .collect(),
        }
    }

    /// Loads the registry file. A missing file enables every provider.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path)
            .await
            .with_context(|| format!("checking {}", path.display()))?
        {
            info!(path = %path.display(), "no source registry, enabling all providers");
            return Ok(Self::all_enabled());
        }
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Providers not listed are treated as disabled.
    pub fn is_enabled(&self, source: Source) -> bool {
        self.sources
            .iter()
            .any(|s| s.source == source && s.enabled)
    }

    pub fn enabled_sources(&self) -> Vec<Source> {
        Source::ALL
            .into_iter()
            .filter(|s| self.is_enabled(*s))
            .collect()
    }

    /// One adapter per enabled provider. Adapters missing credentials are kept
    /// but report themselves disabled, so refresh skips them.
    pub fn build_adapters(
        &self,
        http: Arc<HttpFetcher>,
        credentials: &AdapterCredentials,
    ) -> Vec<Arc<dyn SourceAdapter>> {
        self.enabled_sources()
            .into_iter()
            .map(|source| {
                let adapter = adapter_for_source(source, http.clone(), credentials);
                if !adapter.enabled() {
                    warn!(%source, "provider enabled in registry but credentials are missing");
                }
                adapter
            })
            .collect()
    }
}
