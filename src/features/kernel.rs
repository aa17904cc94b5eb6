//! Kernel version and loaded modules

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::{FeatureSource, HostPaths, SourceFeatures, discovery_error, read_optional};
use crate::error::Result;

pub const NAME: &str = "kernel";

static VERSION_REGEX: OnceLock<Regex> = OnceLock::new();

fn version_regex() -> &'static Regex {
    VERSION_REGEX.get_or_init(|| {
        Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+))?").expect("Failed to compile kernel version regex")
    })
}

pub struct KernelSource {
    host: HostPaths,
}

impl KernelSource {
    pub fn new(host: HostPaths) -> Self {
        Self { host }
    }
}

#[async_trait]
impl FeatureSource for KernelSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn discover(&self) -> Result<SourceFeatures> {
        let release_path = self.host.path("proc/sys/kernel/osrelease");
        let release = tokio::fs::read_to_string(&release_path)
            .await
            .map_err(|e| discovery_error(NAME, &release_path, e))?;

        let mut features = SourceFeatures::new();
        features.add_attributes("version", parse_version(release.trim()));

        let modules_path = self.host.path("proc/modules");
        let modules = read_optional(&modules_path)
            .await
            .map_err(|e| discovery_error(NAME, &modules_path, e))?
            .unwrap_or_default();
        let loaded: Vec<String> = modules
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect();
        tracing::debug!(
            source = NAME,
            release = release.trim(),
            modules = loaded.len(),
            "discovered kernel features"
        );
        features.add_flags("loadedmodule", loaded);

        Ok(features)
    }
}

/// Split a release string such as `5.15.0-91-generic` into its components
pub fn parse_version(release: &str) -> BTreeMap<String, String> {
    let mut version = BTreeMap::new();
    version.insert("full".to_string(), release.to_string());

    if let Some(caps) = version_regex().captures(release) {
        let parts = ["major", "minor", "revision"];
        for (i, part) in parts.iter().enumerate() {
            if let Some(m) = caps.get(i + 1) {
                version.insert(part.to_string(), m.as_str().to_string());
            }
        }
    }
    version
}
