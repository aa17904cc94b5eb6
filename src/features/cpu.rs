//! CPU features from `/proc/cpuinfo`

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{FeatureSource, HostPaths, SourceFeatures, discovery_error};
use crate::error::{CompatError, Result};

pub const NAME: &str = "cpu";

pub struct CpuSource {
    host: HostPaths,
}

impl CpuSource {
    pub fn new(host: HostPaths) -> Self {
        Self { host }
    }
}

#[async_trait]
impl FeatureSource for CpuSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn discover(&self) -> Result<SourceFeatures> {
        let path = self.host.path("proc/cpuinfo");
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| discovery_error(NAME, &path, e))?;

        let info = first_processor(&content);
        if info.is_empty() {
            return Err(CompatError::Discovery {
                source_name: NAME.to_string(),
                details: format!("{}: no processor entries", path.display()),
            });
        }

        let mut features = SourceFeatures::new();

        let flags = info
            .get("flags")
            .or_else(|| info.get("Features"))
            .map(|f| f.split_whitespace().map(str::to_uppercase).collect::<Vec<_>>())
            .unwrap_or_default();
        features.add_flags("cpuid", flags);

        let mut model = BTreeMap::new();
        let pairs = [
            ("vendor_id", &["vendor_id", "CPU implementer"][..]),
            ("family", &["cpu family", "CPU architecture"][..]),
            ("id", &["model", "CPU part"][..]),
        ];
        for (attribute, keys) in pairs {
            if let Some(value) = keys.iter().find_map(|k| info.get(*k)) {
                model.insert(attribute.to_string(), value.clone());
            }
        }
        features.add_attributes("model", model);

        let mut topology = BTreeMap::new();
        if let (Some(siblings), Some(cores)) = (
            info.get("siblings").and_then(|v| v.parse::<u32>().ok()),
            info.get("cpu cores").and_then(|v| v.parse::<u32>().ok()),
        ) {
            topology.insert(
                "hardware_multithreading".to_string(),
                (siblings > cores).to_string(),
            );
        }
        features.add_attributes("topology", topology);

        tracing::debug!(
            source = NAME,
            flags = info.contains_key("flags"),
            "discovered cpu features"
        );
        Ok(features)
    }
}

/// Key/value pairs of the first processor block
fn first_processor(content: &str) -> BTreeMap<String, String> {
    let mut info = BTreeMap::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            if info.is_empty() {
                continue;
            }
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            info.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    info
}
