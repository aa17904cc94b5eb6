//! NUMA topology and non-volatile memory devices

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{
    FeatureSource, HostPaths, Instance, SourceFeatures, discovery_error, list_entries,
    read_instance,
};
use crate::error::Result;

pub const NAME: &str = "memory";

pub struct MemorySource {
    host: HostPaths,
}

impl MemorySource {
    pub fn new(host: HostPaths) -> Self {
        Self { host }
    }
}

#[async_trait]
impl FeatureSource for MemorySource {
    fn name(&self) -> &str {
        NAME
    }

    async fn discover(&self) -> Result<SourceFeatures> {
        let mut features = SourceFeatures::new();

        let node_dir = self.host.path("sys/devices/system/node");
        let node_count = list_entries(&node_dir)
            .await
            .map_err(|e| discovery_error(NAME, &node_dir, e))?
            .iter()
            .filter(|(name, _)| {
                name.strip_prefix("node")
                    .is_some_and(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
            })
            .count();

        let numa = BTreeMap::from([
            ("is_numa".to_string(), (node_count > 1).to_string()),
            ("node_count".to_string(), node_count.to_string()),
        ]);
        features.add_attributes("numa", numa);

        let nd_dir = self.host.path("sys/bus/nd/devices");
        let mut devices: Vec<Instance> = Vec::new();
        for (name, path) in list_entries(&nd_dir)
            .await
            .map_err(|e| discovery_error(NAME, &nd_dir, e))?
        {
            let mut instance = read_instance(&path, &[("devtype", "devtype"), ("mode", "mode")])
                .await
                .map_err(|e| discovery_error(NAME, &path, e))?;
            instance.insert("name".to_string(), name);
            devices.push(instance);
        }
        features.add_instances("nv", devices);

        tracing::debug!(source = NAME, node_count, "discovered memory features");
        Ok(features)
    }
}
