//! Block devices from `/sys/block`

use async_trait::async_trait;

use super::{
    FeatureSource, HostPaths, Instance, SourceFeatures, discovery_error, list_entries,
    read_instance,
};
use crate::error::Result;

pub const NAME: &str = "storage";

const BLOCK_ATTRIBUTES: &[(&str, &str)] = &[
    ("queue/rotational", "rotational"),
    ("queue/dax", "dax"),
    ("queue/zoned", "zoned"),
    ("queue/nr_zones", "nr_zones"),
];

pub struct StorageSource {
    host: HostPaths,
}

impl StorageSource {
    pub fn new(host: HostPaths) -> Self {
        Self { host }
    }
}

#[async_trait]
impl FeatureSource for StorageSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn discover(&self) -> Result<SourceFeatures> {
        let block_dir = self.host.path("sys/block");
        let mut devices: Vec<Instance> = Vec::new();

        for (name, path) in list_entries(&block_dir)
            .await
            .map_err(|e| discovery_error(NAME, &block_dir, e))?
        {
            let mut instance = read_instance(&path, BLOCK_ATTRIBUTES)
                .await
                .map_err(|e| discovery_error(NAME, &path, e))?;
            instance.insert("name".to_string(), name);
            devices.push(instance);
        }

        tracing::debug!(source = NAME, devices = devices.len(), "discovered storage features");
        let mut features = SourceFeatures::new();
        features.add_instances("block", devices);
        Ok(features)
    }
}
