//! Physical network interfaces from `/sys/class/net`

use async_trait::async_trait;

use super::{
    FeatureSource, HostPaths, Instance, SourceFeatures, discovery_error, list_entries,
    read_instance,
};
use crate::error::Result;

pub const NAME: &str = "network";

const DEVICE_ATTRIBUTES: &[(&str, &str)] = &[
    ("operstate", "operstate"),
    ("speed", "speed"),
    ("mtu", "mtu"),
    ("device/sriov_totalvfs", "sriov_totalvfs"),
];

pub struct NetworkSource {
    host: HostPaths,
}

impl NetworkSource {
    pub fn new(host: HostPaths) -> Self {
        Self { host }
    }
}

#[async_trait]
impl FeatureSource for NetworkSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn discover(&self) -> Result<SourceFeatures> {
        let net_dir = self.host.path("sys/class/net");
        let mut devices: Vec<Instance> = Vec::new();

        for (name, path) in list_entries(&net_dir)
            .await
            .map_err(|e| discovery_error(NAME, &net_dir, e))?
        {
            // Virtual interfaces have no backing device link.
            if tokio::fs::metadata(path.join("device")).await.is_err() {
                continue;
            }
            let mut instance = read_instance(&path, DEVICE_ATTRIBUTES)
                .await
                .map_err(|e| discovery_error(NAME, &path, e))?;
            instance.insert("name".to_string(), name);
            devices.push(instance);
        }

        tracing::debug!(source = NAME, devices = devices.len(), "discovered network features");
        let mut features = SourceFeatures::new();
        features.add_instances("device", devices);
        Ok(features)
    }
}
