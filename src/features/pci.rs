//! PCI devices from `/sys/bus/pci/devices`

use async_trait::async_trait;

use super::{
    FeatureSource, HostPaths, Instance, SourceFeatures, discovery_error, list_entries,
    read_instance,
};
use crate::error::Result;

pub const NAME: &str = "pci";

const DEVICE_ATTRIBUTES: &[(&str, &str)] = &[
    ("class", "class"),
    ("vendor", "vendor"),
    ("device", "device"),
    ("subsystem_vendor", "subsystem_vendor"),
    ("subsystem_device", "subsystem_device"),
    ("sriov_totalvfs", "sriov_totalvfs"),
];

pub struct PciSource {
    host: HostPaths,
}

impl PciSource {
    pub fn new(host: HostPaths) -> Self {
        Self { host }
    }
}

#[async_trait]
impl FeatureSource for PciSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn discover(&self) -> Result<SourceFeatures> {
        let devices_dir = self.host.path("sys/bus/pci/devices");
        let mut devices: Vec<Instance> = Vec::new();

        for (address, path) in list_entries(&devices_dir)
            .await
            .map_err(|e| discovery_error(NAME, &devices_dir, e))?
        {
            let raw = read_instance(&path, DEVICE_ATTRIBUTES)
                .await
                .map_err(|e| discovery_error(NAME, &path, e))?;
            let mut instance: Instance = raw
                .into_iter()
                .map(|(k, v)| {
                    let v = normalize_id(&k, &v);
                    (k, v)
                })
                .collect();
            instance.insert("address".to_string(), address);
            devices.push(instance);
        }

        tracing::debug!(source = NAME, devices = devices.len(), "discovered pci features");
        let mut features = SourceFeatures::new();
        features.add_instances("device", devices);
        Ok(features)
    }
}

/// Strip the `0x` prefix; the class keeps only its base class and subclass
fn normalize_id(attribute: &str, value: &str) -> String {
    let hex = value.strip_prefix("0x").unwrap_or(value);
    if attribute == "class" && hex.len() > 4 {
        hex[..4].to_string()
    } else {
        hex.to_string()
    }
}
