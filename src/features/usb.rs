//! USB devices from `/sys/bus/usb/devices`

use async_trait::async_trait;

use super::{
    FeatureSource, HostPaths, Instance, SourceFeatures, discovery_error, list_entries,
    read_attribute, read_instance,
};
use crate::error::Result;

pub const NAME: &str = "usb";

const DEVICE_ATTRIBUTES: &[(&str, &str)] = &[
    ("idVendor", "vendor"),
    ("idProduct", "device"),
    ("bDeviceClass", "class"),
    ("serial", "serial"),
];

pub struct UsbSource {
    host: HostPaths,
}

impl UsbSource {
    pub fn new(host: HostPaths) -> Self {
        Self { host }
    }
}

#[async_trait]
impl FeatureSource for UsbSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn discover(&self) -> Result<SourceFeatures> {
        let devices_dir = self.host.path("sys/bus/usb/devices");
        let mut devices: Vec<Instance> = Vec::new();

        for (_, path) in list_entries(&devices_dir)
            .await
            .map_err(|e| discovery_error(NAME, &devices_dir, e))?
        {
            // Interfaces and hubs without a vendor id are not devices.
            let has_vendor = read_attribute(&path.join("idVendor"))
                .await
                .map_err(|e| discovery_error(NAME, &path, e))?
                .is_some();
            if !has_vendor {
                continue;
            }
            let instance = read_instance(&path, DEVICE_ATTRIBUTES)
                .await
                .map_err(|e| discovery_error(NAME, &path, e))?;
            devices.push(instance);
        }

        tracing::debug!(source = NAME, devices = devices.len(), "discovered usb features");
        let mut features = SourceFeatures::new();
        features.add_instances("device", devices);
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Feature;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_discover_usb_devices() {
        let temp_dir = TempDir::new().unwrap();
        let usb = temp_dir.path().join("sys/bus/usb/devices");
        tokio::fs::create_dir_all(usb.join("1-1")).await.unwrap();
        tokio::fs::write(usb.join("1-1/idVendor"), "1d6b\n").await.unwrap();
        tokio::fs::write(usb.join("1-1/idProduct"), "0002\n").await.unwrap();
        tokio::fs::write(usb.join("1-1/bDeviceClass"), "09\n").await.unwrap();
        tokio::fs::create_dir_all(usb.join("1-1:1.0")).await.unwrap();

        let features = UsbSource::new(HostPaths::new(temp_dir.path()))
            .discover()
            .await
            .unwrap();

        match features.get("device") {
            Some(Feature::Instances(devices)) => {
                assert_eq!(devices.len(), 1);
                assert_eq!(devices[0]["vendor"], "1d6b");
                assert_eq!(devices[0]["device"], "0002");
                assert_eq!(devices[0]["class"], "09");
                assert!(!devices[0].contains_key("serial"));
            }
            other => panic!("unexpected device feature: {:?}", other),
        }
    }
}
