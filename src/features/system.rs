//! Operating system release and host name

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::{
    FeatureSource, HostPaths, SourceFeatures, discovery_error, read_attribute, read_optional,
};
use crate::error::Result;

pub const NAME: &str = "system";

const OS_RELEASE_PATHS: &[&str] = &["etc/os-release", "usr/lib/os-release"];
const OS_RELEASE_KEYS: &[&str] = &["ID", "VERSION_ID"];

pub struct SystemSource {
    host: HostPaths,
}

impl SystemSource {
    pub fn new(host: HostPaths) -> Self {
        Self { host }
    }
}

#[async_trait]
impl FeatureSource for SystemSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn discover(&self) -> Result<SourceFeatures> {
        let mut release = BTreeMap::new();
        for candidate in OS_RELEASE_PATHS {
            let path = self.host.path(candidate);
            if let Some(content) = read_optional(&path)
                .await
                .map_err(|e| discovery_error(NAME, &path, e))?
            {
                release = parse_os_release(&content);
                break;
            }
        }

        let mut name = BTreeMap::new();
        let hostname_path = self.host.path("proc/sys/kernel/hostname");
        if let Some(nodename) = read_attribute(&hostname_path)
            .await
            .map_err(|e| discovery_error(NAME, &hostname_path, e))?
        {
            name.insert("nodename".to_string(), nodename);
        }

        tracing::debug!(
            source = NAME,
            id = release.get("ID").map(String::as_str),
            "discovered system features"
        );
        let mut features = SourceFeatures::new();
        features.add_attributes("osrelease", release);
        features.add_attributes("name", name);
        Ok(features)
    }
}

/// Extract the identifying keys of an os-release file
///
/// `VERSION_ID` is additionally split into `VERSION_ID.major` and
/// `VERSION_ID.minor` when it is dotted.
pub fn parse_os_release(content: &str) -> BTreeMap<String, String> {
    let mut release = BTreeMap::new();
    for line in content.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        if !OS_RELEASE_KEYS.contains(&key) {
            continue;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        release.insert(key.to_string(), value.to_string());
    }

    if let Some(version) = release.get("VERSION_ID").cloned() {
        let mut parts = version.split('.');
        if let Some(major) = parts.next().filter(|p| !p.is_empty()) {
            release.insert("VERSION_ID.major".to_string(), major.to_string());
        }
        if let Some(minor) = parts.next() {
            release.insert("VERSION_ID.minor".to_string(), minor.to_string());
        }
    }
    release
}
