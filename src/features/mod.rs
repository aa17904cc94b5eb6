//! Node feature discovery
//!
//! Each [`FeatureSource`] inspects one area of the host (CPU, kernel, PCI bus,
//! ...) and reports its findings as [`SourceFeatures`]. Sources are registered
//! explicitly in a [`SourceRegistry`]; the validator runs every registered
//! source and only then merges the outputs into one read-only [`FeatureSet`].

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{CompatError, Result};

pub mod cpu;
pub mod kernel;
pub mod memory;
pub mod network;
pub mod pci;
pub mod storage;
pub mod system;
pub mod usb;

/// Attributes of one instance of a device-like feature
pub type Instance = BTreeMap<String, String>;

/// Value of a single discovered feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Flags(BTreeSet<String>),
    Attributes(BTreeMap<String, String>),
    Instances(Vec<Instance>),
}

impl Feature {
    pub fn kind(&self) -> &'static str {
        match self {
            Feature::Flags(_) => "flag",
            Feature::Attributes(_) => "attribute",
            Feature::Instances(_) => "instance",
        }
    }
}

/// Features reported by one source, keyed by the source-local feature name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceFeatures {
    features: BTreeMap<String, Feature>,
}

impl SourceFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_flags<I, S>(&mut self, name: &str, flags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features.insert(
            name.to_string(),
            Feature::Flags(flags.into_iter().map(Into::into).collect()),
        );
    }

    pub fn add_attributes(&mut self, name: &str, attributes: BTreeMap<String, String>) {
        self.features
            .insert(name.to_string(), Feature::Attributes(attributes));
    }

    pub fn add_instances(&mut self, name: &str, instances: Vec<Instance>) {
        self.features
            .insert(name.to_string(), Feature::Instances(instances));
    }

    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.features.get(name)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Unified, read-only view over the output of every feature source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureSet {
    features: BTreeMap<String, Feature>,
}

impl FeatureSet {
    /// Merge per-source outputs, qualifying each feature as `<source>.<feature>`
    pub fn from_sources<I>(outputs: I) -> Self
    where
        I: IntoIterator<Item = (String, SourceFeatures)>,
    {
        let mut features = BTreeMap::new();
        for (source, output) in outputs {
            for (name, feature) in output.features {
                features.insert(format!("{}.{}", source, name), feature);
            }
        }
        Self { features }
    }

    /// Look up a feature by its qualified name
    pub fn get(&self, qualified_name: &str) -> Option<&Feature> {
        self.features.get(qualified_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// A pluggable discovery unit producing node-observable facts
#[async_trait]
pub trait FeatureSource: Send + Sync {
    /// Unique source name, used as the feature name prefix
    fn name(&self) -> &str;

    /// Inspect the node and report this source's features
    async fn discover(&self) -> Result<SourceFeatures>;
}

/// Explicit registry of the feature sources that run for every validation
///
/// Sources are enumerated in ascending name order.
#[derive(Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Box<dyn FeatureSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in source, reading below `host`
    pub fn with_default_sources(host: &HostPaths) -> Self {
        let builtin: Vec<Box<dyn FeatureSource>> = vec![
            Box::new(cpu::CpuSource::new(host.clone())),
            Box::new(kernel::KernelSource::new(host.clone())),
            Box::new(memory::MemorySource::new(host.clone())),
            Box::new(network::NetworkSource::new(host.clone())),
            Box::new(pci::PciSource::new(host.clone())),
            Box::new(storage::StorageSource::new(host.clone())),
            Box::new(system::SystemSource::new(host.clone())),
            Box::new(usb::UsbSource::new(host.clone())),
        ];

        let mut registry = Self::new();
        for source in builtin {
            registry
                .sources
                .insert(source.name().to_string(), source);
        }
        registry
    }

    /// Add a source; names must be unique
    pub fn register(&mut self, source: Box<dyn FeatureSource>) -> Result<()> {
        let name = source.name().to_string();
        if self.sources.contains_key(&name) {
            return Err(CompatError::DuplicateSource { name });
        }
        self.sources.insert(name, source);
        Ok(())
    }

    pub fn sources(&self) -> impl Iterator<Item = &dyn FeatureSource> {
        self.sources.values().map(|s| s.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Location of the host filesystem that sources read from
///
/// Defaults to `/`. Set a different root when running in a container with
/// the host's `/proc`, `/sys` and `/etc` mounted elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    root: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }
}

impl HostPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a host-absolute path such as `proc/cpuinfo` below the root
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative.trim_start_matches('/'))
    }
}

/// Read a file, mapping a missing file to `None`
pub(crate) async fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read a single-value sysfs attribute, trimmed
pub(crate) async fn read_attribute(path: &Path) -> io::Result<Option<String>> {
    Ok(read_optional(path).await?.map(|s| s.trim().to_string()))
}

/// List directory entries sorted by name; a missing directory is empty
pub(crate) async fn list_entries(dir: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((name, entry.path()));
    }
    entries.sort();
    Ok(entries)
}

/// Collect the readable attribute files of one sysfs device directory
pub(crate) async fn read_instance(
    dir: &Path,
    files: &[(&str, &str)],
) -> io::Result<Instance> {
    let mut instance = Instance::new();
    for (file, attribute) in files {
        if let Some(value) = read_attribute(&dir.join(file)).await? {
            instance.insert(attribute.to_string(), value);
        }
    }
    Ok(instance)
}

pub(crate) fn discovery_error(source: &str, path: &Path, err: io::Error) -> CompatError {
    CompatError::Discovery {
        source_name: source.to_string(),
        details: format!("{}: {}", path.display(), err),
    }
}
