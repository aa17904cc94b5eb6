use async_trait::async_trait;
use mockall::mock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use node_compat::{
    CompatError, CompatibilitySpec, FeatureSet, FeatureSource, ImageReference, Result, Rule,
    RuleEvaluator, RuleOutcome, SourceFeatures, SpecFetcher,
};

mock! {
    pub Fetcher {}

    #[async_trait]
    impl SpecFetcher for Fetcher {
        async fn fetch(&self, reference: &ImageReference) -> Result<CompatibilitySpec>;
    }
}

mock! {
    pub Evaluator {}

    impl RuleEvaluator for Evaluator {
        fn execute(&self, rule: &Rule, features: &FeatureSet) -> Result<RuleOutcome>;
    }
}

/// Fetcher that always returns the same specification
pub fn fetcher_returning(spec: CompatibilitySpec) -> MockFetcher {
    let mut fetcher = MockFetcher::new();
    fetcher
        .expect_fetch()
        .returning(move |_| Ok(spec.clone()));
    fetcher
}

/// Feature source returning a fixed feature map and counting its invocations
pub struct StaticSource {
    name: String,
    features: SourceFeatures,
    calls: Arc<AtomicUsize>,
}

impl StaticSource {
    pub fn new(name: &str, features: SourceFeatures) -> Self {
        Self {
            name: name.to_string(),
            features,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl FeatureSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self) -> Result<SourceFeatures> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.features.clone())
    }
}

/// Feature source whose discovery always fails
pub struct FailingSource {
    name: String,
}

impl FailingSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl FeatureSource for FailingSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self) -> Result<SourceFeatures> {
        Err(CompatError::Discovery {
            source_name: self.name.clone(),
            details: "simulated device enumeration failure".to_string(),
        })
    }
}

/// Feature source that takes `delay` before answering
pub struct SlowSource {
    name: String,
    delay: Duration,
}

impl SlowSource {
    pub fn new(name: &str, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

#[async_trait]
impl FeatureSource for SlowSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self) -> Result<SourceFeatures> {
        tokio::time::sleep(self.delay).await;
        Ok(SourceFeatures::new())
    }
}
