//! Node validation orchestration
//!
//! A run fetches the compatibility specification of an image, runs every
//! registered feature source, and evaluates the rules of each eligible group
//! against the resulting feature set. The run is fail-closed: the first
//! fetch, discovery or evaluation error aborts it and no partial results are
//! returned. Discovery always completes for every source before the first
//! rule is evaluated, and results follow document order.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};

use crate::config::Config;
use crate::error::{CompatError, Result};
use crate::features::{FeatureSet, HostPaths, SourceRegistry};
use crate::reference::ImageReference;
use crate::registry::{RegistryClient, SpecFetcher};
use crate::rules::{MatchExpressionEvaluator, RuleEvaluator};
use crate::specification::CompatibilitySpec;
use crate::tag_filter::TagFilter;

/// Verdict for one evaluated rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub rule_name: String,
    /// Tags of the group the rule belongs to
    pub group_tags: Vec<String>,
    pub is_valid: bool,
}

/// Pass/fail counts over a result list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl ValidationSummary {
    pub fn from_results(results: &[ValidationResult]) -> Self {
        let passed = results.iter().filter(|r| r.is_valid).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Deadline shared by every step of one validation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunContext {
    deadline: Option<Instant>,
}

impl RunContext {
    /// A context without a deadline
    pub fn background() -> Self {
        Self::default()
    }

    /// A context expiring `limit` from now; a limit past the clock's range never expires
    pub fn with_timeout(limit: Duration) -> Self {
        match Instant::now().checked_add(limit) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::background(),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail if the deadline has already passed
    pub fn check(&self, stage: &str) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(deadline_exceeded(stage)),
            _ => Ok(()),
        }
    }

    /// Start `step` if time remains and fail it once the deadline elapses
    pub async fn run<F, Fut, T>(&self, stage: &str, step: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.check(stage)?;
        match self.deadline {
            Some(deadline) => timeout_at(deadline, step())
                .await
                .map_err(|_| deadline_exceeded(stage))?,
            None => step().await,
        }
    }
}

fn deadline_exceeded(stage: &str) -> CompatError {
    CompatError::DeadlineExceeded {
        stage: stage.to_string(),
    }
}

/// Validates the node against the compatibility rules published for an image
pub struct NodeValidator {
    fetcher: Arc<dyn SpecFetcher>,
    sources: SourceRegistry,
    evaluator: Arc<dyn RuleEvaluator>,
}

impl NodeValidator {
    pub fn new(
        fetcher: Arc<dyn SpecFetcher>,
        sources: SourceRegistry,
        evaluator: Arc<dyn RuleEvaluator>,
    ) -> Self {
        Self {
            fetcher,
            sources,
            evaluator,
        }
    }

    /// Wire the registry client, the built-in sources and the match-expression evaluator
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = RegistryClient::new(config.registry.client_config())?;
        let sources =
            SourceRegistry::with_default_sources(&HostPaths::new(&config.discovery.host_root));
        Ok(Self::new(
            Arc::new(fetcher),
            sources,
            Arc::new(MatchExpressionEvaluator::new()),
        ))
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    /// Fetch, discover and evaluate; results follow specification order
    pub async fn validate(
        &self,
        ctx: &RunContext,
        reference: &ImageReference,
        filter: &TagFilter,
    ) -> Result<Vec<ValidationResult>> {
        let spec = ctx
            .run("specification fetch", || self.fetcher.fetch(reference))
            .await?;

        let features = self.discover(ctx).await?;

        self.evaluate(ctx, &spec, &features, filter)
    }

    /// Run every registered source in order and merge their features
    ///
    /// The merged set is only built once all sources succeeded.
    pub async fn discover(&self, ctx: &RunContext) -> Result<FeatureSet> {
        let mut outputs = Vec::with_capacity(self.sources.len());
        for source in self.sources.sources() {
            let stage = format!("feature discovery ({})", source.name());
            let output = ctx.run(&stage, || source.discover()).await?;
            outputs.push((source.name().to_string(), output));
        }
        Ok(FeatureSet::from_sources(outputs))
    }

    /// Evaluate the rules of every group admitted by `filter`
    pub fn evaluate(
        &self,
        ctx: &RunContext,
        spec: &CompatibilitySpec,
        features: &FeatureSet,
        filter: &TagFilter,
    ) -> Result<Vec<ValidationResult>> {
        let mut results = Vec::new();

        for group in &spec.compatibilities {
            if !filter.admits(&group.tags) {
                continue;
            }

            for rule in &group.rules {
                ctx.check(&format!("rule evaluation ({})", rule.name))?;
                let outcome = self.evaluator.execute(rule, features)?;
                results.push(ValidationResult {
                    rule_name: rule.name.clone(),
                    group_tags: group.tags.clone(),
                    is_valid: outcome.valid,
                });
            }
        }

        Ok(results)
    }
}
