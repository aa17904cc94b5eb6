//! # node-compat Library
//!
//! Validates a node against the compatibility rules published for a
//! container image. The rules are fetched from the image's compatibility
//! artifact in an OCI registry, host features are discovered from the local
//! system, and every rule of each selected group yields a pass/fail result.

pub mod cli;
pub mod config;
pub mod error;
pub mod error_reporter;
pub mod features;
pub mod output;
pub mod reference;
pub mod registry;
pub mod rules;
pub mod specification;
pub mod tag_filter;
pub mod telemetry;
pub mod validator;

pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigError, ConfigManager};
pub use error::{CompatError, Result};
pub use features::{Feature, FeatureSet, FeatureSource, HostPaths, SourceFeatures, SourceRegistry};
pub use output::{Output, ValidationReport};
pub use reference::ImageReference;
pub use registry::{RegistryClient, RegistryClientConfig, SpecFetcher};
pub use rules::{MatchExpressionEvaluator, RuleEvaluator, RuleOutcome};
pub use specification::{
    CompatibilityGroup, CompatibilitySpec, FeatureMatcherTerm, MatchAnyElem, MatchExpression,
    MatchOp, Rule,
};
pub use tag_filter::TagFilter;
pub use validator::{NodeValidator, RunContext, ValidationResult, ValidationSummary};
