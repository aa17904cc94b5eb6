use thiserror::Error;

/// Main error type covering every way a node validation run can fail
#[derive(Error, Debug)]
pub enum CompatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status error: {status} for {url} - {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Anonymous registry authentication failed at {realm}: {details}")]
    Authentication { realm: String, details: String },

    #[error("Request timeout: {url} after {timeout_seconds} seconds")]
    Timeout { url: String, timeout_seconds: u64 },

    #[error("Invalid image reference: {reference} - {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Compatibility artifact not found for {reference}: {details}")]
    ArtifactNotFound { reference: String, details: String },

    #[error("Manifest decode error: {url} - {details}")]
    ManifestDecode { url: String, details: String },

    #[error("Compatibility specification decode error: {details}")]
    SpecDecode { details: String },

    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Feature discovery failed for source {source_name}: {details}")]
    Discovery {
        source_name: String,
        details: String,
    },

    #[error("Feature source registered twice: {name}")]
    DuplicateSource { name: String },

    #[error("Rule evaluation failed for {rule}: {details}")]
    Evaluation { rule: String, details: String },

    #[error("Deadline exceeded during {stage}")]
    DeadlineExceeded { stage: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CompatError {
    /// Whether the error stems from user input rather than from the run itself
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            CompatError::InvalidReference { .. } | CompatError::Config(_)
        )
    }
}

/// Image reference parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("empty reference")]
    Empty,

    #[error("missing repository in {reference}")]
    MissingRepository { reference: String },

    #[error("invalid repository name {repository:?}")]
    InvalidRepository { repository: String },

    #[error("invalid tag {tag:?}")]
    InvalidTag { tag: String },

    #[error("invalid digest {digest:?}")]
    InvalidDigest { digest: String },
}

/// Errors raised while evaluating a single match expression or term
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("operator {op} expects {expected} value(s), got {actual}")]
    InvalidArity {
        op: String,
        expected: String,
        actual: usize,
    },

    #[error("invalid number {value:?} for operator {op}")]
    NotANumber { op: String, value: String },

    #[error("invalid range for GtLt: {lower} must be lower than {upper}")]
    InvalidRange { lower: i64, upper: i64 },

    #[error("invalid regular expression {pattern:?}: {details}")]
    InvalidRegex { pattern: String, details: String },

    #[error("operator {op} is not valid for flag feature {feature}")]
    InvalidFlagOp { op: String, feature: String },

    #[error("matchName is not supported for instance feature {feature}")]
    MatchNameOnInstances { feature: String },

    #[error("feature {feature} not available")]
    FeatureNotFound { feature: String },
}

impl From<ReferenceError> for CompatError {
    fn from(err: ReferenceError) -> Self {
        let reference = match &err {
            ReferenceError::Empty => String::new(),
            ReferenceError::MissingRepository { reference } => reference.clone(),
            ReferenceError::InvalidRepository { repository } => repository.clone(),
            ReferenceError::InvalidTag { tag } => tag.clone(),
            ReferenceError::InvalidDigest { digest } => digest.clone(),
        };
        CompatError::InvalidReference {
            reference,
            reason: err.to_string(),
        }
    }
}

impl From<crate::config::ConfigError> for CompatError {
    fn from(err: crate::config::ConfigError) -> Self {
        CompatError::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, CompatError>;

/// Expression evaluation result type alias
pub type ExpressionResult<T> = std::result::Result<T, ExpressionError>;
