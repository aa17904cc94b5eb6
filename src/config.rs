use crate::cli::{Cli, OutputFormat, VerbosityLevel};
use crate::registry::RegistryClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

const ENV_PREFIX: &str = "NODE_COMPAT_";

const CONFIG_NAMES: &[&str] = &[
    "node-compat.toml",
    "node-compat.json",
    ".node-compat.toml",
    ".node-compat.json",
];

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub discovery: DiscoveryConfig,
    pub validation: ValidationConfig,
    pub output: OutputConfig,
}

/// Registry access configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts for failed requests
    pub retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Upper bound for the backoff delay in milliseconds
    pub max_retry_delay_ms: u64,
    /// Use http instead of https
    pub plain_http: bool,
    pub user_agent: String,
}

/// Host feature discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Directory the host's /proc, /sys and /etc are read from
    pub host_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Upper bound for a whole validation run
    pub deadline_seconds: u64,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode (results only)
    pub quiet: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let client = RegistryClientConfig::default();
        Self {
            timeout_seconds: client.timeout_seconds,
            retry_attempts: client.retry_attempts,
            retry_delay_ms: client.retry_delay_ms,
            max_retry_delay_ms: client.max_retry_delay_ms,
            plain_http: client.plain_http,
            user_agent: client.user_agent,
        }
    }
}

impl RegistryConfig {
    pub fn client_config(&self) -> RegistryClientConfig {
        RegistryClientConfig {
            timeout_seconds: self.timeout_seconds,
            retry_attempts: self.retry_attempts,
            retry_delay_ms: self.retry_delay_ms,
            max_retry_delay_ms: self.max_retry_delay_ms,
            plain_http: self.plain_http,
            user_agent: self.user_agent.clone(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            host_root: PathBuf::from("/"),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            deadline_seconds: 60,
        }
    }
}

impl OutputConfig {
    pub fn verbosity(&self) -> VerbosityLevel {
        VerbosityLevel::from_flags(self.verbose, self.quiet)
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(cli, &SystemEnvProvider).await
    }

    pub async fn load_config_with(cli: &Cli, env: &impl EnvProvider) -> Result<Config> {
        let mut config = match &cli.config {
            Some(config_path) => Self::load_from_file(config_path).await?,
            None => Self::find_config_file().await?.unwrap_or_default(),
        };

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    ///
    /// Sections and keys missing from the file keep their defaults.
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => match toml::from_str::<Config>(&content) {
                Ok(config) => Ok(config),
                Err(_) => Ok(serde_json::from_str(&content)?),
            },
        }
    }

    /// Find a configuration file in the current directory, then the user config directory
    pub async fn find_config_file() -> Result<Option<Config>> {
        let mut search_dirs = vec![PathBuf::from(".")];
        if let Some(config_dir) = dirs::config_dir() {
            search_dirs.push(config_dir.join("node-compat"));
        }
        Self::find_config_file_in(&search_dirs).await
    }

    pub async fn find_config_file_in(search_dirs: &[PathBuf]) -> Result<Option<Config>> {
        for dir in search_dirs {
            for name in CONFIG_NAMES {
                let path = dir.join(name);
                if tokio::fs::try_exists(&path).await? {
                    tracing::debug!(path = %path.display(), "loading configuration file");
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }
        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(timeout) = parse_env(env, "TIMEOUT")? {
            config.registry.timeout_seconds = timeout;
        }
        if let Some(retry_attempts) = parse_env(env, "RETRY_ATTEMPTS")? {
            config.registry.retry_attempts = retry_attempts;
        }
        if let Some(plain_http) = parse_env(env, "PLAIN_HTTP")? {
            config.registry.plain_http = plain_http;
        }

        if let Some(host_root) = env.get(&format!("{ENV_PREFIX}HOST_ROOT")) {
            config.discovery.host_root = PathBuf::from(host_root);
        }

        if let Some(deadline) = parse_env(env, "DEADLINE")? {
            config.validation.deadline_seconds = deadline;
        }

        if let Some(verbose) = parse_env(env, "VERBOSE")? {
            config.output.verbose = verbose;
        }
        if let Some(quiet) = parse_env(env, "QUIET")? {
            config.output.quiet = quiet;
        }
        if let Some(format) = env.get(&format!("{ENV_PREFIX}FORMAT")) {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormat::Human,
                "json" => OutputFormat::Json,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid {ENV_PREFIX}FORMAT value: {}",
                        format
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    ///
    /// Only flags given on the command line override.
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(timeout) = cli.timeout {
            config.registry.timeout_seconds = timeout;
        }
        if let Some(retry_attempts) = cli.retry_attempts {
            config.registry.retry_attempts = retry_attempts;
        }
        if cli.plain_http {
            config.registry.plain_http = true;
        }

        if let Some(host_root) = &cli.host_root {
            config.discovery.host_root = host_root.clone();
        }

        if let Some(deadline) = cli.deadline {
            config.validation.deadline_seconds = deadline;
        }

        if let Some(format) = cli.output_format {
            config.output.format = format;
        }
        if cli.verbose {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        config
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.registry.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if config.registry.retry_attempts > 10 {
            return Err(ConfigError::Validation(
                "Retry attempts cannot exceed 10".to_string(),
            ));
        }

        if config.validation.deadline_seconds == 0 {
            return Err(ConfigError::Validation(
                "Deadline must be greater than 0".to_string(),
            ));
        }

        if !config.discovery.host_root.is_absolute() {
            return Err(ConfigError::Validation(format!(
                "Host root must be an absolute path: {}",
                config.discovery.host_root.display()
            )));
        }

        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        Ok(())
    }

    /// Convert configuration to Duration for the run deadline
    pub fn get_deadline_duration(config: &Config) -> Duration {
        Duration::from_secs(config.validation.deadline_seconds)
    }
}

fn parse_env<T: FromStr>(env: &impl EnvProvider, key: &str) -> Result<Option<T>> {
    let name = format!("{ENV_PREFIX}{key}");
    env.get(&name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::Environment(format!("Invalid {} value: {}", name, raw)))
        })
        .transpose()
}
