use crate::cli::VerbosityLevel;
use crate::config::ConfigError;
use crate::error::CompatError;

/// Process exit codes
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Error reporter with configurable verbosity
pub struct ErrorReporter {
    verbosity: VerbosityLevel,
    show_timestamps: bool,
}

impl ErrorReporter {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            show_timestamps: false,
        }
    }

    pub fn with_timestamps(verbosity: VerbosityLevel, show_timestamps: bool) -> Self {
        Self {
            verbosity,
            show_timestamps,
        }
    }

    /// Report a run error on stderr
    pub fn report_error(&self, error: &CompatError) {
        eprintln!("{}", self.format_error(error));
    }

    /// Report a configuration error on stderr
    pub fn report_config_error(&self, error: &ConfigError) {
        eprintln!("{}", self.format_config_error(error));
    }

    pub fn format_error(&self, error: &CompatError) -> String {
        let mut output = format!("{}Error: {}", self.timestamp(), error);

        if self.verbosity >= VerbosityLevel::Verbose {
            if let Some(hint) = hint(error) {
                output.push_str(&format!("\nSuggestion: {}", hint));
            }
            let mut current: &dyn std::error::Error = error;
            let mut level = 0;
            while let Some(source) = current.source() {
                level += 1;
                output.push_str(&format!("\n  {}: {}", level, source));
                current = source;
            }
        }

        output
    }

    pub fn format_config_error(&self, error: &ConfigError) -> String {
        match self.verbosity {
            VerbosityLevel::Quiet => format!("Config error: {}", error),
            VerbosityLevel::Normal | VerbosityLevel::Verbose => {
                format!("Configuration Error: {}\n{}", error, config_help(error))
            }
        }
    }

    fn timestamp(&self) -> String {
        if self.show_timestamps {
            format!("[{}] ", chrono::Utc::now().format("%H:%M:%S"))
        } else {
            String::new()
        }
    }
}

/// Exit code for a failed run
pub fn exit_code(error: &CompatError) -> i32 {
    if error.is_usage_error() {
        EXIT_USAGE
    } else {
        EXIT_FAILURE
    }
}

fn hint(error: &CompatError) -> Option<&'static str> {
    match error {
        CompatError::Http(_) | CompatError::Timeout { .. } => {
            Some("Check network connectivity to the registry, or use --plain-http for local registries")
        }
        CompatError::HttpStatus { status: 401 | 403, .. } => {
            Some("The registry refused anonymous pull access; credentials are not supported")
        }
        CompatError::Authentication { .. } => {
            Some("The registry token service refused an anonymous pull token for this repository")
        }
        CompatError::HttpStatus { status: 404, .. } => {
            Some("Verify the image reference exists in the registry")
        }
        CompatError::ArtifactNotFound { .. } => {
            Some("Attach a compatibility artifact to the image before validating nodes against it")
        }
        CompatError::SpecDecode { .. } | CompatError::ManifestDecode { .. } => {
            Some("The compatibility artifact is malformed; regenerate and push it again")
        }
        CompatError::DigestMismatch { .. } => {
            Some("The registry returned corrupted content; retry or check a caching proxy")
        }
        CompatError::Discovery { .. } => {
            Some("Check that host feature files are readable, or set --host-root when running in a container")
        }
        CompatError::Evaluation { .. } => {
            Some("Fix the rule in the compatibility specification")
        }
        CompatError::DeadlineExceeded { .. } => Some("Increase the run deadline with --deadline"),
        CompatError::InvalidReference { .. } => {
            Some("Use the form [registry/]repository[:tag][@sha256:<digest>]")
        }
        _ => None,
    }
}

fn config_help(error: &ConfigError) -> String {
    match error {
        ConfigError::Io(_) => {
            "Check that the configuration file exists and is readable".to_string()
        }
        ConfigError::TomlParsing(_) | ConfigError::JsonParsing(_) => {
            "Check the configuration file syntax (TOML/JSON format expected)".to_string()
        }
        ConfigError::UnsupportedFormat(ext) => {
            format!("Rename the configuration file from .{} to .toml or .json", ext)
        }
        ConfigError::Environment(_) => {
            "Fix or unset the offending NODE_COMPAT_* environment variable".to_string()
        }
        ConfigError::Validation(_) => {
            "Resolve the conflicting value in the file, environment, or command line".to_string()
        }
    }
}
