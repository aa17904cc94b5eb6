use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::tag_filter::TagFilter;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show the results and critical errors
    Quiet,
    /// Show results with a summary
    #[default]
    Normal,
    /// Show run details and error hints
    Verbose,
}

impl VerbosityLevel {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            VerbosityLevel::Quiet
        } else if verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Default log filter directive for this verbosity
    pub fn log_level(&self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "warn",
            VerbosityLevel::Verbose => "debug",
        }
    }
}

/// Result rendering format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One line per rule plus a summary
    #[default]
    Human,
    /// A single JSON report
    Json,
}

/// Validate node compatibility against an image's compatibility artifact
#[derive(Parser, Debug, Clone)]
#[command(name = "validate-node")]
#[command(
    about = "Check whether this node satisfies the compatibility rules published for a container image"
)]
#[command(version)]
pub struct Cli {
    /// Image reference whose compatibility artifact is evaluated
    #[arg(long = "image", help = "Image reference, e.g. registry.example.com/app:v1")]
    pub image: String,

    /// Only evaluate groups carrying one of these tags
    #[arg(
        long = "tags",
        value_delimiter = ',',
        action = clap::ArgAction::Append,
        help = "Tags selecting compatibility groups (comma-separated, repeatable)"
    )]
    pub tags: Vec<String>,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Only print results
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// Registry request timeout in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Retry attempts for failed registry requests
    #[arg(long = "retry-attempts")]
    pub retry_attempts: Option<u32>,

    /// Upper bound for the whole run in seconds
    #[arg(long = "deadline")]
    pub deadline: Option<u64>,

    /// Talk to the registry over plain HTTP
    #[arg(long = "plain-http")]
    pub plain_http: bool,

    /// Root under which host feature files are read
    #[arg(long = "host-root")]
    pub host_root: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn tag_filter(&self) -> TagFilter {
        TagFilter::new(&self.tags)
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        VerbosityLevel::from_flags(self.verbose, self.quiet)
    }
}
