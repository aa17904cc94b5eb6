//! Result rendering
//!
//! Human output prints one line per evaluated rule followed by a summary;
//! JSON output wraps the same results in a timestamped report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cli::{OutputFormat, VerbosityLevel};
use crate::reference::ImageReference;
use crate::tag_filter::TagFilter;
use crate::validator::{ValidationResult, ValidationSummary};

/// Machine-readable report of one validation run
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport<'a> {
    pub image: String,
    pub tags: Vec<&'a str>,
    pub generated_at: DateTime<Utc>,
    pub results: &'a [ValidationResult],
    pub summary: ValidationSummary,
}

impl<'a> ValidationReport<'a> {
    pub fn new(
        reference: &ImageReference,
        filter: &'a TagFilter,
        results: &'a [ValidationResult],
    ) -> Self {
        Self {
            image: reference.to_string(),
            tags: filter.tags().collect(),
            generated_at: Utc::now(),
            results,
            summary: ValidationSummary::from_results(results),
        }
    }
}

/// Output formatter for validation results
pub struct Output {
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self::with_colors(verbosity, atty::is(atty::Stream::Stdout))
    }

    pub fn with_colors(verbosity: VerbosityLevel, show_colors: bool) -> Self {
        Self {
            verbosity,
            show_colors,
        }
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn render(
        &self,
        format: OutputFormat,
        reference: &ImageReference,
        filter: &TagFilter,
        results: &[ValidationResult],
    ) -> serde_json::Result<String> {
        match format {
            OutputFormat::Human => Ok(self.format_results(reference, filter, results)),
            OutputFormat::Json => format_json(&ValidationReport::new(reference, filter, results)),
        }
    }

    pub fn format_results(
        &self,
        reference: &ImageReference,
        filter: &TagFilter,
        results: &[ValidationResult],
    ) -> String {
        let mut output = String::new();

        if self.verbosity >= VerbosityLevel::Verbose {
            output.push_str(&format!("Image: {}\n", reference));
            let tags: Vec<&str> = filter.tags().collect();
            if tags.is_empty() {
                output.push_str("Tag filter: none (all groups)\n");
            } else {
                output.push_str(&format!("Tag filter: {:?}\n", tags));
            }
            output.push('\n');
        }

        for result in results {
            output.push_str(&self.format_result(result));
            output.push('\n');
        }

        if self.verbosity >= VerbosityLevel::Normal {
            output.push_str(&self.format_summary(&ValidationSummary::from_results(results)));
        }

        output
    }

    pub fn format_result(&self, result: &ValidationResult) -> String {
        let verdict = if result.is_valid {
            self.colorize("SUCCEEDS", "32")
        } else {
            self.colorize("FAILS", "31")
        };
        format!(
            "Rule: {:?} with tags: {:?} {}",
            result.rule_name, result.group_tags, verdict
        )
    }

    fn format_summary(&self, summary: &ValidationSummary) -> String {
        let mut output = String::new();
        output.push_str("\nValidation Summary:\n");
        output.push_str(&format!("  Total rules: {}\n", summary.total));
        output.push_str(&format!(
            "  {} {}\n",
            self.colorize("Passed:", "32"),
            summary.passed
        ));
        if summary.failed > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Failed:", "31"),
                summary.failed
            ));
        }
        if summary.total == 0 {
            output.push_str("  No compatibility group matched the tag filter\n");
        }
        output
    }
}

pub fn format_json(report: &ValidationReport<'_>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> Vec<ValidationResult> {
        vec![
            ValidationResult {
                rule_name: "has-gpu".to_string(),
                group_tags: vec!["gpu".to_string()],
                is_valid: true,
            },
            ValidationResult {
                rule_name: "min-memory".to_string(),
                group_tags: vec![],
                is_valid: false,
            },
        ]
    }

    fn reference() -> ImageReference {
        ImageReference::parse("quay.io/acme/app:v1").unwrap()
    }

    #[test]
    fn test_result_line_format() {
        let output = Output::with_colors(VerbosityLevel::Normal, false);
        let results = results();
        assert_eq!(
            output.format_result(&results[0]),
            r#"Rule: "has-gpu" with tags: ["gpu"] SUCCEEDS"#
        );
        assert_eq!(
            output.format_result(&results[1]),
            r#"Rule: "min-memory" with tags: [] FAILS"#
        );
    }

    #[test]
    fn test_colors() {
        let output = Output::with_colors(VerbosityLevel::Normal, true);
        let line = output.format_result(&results()[0]);
        assert!(line.ends_with("\x1b[32mSUCCEEDS\x1b[0m"));
    }

    #[test]
    fn test_summary_by_verbosity() {
        let filter = TagFilter::new(["gpu"]);

        let quiet = Output::with_colors(VerbosityLevel::Quiet, false).format_results(
            &reference(),
            &filter,
            &results(),
        );
        assert_eq!(quiet.lines().count(), 2);
        assert!(!quiet.contains("Validation Summary:"));

        let normal = Output::with_colors(VerbosityLevel::Normal, false).format_results(
            &reference(),
            &filter,
            &results(),
        );
        assert!(normal.contains("Total rules: 2"));
        assert!(normal.contains("Passed: 1"));
        assert!(normal.contains("Failed: 1"));
        assert!(!normal.contains("Image:"));

        let verbose = Output::with_colors(VerbosityLevel::Verbose, false).format_results(
            &reference(),
            &filter,
            &results(),
        );
        assert!(verbose.starts_with("Image: quay.io/acme/app:v1\n"));
        assert!(verbose.contains(r#"Tag filter: ["gpu"]"#));
    }

    #[test]
    fn test_empty_results_summary() {
        let text = Output::with_colors(VerbosityLevel::Normal, false).format_results(
            &reference(),
            &TagFilter::new(["arm"]),
            &[],
        );
        assert!(text.contains("Total rules: 0"));
        assert!(text.contains("No compatibility group matched"));
    }

    #[test]
    fn test_json_report() {
        let results = results();
        let filter = TagFilter::new(["gpu"]);
        let json = Output::with_colors(VerbosityLevel::Normal, false)
            .render(OutputFormat::Json, &reference(), &filter, &results)
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["image"], "quay.io/acme/app:v1");
        assert_eq!(value["tags"], serde_json::json!(["gpu"]));
        assert_eq!(value["results"][0]["rule_name"], "has-gpu");
        assert_eq!(value["results"][1]["is_valid"], false);
        assert_eq!(value["summary"]["failed"], 1);
        assert!(
            value["generated_at"]
                .as_str()
                .unwrap()
                .parse::<DateTime<Utc>>()
                .is_ok()
        );
    }
}
