use anyhow::Context;
use std::process::ExitCode;

use node_compat::error_reporter::{EXIT_USAGE, ErrorReporter, exit_code};
use node_compat::{
    Cli, CompatError, Config, ConfigManager, ImageReference, NodeValidator, Output, RunContext,
    telemetry,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let config = match ConfigManager::load_config(&cli).await {
        Ok(config) => config,
        Err(error) => {
            ErrorReporter::new(cli.verbosity()).report_config_error(&error);
            return ExitCode::from(EXIT_USAGE as u8);
        }
    };

    let verbosity = config.output.verbosity();
    telemetry::init_tracing(verbosity.log_level());
    let reporter = ErrorReporter::new(verbosity);

    match run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => match error.downcast_ref::<CompatError>() {
            Some(compat_error) => {
                reporter.report_error(compat_error);
                ExitCode::from(exit_code(compat_error) as u8)
            }
            None => {
                eprintln!("Error: {:#}", error);
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let reference = ImageReference::parse(&cli.image).map_err(CompatError::from)?;
    let filter = cli.tag_filter();
    let validator = NodeValidator::from_config(config)?;

    tracing::info!(
        image = %reference,
        tags = ?filter.tags().collect::<Vec<_>>(),
        sources = validator.sources().len(),
        deadline_seconds = config.validation.deadline_seconds,
        "validating node"
    );

    let ctx = RunContext::with_timeout(ConfigManager::get_deadline_duration(config));
    let results = validator.validate(&ctx, &reference, &filter).await?;

    let rendered = Output::new(config.output.verbosity())
        .render(config.output.format, &reference, &filter, &results)
        .context("failed to render validation results")?;
    println!("{}", rendered.trim_end());

    Ok(())
}
