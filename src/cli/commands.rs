//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{ConfigOverrides, HarnessConfig};
use crate::error::HarnessError;
use crate::generator::CommandGenerator;
use crate::harness::{FailureClass, Harness, RunResult};
use crate::report::{ConsoleReporter, JsonReporter, Reporter};

use super::{CliError, CliResult, ExitCode, OutputFormat, RunArgs};

/// Render a run-level error with its diagnostic code and help text.
fn run_level(err: impl Into<HarnessError>) -> CliError {
    CliError::config(format!("{:?}", miette::Report::new(err.into())))
}

/// Map the most severe failure in a run to the process exit status.
pub fn exit_code_for(result: &RunResult) -> ExitCode {
    match result.failure_class() {
        None => ExitCode::SUCCESS,
        Some(FailureClass::Mismatch) => ExitCode::MISMATCH,
        Some(FailureClass::Generator) => ExitCode::GENERATOR_FAILURE,
        Some(FailureClass::Cancelled) => ExitCode::CANCELLED,
    }
}

/// Regenerate and compare the selected bundles.
pub fn run_bundles(manifest: &Path, args: &RunArgs) -> CliResult<ExitCode> {
    let config = HarnessConfig::load(manifest, &args.overrides()).map_err(run_level)?;
    let bundles = config.registry.select(args.bundles.as_slice()).map_err(run_level)?;

    let generator = CommandGenerator::new(config.generator).with_timeout(config.timeout);
    let harness = Harness::new(generator, config.layout)
        .with_clean(config.clean)
        .with_jobs(config.jobs);

    let mut reporter: Box<dyn Reporter> = match args.format {
        OutputFormat::Text => Box::new(ConsoleReporter::stderr(args.verbose)),
        OutputFormat::Json => Box::new(JsonReporter::new(std::io::stdout())),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::config(format!("Error: failed to start async runtime: {e}")))?;

    let result = runtime
        .block_on(async {
            let cancel = CancellationToken::new();
            let watcher = tokio::spawn(cancel_on_interrupt(cancel.clone()));
            let result = harness.run(&bundles, reporter.as_mut(), &cancel).await;
            watcher.abort();
            result
        })
        .map_err(run_level)?;

    Ok(exit_code_for(&result))
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received, cancelling remaining bundles");
        cancel.cancel();
    }
}

/// Print the bundle registry, one `name<TAB>root` line per bundle in run order.
pub fn list_bundles(manifest: &Path) -> CliResult<ExitCode> {
    let config = HarnessConfig::load(manifest, &ConfigOverrides::default()).map_err(run_level)?;
    for bundle in config.registry.bundles() {
        println!("{}\t{}", bundle.name, bundle.root.display());
    }
    Ok(ExitCode::SUCCESS)
}
