use std::sync::Arc;

use anyhow::{Context, Result};
use relnote_config::{ensure_workspace_config, validate_config};
use relnote_core::MonthWindow;
use relnote_infer::load_generator;
use relnote_source::GitHubSource;
use relnoted::cli::{Cli, LogFormat, parse_cli};
use relnoted::pipeline::{Pipeline, PipelineSettings};
use relnoted::sink::FileSink;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.log_format);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run(cli))
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Human => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let workspace = cli.workspace.canonicalize().with_context(|| {
        format!(
            "failed to resolve workspace path {}",
            cli.workspace.display()
        )
    })?;

    let config = ensure_workspace_config(&workspace).with_context(|| {
        format!(
            "failed to load workspace config for {}",
            workspace.display()
        )
    })?;
    for warning in validate_config(&config) {
        eprintln!(
            "relnote config warning [{}]: {}",
            warning.code, warning.message
        );
    }

    let request = cli.run_request(&config, MonthWindow::current())?;

    let loaded = load_generator(&config.inference, cli.provider_overrides())
        .context("failed to initialize text generator")?;
    tracing::info!(
        provider = %loaded.provider_name,
        model = %loaded.model_name,
        "text generator ready"
    );
    let source =
        GitHubSource::from_config(&config.source).context("failed to build GitHub client")?;
    let sink = FileSink::new(cli.output_dir(&workspace, &config));

    let pipeline = Pipeline::new(
        Arc::new(source),
        loaded.generator,
        Arc::new(sink),
        PipelineSettings::from_config(&config),
        tracing::info_span!("pipeline"),
    );
    let summary = pipeline
        .run(request)
        .await
        .context("invalid report request")?;

    println!(
        "{} report: {} change-sets, {} classified, {} degraded, {} already summarized, {} deep dives",
        summary.variant.as_str(),
        summary.retrieved,
        summary.classified,
        summary.degraded,
        summary.skipped,
        summary.deep_dived
    );
    if summary.truncated {
        println!("warning: page ceiling reached, older change-sets may be missing");
    }
    for path in &summary.written {
        println!("wrote {}", path.display());
    }
    Ok(())
}
