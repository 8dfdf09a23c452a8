//! wk-export-tiff - export a dataset layer as a stack of tiff images

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wkdataset::{config::ExportArgs, export_tiff_stack, FileSystemEngine, TiffEncoder};

#[tokio::main]
async fn main() -> ExitCode {
    let args = ExportArgs::parse();
    init_logging(args.verbose);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: ExportArgs) -> anyhow::Result<()> {
    let executor = args.executor();
    let source = args.source_path.clone();
    let request = args
        .into_request()
        .await
        .with_context(|| format!("Reading dataset {}", source.display()))?;

    let summary = export_tiff_stack(
        &request,
        Arc::new(FileSystemEngine),
        Arc::new(TiffEncoder),
        &executor,
    )
    .await
    .with_context(|| format!("Exporting layer '{}'", request.layer_name))?;

    info!(
        "Done: {} tiff file(s) in {}",
        summary.files,
        request.destination.display()
    );
    Ok(())
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wkdataset=debug,wk_export_tiff=debug"
    } else {
        "wkdataset=info,wk_export_tiff=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
