use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use nerbatch::cli::Cli;
use nerbatch::logging;
use nerbatch_core::{
    select_device, BatchOrchestrator, ExternalFormatConverter, FileSink, FormatConverter,
    FormatRequest, MemorySink, OutputSink, PredictionConfig, RunContext,
};
use tracing::{error, info};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match logging::init(cli.log_lvl.to_filter(), cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(&cli.to_config()) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &PredictionConfig) -> Result<u8> {
    config.validate().context("invalid configuration")?;

    let device = select_device(&config.gpu_nodes).context("failed to select inference device")?;
    let context = RunContext::load(config, device).with_context(|| {
        format!("failed to load model from {}", config.pretrained_model.display())
    })?;

    let mut sink: Box<dyn OutputSink> = if config.use_bio {
        Box::new(FileSink::new(&config.output_dir).context("failed to prepare output directory")?)
    } else {
        Box::new(MemorySink::new())
    };

    let summary = BatchOrchestrator::new(config, &context)?
        .run(sink.as_mut())
        .context("failed to list input files")?;

    if config.output_format.requires_conversion() {
        let program = config
            .format_converter
            .clone()
            .context("no format converter program configured")?;
        let request = FormatRequest::new(config, sink.take_documents());
        ExternalFormatConverter::new(program)
            .convert(&request)
            .context("format conversion failed")?;
        info!(
            format = %request.format,
            output_dir = %request.output_dir.display(),
            "formatted output written"
        );
    }

    if summary.is_total_failure() {
        error!(failed = summary.failed(), "every input file failed");
    }
    Ok(summary.exit_code())
}
