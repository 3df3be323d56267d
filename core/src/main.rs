use clap::Parser;
use log::{error, info};
use mirai_core::cli::report::{SelectionReport, TextReport};
use mirai_core::cli::{Cli, OutputFormat};
use mirai_core::{
    logging, ExamNormalizer, ImageSource, LogContext, MiraiConfig, MiraiError, ModelRuntime,
    PredictionReport, Result,
};
use std::process;

fn main() {
    let cli = Cli::parse();

    let log = match cli.logging_config().and_then(|config| logging::init(&config)) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(&cli, &log) {
        error!(target: log.target(), "{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli, log: &LogContext) -> Result<()> {
    let config = cli.apply_overrides(MiraiConfig::from_file(&cli.config)?);
    let sources = cli
        .files
        .iter()
        .map(ImageSource::from_path)
        .collect::<Result<Vec<_>>>()?;
    info!(target: log.target(), "Read {} image files", sources.len());

    if cli.dry_run {
        let normalizer = ExamNormalizer::new(cli.payload(), log.clone());
        let images = normalizer.normalize(&sources, cli.is_dicom());
        return write_output(cli, &SelectionReport::new(&images).to_string());
    }

    let mut runtime = ModelRuntime::new(config, log.clone());
    info!(target: log.target(), "Mirai version {}", runtime.version());
    let report = runtime.run_model(&sources, Some(cli.payload()), cli.is_dicom())?;

    let output = match cli.format {
        OutputFormat::Text => TextReport::new(&report).to_string(),
        OutputFormat::Json => to_json(&report)?,
    };
    write_output(cli, &output)
}

fn to_json(report: &PredictionReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)? + "\n")
}

fn write_output(cli: &Cli, output: &str) -> Result<()> {
    match &cli.output_path {
        Some(path) => std::fs::write(path, output).map_err(MiraiError::from),
        None => {
            print!("{}", output);
            Ok(())
        }
    }
}
