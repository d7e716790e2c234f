use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use log::{LevelFilter, error};
use shadow_compositor::{
    CompositePipeline, PipelineConfig, error::Result, load_mask, output::OutputWriter, shadow::light::LightSource,
};

/// Composite a subject onto a new background with a synthetic cast shadow
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Foreground image containing the subject
    #[arg(long, value_name = "PATH")]
    fg: PathBuf,

    /// Background image
    #[arg(long, value_name = "PATH")]
    bg: PathBuf,

    /// Light azimuth in degrees (screen plane, y pointing down)
    #[arg(long, default_value_t = 135.0, allow_hyphen_values = true)]
    angle: f64,

    /// Light elevation in degrees
    #[arg(long, default_value_t = 35.0, allow_hyphen_values = true)]
    elevation: f64,

    /// Directory receiving composite.png, shadow_only.png and mask_debug.png
    #[arg(short, long, value_name = "DIR", default_value = "output")]
    output: PathBuf,

    /// Grayscale mask to use instead of automatic segmentation
    #[arg(long, value_name = "PATH")]
    mask: Option<PathBuf>,

    /// JSON file overriding segmentation and shadow constants
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Also write report.json describing the run
    #[arg(long)]
    report: bool,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };

    let writer = OutputWriter::new(&cli.output)?;

    let mut pipeline = CompositePipeline::from_paths(&cli.fg, &cli.bg)?
        .with_config(config)
        .with_light(LightSource::new(cli.angle, cli.elevation));
    if let Some(path) = &cli.mask {
        pipeline = pipeline.with_mask(load_mask(path)?);
    }

    println!("Extracting foreground mask and casting shadow...");
    let result = pipeline.run()?;
    let report = cli.report.then(|| pipeline.report(&result));
    let paths = writer.write(&result, report.as_ref())?;

    for path in &paths {
        println!("  {}", path.display());
    }
    println!("Done. Check {}", writer.dir().display());

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
