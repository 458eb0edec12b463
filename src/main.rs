use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use cloudmask_cli::cli::Cli;
use cloudmask_cli::cli::Commands;
use cloudmask_cli::config;
use cloudmask_cli::pipeline;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

fn main() -> Result<()> {
    // Logs go to stderr so the report on stdout stays clean.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let params = config::load(cli.params().map(|path| path.as_path()))?;

    match &cli.command() {
        Commands::Photo { input, output_dir } => {
            pipeline::run_photo(&params.photo, input, output_dir.as_deref()).map(|_| ())
        }
        Commands::Raster { input, output } => pipeline::run_raster(
            &params.raster,
            input.as_ref().unwrap_or(&params.raster.input),
            output.as_ref().unwrap_or(&params.raster.output),
        )
        .map(|_| ()),
        Commands::Generate { output, seed } => {
            let mut fixture = params.fixture.clone();
            if seed.is_some() {
                fixture.seed = *seed;
            }
            let output = output.clone().unwrap_or_else(|| fixture.output.clone());
            pipeline::run_generate(&fixture, &output)
        }
        _ => bail!("this command has not been implemented!"),
    }
}
