use clap::Parser;
use clap::Subcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Optional path to TOML formatted Params.
    ///
    /// If not provided, the default Params are used.
    #[arg(short, long, global = true)]
    params: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Commands {
    /// Convert a photo to a three-band raster, then flag clouds and shadows.
    ///
    /// The blue channel of the photo stands in for near-infrared.
    Photo {
        /// Path to a JPEG or PNG image.
        input: PathBuf,

        /// Directory for the outputs.
        ///
        /// If not provided, a directory named after the input is created
        /// under the configured output root.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Flag clouds and shadows in an existing three-band raster.
    Raster {
        /// Path to the raster. Defaults to the configured input.
        input: Option<PathBuf>,

        /// File path for the composite figure.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a synthetic three-band raster of uniform noise.
    Generate {
        /// File path for the raster.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed for a reproducible raster.
        #[arg(short, long)]
        seed: Option<u64>,
    },
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone()
    }

    pub fn params(&self) -> Option<&PathBuf> {
        self.params.as_ref()
    }
}
