pub mod cli;
pub mod config;
pub mod convert;
pub mod generate;
pub mod mask;
pub mod pipeline;
pub mod raster;
pub mod render;
pub mod summary;
