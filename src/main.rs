use std::path::PathBuf;

use anyhow::{Context, Result};
use tryon_universe::{Catalog, Config, pipeline};

fn main() -> Result<()> {
    env_logger::init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    let catalog = match &config.catalog.path {
        Some(path) => Catalog::from_file(path)
            .with_context(|| format!("failed to load catalog {}", path.display()))?,
        None => Catalog::builtin(),
    };
    log::info!("{} accessories in catalog", catalog.len());

    let summary = pipeline::run(&config, &catalog)?;
    log::info!("session ended after {} frames ({:?})", summary.frames, summary.mode);
    Ok(())
}
