//! `pan config` – print the config location and effective values.

use anyhow::Result;
use pan_core::config::{self, PanConfig};

pub fn run_config(cfg: &PanConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", cfg.to_toml()?);
    println!("# recovery root: {}", cfg.server.temp_root().display());
    Ok(())
}
