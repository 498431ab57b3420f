use std::path::Path;

use anyhow::{anyhow, Result};

use crate::config::proc_loader::{env_to_config, file_to_config};
use crate::config::SdkConfig;

/// Config from the YAML file when a path is given, from `MPESA_*` otherwise.
pub fn run(config_path: Option<&str>) -> Result<SdkConfig> {
    match config_path {
        Some(path) => file_to_config(Path::new(path)).map_err(|e| anyhow!("Invalid config format: {}", e)),
        None => env_to_config(),
    }
}
