// src/io/params.rs

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::Result;
use crate::model::store::StoreParams;
use crate::simulation::config::RunConfig;

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Loads a complete run description and validates its optimiser settings.
pub fn load_run_config(path: impl AsRef<Path>) -> Result<RunConfig> {
    let path = path.as_ref();
    let config: RunConfig = read_json(path)?;
    config.surface.validate()?;
    if let Some(stability) = &config.stability {
        stability.validate()?;
    }
    info!(path = %path.display(), "run configuration loaded");
    Ok(config)
}

/// Loads bare store parameters, e.g. to swap them into a running model.
pub fn load_store_params(path: impl AsRef<Path>) -> Result<StoreParams> {
    read_json(path.as_ref())
}
