use std::path::PathBuf;

use anyhow::{anyhow, Result};
use easydict_config::Config;

pub fn preferences_path(config: &dyn Config) -> Result<PathBuf> {
    config.get(easydict_config::PREFERENCES_PATH)
        .map(PathBuf::from)
        .map_err(|_| anyhow!("no preferences file configured, set EASYDICT_PREFERENCES_PATH"))
}
