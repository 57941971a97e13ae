pub mod disk;
pub mod memory;

use crate::core::config::AppConfig;
use anyhow::Result;
use disk::DiskAlertStore;

/// Opens the persistent alert store under the configured data path.
pub fn open(config: &AppConfig) -> Result<DiskAlertStore> {
    let path = config.data_path()?;
    DiskAlertStore::open(&path, &config.alerts)
}
