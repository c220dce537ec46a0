//! Configuration types for FerroDB

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory
    pub data_dir: PathBuf,

    /// Number of frames in the buffer pool
    #[serde(default = "default_buffer_pool_frames")]
    pub buffer_pool_frames: usize,

    /// Page size in bytes
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_buffer_pool_frames() -> usize {
    1024
}

fn default_page_size() -> usize {
    16 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            buffer_pool_frames: default_buffer_pool_frames(),
            page_size: default_page_size(),
        }
    }
}

impl StorageConfig {
    /// Validate the configuration.
    /// Fatal errors are returned as `Err(Vec<String>)`; warnings are logged
    /// but do not cause failure.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.buffer_pool_frames == 0 {
            errors.push("buffer_pool_frames must be > 0".to_string());
        }

        // Page size must be power of 2 and >= 4096
        let ps = self.page_size;
        if ps < 4096 || !ps.is_power_of_two() {
            errors.push(format!(
                "page_size must be a power of 2 and >= 4096, got {}",
                ps
            ));
        }

        if !self.data_dir.exists() {
            tracing::warn!(
                "data_dir {:?} does not exist yet (will be created)",
                self.data_dir
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
