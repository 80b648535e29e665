//! Raster Configuration

use serde::{Deserialize, Serialize};

use crate::RasterError;

/// Raster configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// Slack added on every side a buffer has to grow (pixels)
    pub chunk_size: u32,

    /// Memory budget of a diff history (bytes)
    pub history_limit_bytes: usize,

    /// Compress diffs when they enter a history
    pub compress_history: bool,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64,
            history_limit_bytes: 64 * 1024 * 1024, // 64MB
            compress_history: true,
        }
    }
}

impl RasterConfig {
    /// Load from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, RasterError> {
        serde_json::from_str(json).map_err(|e| RasterError::InvalidConfig(e.to_string()))
    }
}
