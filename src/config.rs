//! Repository configuration.
//!
//! Loaded from a JSON file; every key is optional.
//!
//! ```json
//! {
//!   "dictionaries": {
//!     "string_columns": { "min_row_count": 10, "max_card": 255, "max_card_ratio": 0.5 },
//!     "overrides": { "resource.service_name": { "min_row_count": 1, "max_card": 10000, "max_card_ratio": 1.0 } }
//!   },
//!   "sort_by": ["resource.service_name", "start_time"],
//!   "memory_limit": 268435456
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::column::DictionaryStats;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dictionaries: DictionaryConfig,
    /// Dotted field paths used by `optimize`. Empty means every top-level
    /// scalar column in name order.
    pub sort_by: Vec<String>,
    /// Upper bound on the bytes of arrays finalized in one build pass.
    pub memory_limit: Option<usize>,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Dictionary encoding policy for string columns.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    pub string_columns: DictionaryThresholds,
    /// Thresholds for specific dotted field paths.
    pub overrides: HashMap<String, DictionaryThresholds>,
}

impl DictionaryConfig {
    pub fn thresholds_for(&self, path: &str) -> &DictionaryThresholds {
        self.overrides.get(path).unwrap_or(&self.string_columns)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryThresholds {
    pub min_row_count: usize,
    pub max_card: usize,
    pub max_card_ratio: f64,
}

impl Default for DictionaryThresholds {
    fn default() -> Self {
        Self {
            min_row_count: 10,
            max_card: 255,
            max_card_ratio: 0.5,
        }
    }
}

impl DictionaryThresholds {
    pub fn should_encode(&self, stats: &DictionaryStats) -> bool {
        if stats.total_row_count == 0 || stats.total_row_count < self.min_row_count {
            return false;
        }
        let ratio = stats.cardinality as f64 / stats.total_row_count as f64;
        stats.cardinality <= self.max_card && ratio <= self.max_card_ratio
    }
}
