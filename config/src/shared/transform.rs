use serde::Deserialize;
use std::path::PathBuf;

const fn default_max_concurrent_files() -> usize {
    TransformConfig::DEFAULT_MAX_CONCURRENT_FILES
}

/// Settings for turning source files into staged CSV files.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformConfig {
    /// Number of source files transformed and staged at the same time.
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
    /// Parent directory for per-file scratch directories. Defaults to the system temp dir.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    /// Directory with `<record-type>.schema.json` descriptors overriding the bundled ones.
    #[serde(default)]
    pub schema_dir: Option<PathBuf>,
}

impl TransformConfig {
    pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 1;
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: default_max_concurrent_files(),
            scratch_dir: None,
            schema_dir: None,
        }
    }
}
