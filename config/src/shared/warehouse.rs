use serde::Deserialize;

const fn default_max_bad_records() -> i64 {
    WarehouseConfig::DEFAULT_MAX_BAD_RECORDS
}

fn default_external_dataset() -> String {
    WarehouseConfig::DEFAULT_EXTERNAL_DATASET.to_string()
}

/// Settings for the external-table load into the warehouse.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    /// Dataset holding the short-lived external tables.
    #[serde(default = "default_external_dataset")]
    pub external_dataset: String,
    /// Number of malformed CSV rows tolerated per external table.
    ///
    /// Rare corrupted values are skipped instead of failing the whole load.
    #[serde(default = "default_max_bad_records")]
    pub max_bad_records: i64,
}

impl WarehouseConfig {
    pub const DEFAULT_EXTERNAL_DATASET: &'static str = "tmp";

    pub const DEFAULT_MAX_BAD_RECORDS: i64 = 100;
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            external_dataset: default_external_dataset(),
            max_bad_records: default_max_bad_records(),
        }
    }
}
