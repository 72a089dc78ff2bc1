use ::config::load_config;
use ::config::shared::ExporterConfig;

use crate::cli::Command;
use crate::error::{ExporterError, ExporterResult};

/// Loads and validates the exporter configuration for `command`.
///
/// A `--project` flag replaces the configured project. Commands calling the vendor API
/// additionally require the `vendor` section.
pub fn load_exporter_config(command: &Command) -> ExporterResult<ExporterConfig> {
    let mut config = load_config::<ExporterConfig>().map_err(ExporterError::config)?;
    if let Some(project) = &command.run_args().project {
        config.gcp.project_id = project.clone();
    }
    config.validate().map_err(ExporterError::config)?;

    if command.uses_vendor_api() {
        config.require_vendor().map_err(ExporterError::config)?;
    }

    Ok(config)
}
