use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

use crate::error::{ErrorKind, ExportResult};
use crate::export_error;
use crate::schema::{ColumnSchema, TableSchema};
use crate::types::RecordType;

/// Returns the descriptor compiled into the crate for a record type.
fn bundled_descriptor(record_type: RecordType) -> &'static str {
    match record_type {
        RecordType::EventParameters => include_str!("../../schemas/eventparameters.schema.json"),
        RecordType::Events => include_str!("../../schemas/events.schema.json"),
        RecordType::Experiments => include_str!("../../schemas/experiments.schema.json"),
        RecordType::Sessions => include_str!("../../schemas/sessions.schema.json"),
        RecordType::States => include_str!("../../schemas/states.schema.json"),
        RecordType::UserAttributes => include_str!("../../schemas/userattributes.schema.json"),
    }
}

/// Parses a `<record-type>.schema.json` descriptor.
fn parse_descriptor(record_type: RecordType, descriptor: &str) -> ExportResult<TableSchema> {
    let columns: Vec<ColumnSchema> = serde_json::from_str(descriptor).map_err(|err| {
        export_error!(
            ErrorKind::ConfigError,
            "Invalid schema descriptor",
            format!("{record_type}: {err}"),
            source: err
        )
    })?;

    if columns.is_empty() {
        return Err(export_error!(
            ErrorKind::ConfigError,
            "Schema descriptor declares no columns",
            record_type
        ));
    }

    Ok(TableSchema::new(record_type, columns))
}

/// Column lists of all record types, loaded once at startup.
///
/// Construction loads every descriptor, so lookups by [`RecordType`] cannot fail.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    event_parameters: TableSchema,
    events: TableSchema,
    experiments: TableSchema,
    sessions: TableSchema,
    states: TableSchema,
    user_attributes: TableSchema,
}

impl SchemaRegistry {
    /// Builds the registry from the descriptors compiled into the crate.
    pub fn bundled() -> ExportResult<Self> {
        Self::load_with(|record_type| parse_descriptor(record_type, bundled_descriptor(record_type)))
    }

    /// Builds the registry from `<record-type>.schema.json` files in `dir`.
    pub fn from_dir(dir: &Path) -> ExportResult<Self> {
        Self::load_with(|record_type| {
            let path = dir.join(format!("{record_type}.schema.json"));
            debug!(path = %path.display(), "reading schema descriptor");

            let descriptor = fs::read_to_string(&path).map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => export_error!(
                    ErrorKind::UnknownRecordType,
                    "No schema descriptor for record type",
                    path.display(),
                    source: err
                ),
                _ => export_error!(
                    ErrorKind::ConfigError,
                    "Schema descriptor could not be read",
                    path.display(),
                    source: err
                ),
            })?;

            parse_descriptor(record_type, &descriptor)
        })
    }

    fn load_with<F>(mut load: F) -> ExportResult<Self>
    where
        F: FnMut(RecordType) -> ExportResult<TableSchema>,
    {
        Ok(Self {
            event_parameters: load(RecordType::EventParameters)?,
            events: load(RecordType::Events)?,
            experiments: load(RecordType::Experiments)?,
            sessions: load(RecordType::Sessions)?,
            states: load(RecordType::States)?,
            user_attributes: load(RecordType::UserAttributes)?,
        })
    }

    /// Returns the column list of a record type.
    pub fn schema(&self, record_type: RecordType) -> &TableSchema {
        match record_type {
            RecordType::EventParameters => &self.event_parameters,
            RecordType::Events => &self.events,
            RecordType::Experiments => &self.experiments,
            RecordType::Sessions => &self.sessions,
            RecordType::States => &self.states,
            RecordType::UserAttributes => &self.user_attributes,
        }
    }

    /// Returns the column list of a record type given by name.
    ///
    /// Fails with [`ErrorKind::UnknownRecordType`] for names outside the six record types.
    pub fn describe(&self, record_type: &str) -> ExportResult<&TableSchema> {
        let record_type: RecordType = record_type.parse()?;

        Ok(self.schema(record_type))
    }

    /// Returns the column names of the session table.
    pub fn session_columns(&self) -> Vec<&str> {
        self.sessions.column_names().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    #[test]
    fn bundled_sessions_schema_has_declared_columns() {
        let registry = SchemaRegistry::bundled().unwrap();

        let columns = registry.session_columns();
        assert_eq!(columns.len(), 36);
        assert_eq!(columns[0], "sessionId");
        assert!(columns.contains(&"lat") && columns.contains(&"lon"));
        assert!(columns.contains(&"timezoneOffset"));
    }

    #[test]
    fn describe_by_name() {
        let registry = SchemaRegistry::bundled().unwrap();

        let schema = registry.describe("eventparameters").unwrap();
        let names: Vec<_> = schema.column_names().collect();
        assert_eq!(names, ["eventId", "name", "value"]);
        assert_eq!(schema.columns[0].typ, ColumnType::Integer);

        let err = registry.describe("unknown").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownRecordType);
    }

    #[test]
    fn from_dir_reports_missing_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("events.schema.json"),
            r#"[{"name": "eventId", "type": "INTEGER"}]"#,
        )
        .unwrap();

        let err = SchemaRegistry::from_dir(dir.path()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnknownRecordType);
    }

    #[test]
    fn from_dir_loads_all_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        for record_type in RecordType::ALL {
            std::fs::write(
                dir.path().join(format!("{record_type}.schema.json")),
                r#"[{"name": "sessionId", "type": "INTEGER"}, {"name": "name"}]"#,
            )
            .unwrap();
        }

        let registry = SchemaRegistry::from_dir(dir.path()).unwrap();

        assert_eq!(registry.schema(RecordType::States).columns.len(), 2);
    }
}
