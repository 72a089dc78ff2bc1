use serde_json::Value;
use std::borrow::Cow;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::bail;
use crate::error::{ErrorKind, ExportResult};
use crate::export_error;
use crate::schema::{ColumnSchema, ColumnType, SchemaRegistry, TableSchema};
use crate::types::{Cell, DecomposedSession, RecordType, Row};

/// Converts an integral float into an `i64` when it is exactly representable.
fn integral_float(value: f64) -> Option<i64> {
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

    (value.is_finite() && value.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&value))
        .then_some(value as i64)
}

/// Parses the text form of an integer column.
fn integer_from_text(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().and_then(integral_float))
}

/// Identifier columns joining the record types together.
const IDENTIFIER_COLUMNS: [&str; 4] = ["sessionId", "eventId", "experimentId", "variantId"];

/// Renders a cell as CSV field text for the given column.
///
/// `INTEGER` identifier columns are coerced from numeric strings and integral floats, and a value
/// that cannot be coerced fails the row. Other `INTEGER` columns only get integral floats
/// normalized; anything else is written as-is and left to the warehouse's bad record limit.
pub fn render_cell<'a>(column: &ColumnSchema, cell: Cell<'a>) -> ExportResult<Cow<'a, str>> {
    if column.typ == ColumnType::Integer && IDENTIFIER_COLUMNS.contains(&column.name.as_str()) {
        let integer = match cell {
            Cell::Null => return Ok(Cow::Borrowed("")),
            Cell::Text(text) if text.trim().is_empty() => return Ok(Cow::Borrowed("")),
            Cell::Integer(value) => Some(value),
            Cell::Text(text) => integer_from_text(text),
            Cell::Json(Value::Number(number)) => number
                .as_i64()
                .or_else(|| number.as_f64().and_then(integral_float)),
            Cell::Bool(_) | Cell::Json(_) => None,
        };

        return match integer {
            Some(integer) => Ok(Cow::Owned(integer.to_string())),
            None => bail!(
                ErrorKind::InvalidData,
                "Value of an identifier column is not an integer",
                format!("column `{}`: {cell:?}", column.name)
            ),
        };
    }

    if column.typ == ColumnType::Integer
        && let Cell::Json(Value::Number(number)) = &cell
        && !number.is_i64()
        && let Some(integer) = number.as_f64().and_then(integral_float)
    {
        return Ok(Cow::Owned(integer.to_string()));
    }

    Ok(match cell {
        Cell::Null => Cow::Borrowed(""),
        Cell::Integer(value) => Cow::Owned(value.to_string()),
        Cell::Bool(true) => Cow::Borrowed("true"),
        Cell::Bool(false) => Cow::Borrowed("false"),
        Cell::Text(text) => Cow::Borrowed(text),
        Cell::Json(Value::String(text)) => Cow::Borrowed(text.as_str()),
        Cell::Json(value) => Cow::Owned(value.to_string()),
    })
}

/// CSV writer laying rows out in a table schema's column order.
///
/// The header is the declared column list. Row fields outside the declared columns are dropped
/// and declared columns a row does not carry are written empty.
pub struct CsvRowWriter<W: Write> {
    schema: TableSchema,
    writer: csv::Writer<W>,
    rows_written: usize,
}

impl CsvRowWriter<File> {
    /// Creates the file at `path` and writes the header.
    pub fn create(path: &Path, schema: TableSchema) -> ExportResult<Self> {
        let file = File::create(path).map_err(|err| {
            export_error!(
                ErrorKind::IoError,
                "Failed to create CSV file",
                path.display(),
                source: err
            )
        })?;

        Self::new(file, schema)
    }
}

impl<W: Write> CsvRowWriter<W> {
    pub fn new(inner: W, schema: TableSchema) -> ExportResult<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(schema.column_names())?;

        Ok(Self {
            schema,
            writer,
            rows_written: 0,
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn write_row<R: Row>(&mut self, row: &R) -> ExportResult<()> {
        let fields = self
            .schema
            .columns
            .iter()
            .map(|column| render_cell(column, row.cell(&column.name).unwrap_or(Cell::Null)))
            .collect::<ExportResult<Vec<_>>>()?;

        self.writer.write_record(fields.iter().map(|field| field.as_ref()))?;
        self.rows_written += 1;

        Ok(())
    }

    pub fn write_rows<'r, R, I>(&mut self, rows: I) -> ExportResult<()>
    where
        R: Row + 'r,
        I: IntoIterator<Item = &'r R>,
    {
        for row in rows {
            self.write_row(row)?;
        }

        Ok(())
    }

    pub fn flush(&mut self) -> ExportResult<()> {
        self.writer.flush()?;

        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> ExportResult<W> {
        self.writer.into_inner().map_err(|err| {
            let detail = err.error().to_string();
            export_error!(ErrorKind::IoError, "Failed to flush CSV writer", detail)
        })
    }
}

/// A row of a CSV file read through its own header.
///
/// Lets a file with another column order go through [`CsvRowWriter`].
pub struct CsvRecordRow<'a> {
    header: &'a csv::StringRecord,
    record: &'a csv::StringRecord,
}

impl<'a> CsvRecordRow<'a> {
    pub fn new(header: &'a csv::StringRecord, record: &'a csv::StringRecord) -> Self {
        Self { header, record }
    }
}

impl Row for CsvRecordRow<'_> {
    fn cell(&self, column: &str) -> Option<Cell<'_>> {
        let index = self.header.iter().position(|name| name == column)?;
        match self.record.get(index) {
            Some("") | None => Some(Cell::Null),
            Some(text) => Some(Cell::Text(text)),
        }
    }
}

/// One open CSV file per record type.
pub struct RecordWriters {
    event_parameters: CsvRowWriter<File>,
    events: CsvRowWriter<File>,
    experiments: CsvRowWriter<File>,
    sessions: CsvRowWriter<File>,
    states: CsvRowWriter<File>,
    user_attributes: CsvRowWriter<File>,
    paths: Vec<(RecordType, PathBuf)>,
}

impl RecordWriters {
    /// Creates `<record-type>-<file-id>.csv` for every record type in `dir`.
    pub fn create(dir: &Path, file_id: &str, registry: &SchemaRegistry) -> ExportResult<Self> {
        let mut paths = Vec::with_capacity(RecordType::ALL.len());
        let mut open = |record_type: RecordType| {
            let path = dir.join(csv_file_name(record_type, file_id));
            let writer = CsvRowWriter::create(&path, registry.schema(record_type).clone());
            paths.push((record_type, path));
            writer
        };

        Ok(Self {
            event_parameters: open(RecordType::EventParameters)?,
            events: open(RecordType::Events)?,
            experiments: open(RecordType::Experiments)?,
            sessions: open(RecordType::Sessions)?,
            states: open(RecordType::States)?,
            user_attributes: open(RecordType::UserAttributes)?,
            paths,
        })
    }

    /// Appends every row of a decomposed session to its writer.
    pub fn write(&mut self, decomposed: &DecomposedSession) -> ExportResult<()> {
        self.user_attributes.write_rows(&decomposed.user_attributes)?;
        self.states.write_rows(&decomposed.states)?;
        self.experiments.write_rows(&decomposed.experiments)?;
        self.sessions.write_rows(&decomposed.sessions)?;
        self.events.write_rows(&decomposed.events)?;
        self.event_parameters
            .write_rows(&decomposed.event_parameters)?;

        Ok(())
    }

    fn writers_mut(&mut self) -> [(RecordType, &mut CsvRowWriter<File>); 6] {
        [
            (RecordType::EventParameters, &mut self.event_parameters),
            (RecordType::Events, &mut self.events),
            (RecordType::Experiments, &mut self.experiments),
            (RecordType::Sessions, &mut self.sessions),
            (RecordType::States, &mut self.states),
            (RecordType::UserAttributes, &mut self.user_attributes),
        ]
    }

    /// Flushes every writer, reporting the first failure after trying all of them.
    pub fn flush(&mut self) -> ExportResult<()> {
        let mut first_error = None;
        for (_, writer) in self.writers_mut() {
            if let Err(err) = writer.flush() {
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Number of rows written per record type.
    pub fn row_counts(&mut self) -> Vec<(RecordType, usize)> {
        self.writers_mut()
            .into_iter()
            .map(|(record_type, writer)| (record_type, writer.rows_written()))
            .collect()
    }

    pub fn paths(&self) -> &[(RecordType, PathBuf)] {
        &self.paths
    }
}

/// File name of a record type's CSV derived from a source file.
pub fn csv_file_name(record_type: RecordType, file_id: &str) -> String {
    format!("{record_type}-{file_id}.csv")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnMode;
    use crate::types::{EventParameterRow, SessionRow};
    use serde_json::json;

    fn schema(columns: &[(&str, ColumnType)]) -> TableSchema {
        TableSchema::new(
            RecordType::EventParameters,
            columns
                .iter()
                .map(|(name, typ)| ColumnSchema::new(*name, *typ, ColumnMode::Nullable))
                .collect(),
        )
    }

    fn written<F>(schema: TableSchema, write: F) -> String
    where
        F: FnOnce(&mut CsvRowWriter<Vec<u8>>),
    {
        let mut writer = CsvRowWriter::new(Vec::new(), schema).unwrap();
        write(&mut writer);
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn writes_declared_columns_only() {
        let schema = schema(&[
            ("eventId", ColumnType::Integer),
            ("missing", ColumnType::String),
            ("value", ColumnType::String),
        ]);
        let row = EventParameterRow {
            event_id: json!("5682457234720643012"),
            name: "p1".to_string(),
            value: json!({"nested": [1, 2]}),
        };

        let output = written(schema, |writer| writer.write_row(&row).unwrap());

        assert_eq!(
            output,
            "eventId,missing,value\n5682457234720643012,,\"{\"\"nested\"\":[1,2]}\"\n"
        );
    }

    #[test]
    fn renders_scalars() {
        let schema = schema(&[
            ("flag", ColumnType::Boolean),
            ("duration", ColumnType::Float),
            ("count", ColumnType::Integer),
            ("city", ColumnType::String),
        ]);
        let row = SessionRow {
            session_id: 1,
            fields: vec![
                ("flag".to_string(), json!(false)),
                ("duration".to_string(), json!(0.5)),
                ("count".to_string(), json!(4.0)),
                ("city".to_string(), Value::Null),
            ],
        };

        let output = written(schema, |writer| writer.write_row(&row).unwrap());

        assert_eq!(output, "flag,duration,count,city\nfalse,0.5,4,\n");
    }

    #[test]
    fn rejects_non_integer_identifier() {
        let schema = schema(&[("eventId", ColumnType::Integer)]);
        let row = EventParameterRow {
            event_id: json!("abc"),
            name: "p".to_string(),
            value: json!(1),
        };

        let mut writer = CsvRowWriter::new(Vec::new(), schema).unwrap();
        let err = writer.write_row(&row).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert_eq!(writer.rows_written(), 0);
    }

    #[test]
    fn writes_non_integer_counters_as_is() {
        let schema = schema(&[
            ("sessionId", ColumnType::Integer),
            ("priorEvents", ColumnType::Integer),
            ("priorSessions", ColumnType::Integer),
            ("priorStates", ColumnType::Integer),
        ]);
        let row = SessionRow {
            session_id: 1,
            fields: vec![
                ("priorEvents".to_string(), json!(1.5)),
                ("priorSessions".to_string(), json!("many")),
                ("priorStates".to_string(), json!(2.0)),
            ],
        };

        let output = written(schema, |writer| writer.write_row(&row).unwrap());

        assert_eq!(
            output,
            "sessionId,priorEvents,priorSessions,priorStates\n1,1.5,many,2\n"
        );
    }

    #[test]
    fn reorders_foreign_csv_records() {
        let schema = schema(&[("b", ColumnType::Integer), ("c", ColumnType::String), ("a", ColumnType::String)]);
        let header = csv::StringRecord::from(vec!["a", "b", "extra"]);
        let record = csv::StringRecord::from(vec!["x", "7", "dropped"]);

        let output = written(schema, |writer| {
            writer.write_row(&CsvRecordRow::new(&header, &record)).unwrap()
        });

        assert_eq!(output, "b,c,a\n7,,x\n");
    }
}
