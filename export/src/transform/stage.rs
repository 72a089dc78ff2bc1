use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::decompose::decompose;
use crate::error::{ErrorKind, ExportResult};
use crate::export_error;
use crate::schema::SchemaRegistry;
use crate::store::ObjectStore;
use crate::store::paths::base_name;
use crate::transform::writer::{CsvRecordRow, CsvRowWriter, RecordWriters};
use crate::types::{RecordType, SessionRecord};

/// Name of the downloaded source object inside a scratch directory.
pub const DOWNLOADED_FILE_NAME: &str = "data.ndjson";

/// CSV files written for one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutput {
    pub files: BTreeMap<RecordType, PathBuf>,
    pub rows: BTreeMap<RecordType, usize>,
    /// Session records read, blank lines excluded.
    pub records: usize,
}

impl TransformOutput {
    pub fn rows_for(&self, record_type: RecordType) -> usize {
        self.rows.get(&record_type).copied().unwrap_or_default()
    }
}

/// Returns the identifier of a source file: its base name without the `export-<n>-` head.
pub fn file_id(key: &str) -> &str {
    let name = base_name(key);
    name.splitn(3, '-').nth(2).unwrap_or(name)
}

/// Downloads a source file into `scratch_dir` and decomposes it into one CSV per record type.
pub async fn transform_file<S>(
    store: &S,
    bucket: &str,
    key: &str,
    registry: Arc<SchemaRegistry>,
    scratch_dir: &Path,
) -> ExportResult<TransformOutput>
where
    S: ObjectStore,
{
    let data_path = scratch_dir.join(DOWNLOADED_FILE_NAME);
    info!(bucket, key, path = %data_path.display(), "downloading source file");
    store.download(bucket, key, &data_path).await?;

    let output_dir = scratch_dir.to_path_buf();
    let file_id = file_id(key).to_string();
    let source = key.to_string();

    let output = tokio::task::spawn_blocking(move || {
        decompose_file(&data_path, &output_dir, &file_id, &registry, &source)
    })
    .await??;

    info!(key, records = output.records, rows = ?output.rows, "transformed source file");

    Ok(output)
}

/// Decomposes every session record of a newline-delimited JSON file.
///
/// Blank lines are skipped. The first malformed record fails the whole file. Writers are
/// flushed before returning in every case.
pub fn decompose_file(
    data_path: &Path,
    output_dir: &Path,
    file_id: &str,
    registry: &SchemaRegistry,
    source: &str,
) -> ExportResult<TransformOutput> {
    let reader = BufReader::new(File::open(data_path)?);
    let session_columns = registry.session_columns();
    let mut writers = RecordWriters::create(output_dir, file_id, registry)?;

    let written = write_records(reader, &mut writers, &session_columns, source);

    let flushed = writers.flush();
    let records = written?;
    flushed?;

    Ok(TransformOutput {
        files: writers.paths().iter().cloned().collect(),
        rows: writers.row_counts().into_iter().collect(),
        records,
    })
}

fn write_records<R: BufRead>(
    reader: R,
    writers: &mut RecordWriters,
    session_columns: &[&str],
    source: &str,
) -> ExportResult<usize> {
    let mut records = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let line_number = index + 1;
        let record: SessionRecord = serde_json::from_str(&line).map_err(|err| {
            export_error!(
                ErrorKind::DeserializationError,
                "Malformed session record",
                format!("{source}: line {line_number}: {err}"),
                source: err
            )
        })?;

        let decomposed = decompose(&record, session_columns).inspect_err(|err| {
            error!(source, line_number, error = %err, "failed to decompose session record");
        })?;
        writers.write(&decomposed)?;
        records += 1;
    }

    Ok(records)
}

/// Rewrites a vendor CSV of one record type into the registry's column order.
///
/// Returns the number of rows written.
pub fn reshape_csv(
    input: &Path,
    output: &Path,
    record_type: RecordType,
    registry: &SchemaRegistry,
) -> ExportResult<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(input)?;
    let mut writer = CsvRowWriter::create(output, registry.schema(record_type).clone())?;

    let written = copy_records(&mut reader, &mut writer);

    let flushed = writer.flush();
    written?;
    flushed?;

    Ok(writer.rows_written())
}

fn copy_records<R: std::io::Read>(
    reader: &mut csv::Reader<R>,
    writer: &mut CsvRowWriter<File>,
) -> ExportResult<()> {
    let header = reader.headers()?.clone();
    let mut record = csv::StringRecord::new();
    while reader.read_record(&mut record)? {
        writer.write_row(&CsvRecordRow::new(&header, &record))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const RECORD: &str = r#"{"sessionId":"7","userAttributes":{"plan":"pro"},"experiments":[{"id":1,"variantId":2}],"states":[{"stateId":"s","events":[{"eventId":"9","name":"open","time":1.5,"value":0,"parameters":{"a":1,"b":"x"}}]}],"lat":1.0,"isSession":true}"#;

    fn write_input(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join(DOWNLOADED_FILE_NAME);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn file_id_drops_export_head() {
        assert_eq!(file_id("firefox/20200601/export-1-abc-output-12"), "abc-output-12");
        assert_eq!(file_id("plain"), "plain");
    }

    #[test]
    fn decomposes_records_into_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::bundled().unwrap();
        let input = write_input(dir.path(), &format!("{RECORD}\n\n{RECORD}\n"));

        let output = decompose_file(&input, dir.path(), "abc-output-0", &registry, "test").unwrap();

        assert_eq!(output.records, 2);
        assert_eq!(output.rows_for(RecordType::Sessions), 2);
        assert_eq!(output.rows_for(RecordType::EventParameters), 4);
        assert_eq!(output.rows_for(RecordType::States), 0);
        assert_eq!(output.files.len(), 6);

        let experiments =
            fs::read_to_string(dir.path().join("experiments-abc-output-0.csv")).unwrap();
        assert_eq!(experiments, "sessionId,experimentId,variantId\n7,1,2\n7,1,2\n");

        let states = fs::read_to_string(&output.files[&RecordType::States]).unwrap();
        assert_eq!(states.lines().count(), 1);
    }

    #[test]
    fn malformed_record_fails_file_after_flushing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::bundled().unwrap();
        let input = write_input(dir.path(), &format!("{RECORD}\n{{not json\n"));

        let err = decompose_file(&input, dir.path(), "f", &registry, "test").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DeserializationError);
        assert!(err.detail().unwrap().contains("line 2"));
        let sessions = fs::read_to_string(dir.path().join("sessions-f.csv")).unwrap();
        assert_eq!(sessions.lines().count(), 2);
    }

    #[test]
    fn reshapes_vendor_csv() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::bundled().unwrap();
        let input = dir.path().join("vendor.csv");
        fs::write(&input, "variantId,sessionId,experimentId,extra\n2,7,1,x\n").unwrap();
        let output = dir.path().join("experiments.csv");

        let rows = reshape_csv(&input, &output, RecordType::Experiments, &registry).unwrap();

        assert_eq!(rows, 1);
        assert_eq!(
            fs::read_to_string(output).unwrap(),
            "sessionId,experimentId,variantId\n7,1,2\n"
        );
    }
}
