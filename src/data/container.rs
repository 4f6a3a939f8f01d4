//! Sectioned container files.
//!
//! A container is a ZIP archive whose entries are `<key>.parquet`, one per
//! section (normally `ms1` and `ms2`). Every section is a single Parquet
//! file of `Float64` columns, stored without ZIP compression.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Float64Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Schema};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::model::{Dataset, WriteMode};
use crate::error::{PipelineError, Result};

const SECTION_SUFFIX: &str = ".parquet";

fn entry_name(key: &str) -> String {
    format!("{key}{SECTION_SUFFIX}")
}

/// Names of the sections present in a container.
pub fn list_sections(path: &Path) -> Result<Vec<String>> {
    let archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
    let mut keys: Vec<String> = archive
        .file_names()
        .filter_map(|n| n.strip_suffix(SECTION_SUFFIX))
        .map(str::to_string)
        .collect();
    keys.sort();
    Ok(keys)
}

/// Read one section. With `columns`, the result is restricted to (and
/// ordered by) those columns.
pub fn read_section(path: &Path, key: &str, columns: Option<&[String]>) -> Result<Dataset> {
    let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
    let mut entry = archive
        .by_name(&entry_name(key))
        .map_err(|_| PipelineError::MissingSection {
            key: key.to_string(),
            path: path.to_path_buf(),
        })?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf)?;

    let dataset = decode_parquet(Bytes::from(buf))?;
    log::debug!(
        "read section '{key}' from {}: {} rows, columns {:?}",
        path.display(),
        dataset.len(),
        dataset.column_names()
    );
    match columns {
        Some(cols) => dataset.select(cols),
        None => Ok(dataset),
    }
}

/// Write one section.
///
/// `Overwrite` produces a container holding only this section. `Append`
/// copies every other section of an existing container and replaces `key`
/// if it was already present. The new archive is written to a temporary
/// file next to `path` and renamed into place.
pub fn write_section(path: &Path, key: &str, data: &Dataset, mode: WriteMode) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let tmp = NamedTempFile::new_in(parent)?;
    {
        let mut zip = ZipWriter::new(BufWriter::new(tmp.as_file()));
        let target = entry_name(key);

        if mode == WriteMode::Append && path.exists() {
            let mut existing = ZipArchive::new(BufReader::new(File::open(path)?))?;
            for i in 0..existing.len() {
                let entry = existing.by_index_raw(i)?;
                if entry.name() == target {
                    continue;
                }
                zip.raw_copy_file(entry)?;
            }
        }

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(true);
        zip.start_file(target, options)?;
        zip.write_all(&encode_parquet(data)?)?;
        zip.finish()?.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;

    log::debug!(
        "wrote section '{key}' ({:?}) to {}: {} rows",
        mode,
        path.display(),
        data.len()
    );
    Ok(())
}

fn encode_parquet(data: &Dataset) -> Result<Vec<u8>> {
    let fields: Vec<Field> = data
        .column_names()
        .iter()
        .map(|n| Field::new(n, DataType::Float64, false))
        .collect();
    let schema = Arc::new(Schema::new(fields));
    let arrays: Vec<ArrayRef> = data
        .columns()
        .map(|(_, values)| Arc::new(Float64Array::from(values.to_vec())) as ArrayRef)
        .collect();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, schema.clone(), None)?;
    if !arrays.is_empty() {
        writer.write(&RecordBatch::try_new(schema, arrays)?)?;
    }
    writer.close()?;
    Ok(buf)
}

fn decode_parquet(bytes: Bytes) -> Result<Dataset> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); schema.fields().len()];
    for batch in reader {
        let batch = batch?;
        for (i, column) in batch.columns().iter().enumerate() {
            columns[i].extend(float_values(column)?);
        }
    }

    Dataset::from_columns(
        schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .zip(columns),
    )
}

/// Any numeric Arrow column widened to `f64`; nulls become NaN.
fn float_values(column: &ArrayRef) -> Result<Vec<f64>> {
    let widened = cast(column.as_ref(), &DataType::Float64)?;
    let values = widened.as_primitive::<Float64Type>();
    Ok((0..values.len())
        .map(|i| {
            if values.is_null(i) {
                f64::NAN
            } else {
                values.value(i)
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(offset: f64) -> Dataset {
        Dataset::from_columns([
            ("mz", vec![100.0 + offset, 200.5 + offset]),
            ("drift_time", vec![12.25, 13.5]),
            ("retention_time", vec![1.0, 1.1]),
            ("intensity", vec![1000.0, 250.0]),
        ])
        .unwrap()
    }

    #[test]
    fn ms1_then_ms2_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.h5");
        let ms1 = dataset(0.0);
        let ms2 = dataset(1.0);

        write_section(&path, "ms1", &ms1, WriteMode::Overwrite).unwrap();
        write_section(&path, "ms2", &ms2, WriteMode::Append).unwrap();

        assert_eq!(list_sections(&path).unwrap(), ["ms1", "ms2"]);
        assert_eq!(read_section(&path, "ms1", None).unwrap(), ms1);
        assert_eq!(read_section(&path, "ms2", None).unwrap(), ms2);
    }

    #[test]
    fn overwrite_discards_other_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.h5");
        write_section(&path, "ms1", &dataset(0.0), WriteMode::Overwrite).unwrap();
        write_section(&path, "ms2", &dataset(0.0), WriteMode::Append).unwrap();
        write_section(&path, "ms1", &dataset(5.0), WriteMode::Overwrite).unwrap();

        assert_eq!(list_sections(&path).unwrap(), ["ms1"]);
        assert!(matches!(
            read_section(&path, "ms2", None),
            Err(PipelineError::MissingSection { .. })
        ));
    }

    #[test]
    fn append_replaces_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.h5");
        write_section(&path, "ms1", &dataset(0.0), WriteMode::Overwrite).unwrap();
        write_section(&path, "ms2", &dataset(0.0), WriteMode::Append).unwrap();
        write_section(&path, "ms2", &dataset(9.0), WriteMode::Append).unwrap();

        assert_eq!(list_sections(&path).unwrap(), ["ms1", "ms2"]);
        assert_eq!(read_section(&path, "ms2", None).unwrap(), dataset(9.0));
        assert_eq!(read_section(&path, "ms1", None).unwrap(), dataset(0.0));
    }

    #[test]
    fn read_restricts_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run.h5");
        write_section(&path, "ms1", &dataset(0.0), WriteMode::Overwrite).unwrap();

        let cols = vec!["intensity".to_string(), "mz".to_string()];
        let ds = read_section(&path, "ms1", Some(&cols)).unwrap();
        assert_eq!(ds.column_names(), ["intensity", "mz"]);
        assert_eq!(ds.column("intensity").unwrap(), [1000.0, 250.0]);
    }

    #[test]
    fn empty_section_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peaks.h5");
        let empty = dataset(0.0).filter(|_| false);
        write_section(&path, "ms1", &empty, WriteMode::Overwrite).unwrap();

        let back = read_section(&path, "ms1", None).unwrap();
        assert!(back.is_empty());
        assert_eq!(back.column_names(), empty.column_names());
    }
}
