use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::model::{Channel, Dataset, WriteMode};
use super::mzml::Accessions;
use crate::error::{PipelineError, Result};
use crate::notify::NotificationSink;
use crate::processing::SpectralProcessor;

/// Directory converted raw files are cached in.
pub const CREATED_DATA_DIR: &str = "created_data";

// ---------------------------------------------------------------------------
// Source formats
// ---------------------------------------------------------------------------

/// Input formats, resolved from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// `.mzML` / `.mzML.gz` instrument export; converted once to a container.
    RawInstrument,
    /// `.h5` sectioned container.
    Container,
    /// `.csv` flat table, read whole.
    FlatTable,
}

impl SourceFormat {
    pub fn detect(path: &Path) -> Result<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_ascii_lowercase().as_str() {
            "mzml" | "gz" => Ok(SourceFormat::RawInstrument),
            "h5" => Ok(SourceFormat::Container),
            "csv" => Ok(SourceFormat::FlatTable),
            "" => Err(PipelineError::UnsupportedFormat {
                extension: "Folder".into(),
            }),
            _ => Err(PipelineError::UnsupportedFormat {
                extension: format!(".{ext}"),
            }),
        }
    }
}

/// Human-readable cvParam names that identify the retention-time and
/// drift-time terms of a raw file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessionNames {
    pub retention_time: String,
    pub drift_time: String,
}

impl Default for AccessionNames {
    fn default() -> Self {
        Self {
            retention_time: "scan start time".into(),
            drift_time: "ion mobility drift time".into(),
        }
    }
}

/// Container path a raw file is converted to: `created_data/<stem>.h5`.
/// `None` for inputs that need no conversion.
pub fn converted_path_for(raw: &Path) -> Option<PathBuf> {
    match SourceFormat::detect(raw) {
        Ok(SourceFormat::RawInstrument) => {
            let stem = raw.file_stem()?.to_string_lossy();
            Some(Path::new(CREATED_DATA_DIR).join(format!("{stem}.h5")))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load one channel of a dataset, dispatching on the file extension.
///
/// * `.mzML` / `.gz` – served from `converted` when it exists; otherwise the
///   raw file is converted, both channels are persisted to `converted`
///   (ms1 fresh, then ms2 appended) and the requested channel is returned
///   from memory.
/// * `.h5` – section `key`, restricted to `columns`.
/// * `.csv` – the whole table; `key` and `columns` are ignored.
pub fn load_mz_h5<P, N>(
    processor: &P,
    notifier: &N,
    path: &Path,
    key: Channel,
    columns: &[String],
    accession_names: &AccessionNames,
    converted: Option<&Path>,
) -> Result<Dataset>
where
    P: SpectralProcessor + ?Sized,
    N: NotificationSink + ?Sized,
{
    match SourceFormat::detect(path)? {
        SourceFormat::RawInstrument => {
            let converted = converted.ok_or_else(|| PipelineError::MissingConversionTarget {
                path: path.to_path_buf(),
            })?;
            if converted.exists() {
                log::info!(
                    "Using existing h5 file {}; rename or delete it to convert {} again",
                    converted.display(),
                    path.display()
                );
                return processor.load(converted, key.key(), Some(columns));
            }
            convert_raw(processor, notifier, path, key, columns, accession_names, converted)
        }
        SourceFormat::Container => processor.load(path, key.key(), Some(columns)),
        SourceFormat::FlatTable => load_csv(path),
    }
}

fn convert_raw<P, N>(
    processor: &P,
    notifier: &N,
    path: &Path,
    key: Channel,
    columns: &[String],
    names: &AccessionNames,
    converted: &Path,
) -> Result<Dataset>
where
    P: SpectralProcessor + ?Sized,
    N: NotificationSink + ?Sized,
{
    let available = processor.accessions(path)?;
    let resolve = |name: &str| {
        available
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownAccession {
                name: name.to_string(),
                path: path.to_path_buf(),
            })
    };
    let accessions = Accessions {
        retention_time: resolve(&names.retention_time)?,
        drift_time: resolve(&names.drift_time)?,
    };

    notifier.clear();
    notifier.info(&format!(
        "load mz using {{{}: {}, {}: {}}}",
        names.retention_time, accessions.retention_time, names.drift_time, accessions.drift_time
    ));
    notifier.info("loading an mz file will take a while, will see 'done loading' when finished");
    log::info!("converting {} to {}", path.display(), converted.display());

    let mut channels = processor.convert(path, &accessions)?;
    let ms1 = channels.remove(&Channel::Ms1).unwrap_or_default();
    let ms2 = channels.remove(&Channel::Ms2).unwrap_or_default();

    processor.save(converted, Channel::Ms1.key(), &ms1, WriteMode::Overwrite)?;
    notifier.info(&format!("saved ms1 ({} rows)", ms1.len()));
    processor.save(converted, Channel::Ms2.key(), &ms2, WriteMode::Append)?;
    notifier.info(&format!("saving as h5 file in {}", converted.display()));
    notifier.info("done loading");

    match key {
        Channel::Ms1 => ms1.select(columns),
        Channel::Ms2 => ms2.select(columns),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one observation per row.
/// Numeric columns are kept (empty cells become NaN); columns holding any
/// non-numeric value are dropped.
pub fn load_csv(path: &Path) -> Result<Dataset> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut columns: Vec<Option<Vec<f64>>> = vec![Some(Vec::new()); headers.len()];
    for result in reader.records() {
        let record = result?;
        for (col, cell) in columns.iter_mut().zip(record.iter()) {
            let Some(values) = col else {
                continue;
            };
            match parse_cell(cell) {
                Some(v) => values.push(v),
                None => *col = None,
            }
        }
    }

    let mut dataset = Dataset::new();
    for (name, values) in headers.into_iter().zip(columns) {
        match values {
            Some(values) => dataset.push_column(name, values)?,
            None => log::warn!("{}: dropping non-numeric column '{name}'", path.display()),
        }
    }
    Ok(dataset)
}

fn parse_cell(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return Some(f64::NAN);
    }
    s.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::container;
    use crate::data::mzml;
    use crate::notify::NotificationCenter;
    use crate::processing::NativeProcessor;
    use crate::testing::RecordingProcessor;

    fn columns() -> Vec<String> {
        ["mz", "drift_time", "retention_time", "intensity"]
            .map(String::from)
            .to_vec()
    }

    #[test]
    fn detects_supported_extensions() {
        for (name, format) in [
            ("run.mzML", SourceFormat::RawInstrument),
            ("run.mzML.gz", SourceFormat::RawInstrument),
            ("run.h5", SourceFormat::Container),
            ("table.csv", SourceFormat::FlatTable),
        ] {
            assert_eq!(SourceFormat::detect(Path::new(name)).unwrap(), format, "{name}");
        }
    }

    #[test]
    fn rejects_unsupported_extensions() {
        for (name, reported) in [("run.txt", ".txt"), ("data/raw_folder", "Folder")] {
            match SourceFormat::detect(Path::new(name)) {
                Err(PipelineError::UnsupportedFormat { extension }) => {
                    assert_eq!(extension, reported)
                }
                other => panic!("{name}: unexpected {other:?}"),
            }
        }
        let err = load_mz_h5(
            &NativeProcessor,
            &NotificationCenter::default(),
            Path::new("run.parquet"),
            Channel::Ms1,
            &columns(),
            &AccessionNames::default(),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().starts_with(".parquet used"));
    }

    #[test]
    fn converted_path_only_for_raw_inputs() {
        assert_eq!(
            converted_path_for(Path::new("raw/sample.mzML")),
            Some(Path::new("created_data").join("sample.h5"))
        );
        assert_eq!(
            converted_path_for(Path::new("raw/sample.mzML.gz")),
            Some(Path::new("created_data").join("sample.mzML.h5"))
        );
        assert_eq!(converted_path_for(Path::new("sample.h5")), None);
    }

    #[test]
    fn csv_is_read_whole() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(
            &path,
            "mz,drift_time,retention_time,intensity,label\n100.5,20,1.5,300,a\n200,21,,400,b\n",
        )
        .unwrap();

        let ds = load_mz_h5(
            &NativeProcessor,
            &NotificationCenter::default(),
            &path,
            Channel::Ms2,
            &["mz".to_string()],
            &AccessionNames::default(),
            None,
        )
        .unwrap();
        assert_eq!(ds.column_names(), ["mz", "drift_time", "retention_time", "intensity"]);
        assert_eq!(ds.column("mz").unwrap(), [100.5, 200.0]);
        assert!(ds.column("retention_time").unwrap()[1].is_nan());
    }

    #[test]
    fn container_reads_requested_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.h5");
        let ms2 = Dataset::from_columns([
            ("intensity", vec![7.0]),
            ("mz", vec![1.0]),
            ("drift_time", vec![2.0]),
            ("retention_time", vec![3.0]),
        ])
        .unwrap();
        container::write_section(&path, "ms1", &ms2, WriteMode::Overwrite).unwrap();
        container::write_section(&path, "ms2", &ms2, WriteMode::Append).unwrap();

        let processor = RecordingProcessor::default();
        let ds = load_mz_h5(
            &processor,
            &NotificationCenter::default(),
            &path,
            Channel::Ms2,
            &columns(),
            &AccessionNames::default(),
            None,
        )
        .unwrap();
        assert_eq!(ds.column_names(), columns());
        assert_eq!(ds.row(0).unwrap(), vec![1.0, 2.0, 3.0, 7.0]);
        assert_eq!(processor.calls(), ["load ms2"]);
    }

    #[test]
    fn raw_conversion_persists_both_channels_then_reuses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("run.mzML");
        std::fs::write(&raw, mzml::tests::minimal_mzml()).unwrap();
        let converted = dir.path().join("created_data").join("run.h5");

        let processor = RecordingProcessor::default();
        let center = NotificationCenter::default();
        let ms2 = load_mz_h5(
            &processor,
            &center,
            &raw,
            Channel::Ms2,
            &columns(),
            &AccessionNames::default(),
            Some(&converted),
        )
        .unwrap();

        assert_eq!(ms2.len(), 3);
        assert_eq!(
            processor.calls(),
            ["accessions", "convert", "save ms1 Overwrite", "save ms2 Append"]
        );
        assert_eq!(center.messages().len(), 5);
        assert_eq!(center.messages().last().unwrap(), "done loading");
        assert_eq!(container::list_sections(&converted).unwrap(), ["ms1", "ms2"]);

        // Second run hits the cache: no conversion, no notifications.
        let cached = RecordingProcessor::default();
        let quiet = NotificationCenter::default();
        let ms1 = load_mz_h5(
            &cached,
            &quiet,
            &raw,
            Channel::Ms1,
            &columns(),
            &AccessionNames::default(),
            Some(&converted),
        )
        .unwrap();
        assert_eq!(ms1.column("mz").unwrap(), [100.0, 150.0]);
        assert_eq!(cached.calls(), ["load ms1"]);
        assert!(quiet.is_empty());
    }

    #[test]
    fn raw_without_target_or_accession_fails() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("run.mzML");
        std::fs::write(&raw, mzml::tests::minimal_mzml()).unwrap();

        let err = load_mz_h5(
            &NativeProcessor,
            &NotificationCenter::default(),
            &raw,
            Channel::Ms1,
            &columns(),
            &AccessionNames::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::MissingConversionTarget { .. }));

        let names = AccessionNames {
            retention_time: "scan start time".into(),
            drift_time: "inverse reduced ion mobility".into(),
        };
        let target = dir.path().join("out.h5");
        let err = load_mz_h5(
            &NativeProcessor,
            &NotificationCenter::default(),
            &raw,
            Channel::Ms1,
            &columns(),
            &names,
            Some(&target),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownAccession { name, .. } if name == "inverse reduced ion mobility"));
        assert!(!target.exists());
    }
}
