//! mzML reader for ion-mobility runs.
//!
//! Spectra are flattened into one row per peak: `mz`, `intensity`, plus the
//! scan-level retention time and drift time. Which cvParams carry retention
//! and drift time is decided by the caller through [`Accessions`], because
//! instrument vendors disagree on the terms.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;

use base64::prelude::*;
use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::{MultiGzDecoder, ZlibDecoder};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::model::{Channel, Dataset};

pub const MZ_COLUMN: &str = "mz";
pub const INTENSITY_COLUMN: &str = "intensity";
pub const RETENTION_TIME_COLUMN: &str = "retention_time";
pub const DRIFT_TIME_COLUMN: &str = "drift_time";

const MS_LEVEL: &str = "MS:1000511";
const MZ_ARRAY: &str = "MS:1000514";
const INTENSITY_ARRAY: &str = "MS:1000515";
const FLOAT32: &str = "MS:1000521";
const FLOAT64: &str = "MS:1000523";
const ZLIB: &str = "MS:1000574";
const NO_COMPRESSION: &str = "MS:1000576";

/// Spectra inspected when collecting accessions.
const ACCESSION_SCAN_SPECTRA: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum MzMLError {
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("UTF-8 encoding error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("unsupported binary compression {0}")]
    UnsupportedCompression(String),

    #[error("invalid mzML structure: {0}")]
    InvalidStructure(String),
}

/// Concrete accessions (e.g. `MS:1000016`) used for the retention-time and
/// drift-time columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessions {
    pub retention_time: String,
    pub drift_time: String,
}

/// Open a plain or gzip-compressed mzML file.
pub fn open(path: &Path) -> Result<Box<dyn BufRead>, MzMLError> {
    let file = File::open(path)?;
    let gz = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"));
    if gz {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Map of cvParam name to accession, collected from the file header and
/// the first spectra.
pub fn get_accessions(path: &Path) -> Result<BTreeMap<String, String>, MzMLError> {
    collect_accessions(open(path)?)
}

/// Read every spectrum and split the rows by channel.
pub fn read_channels(
    path: &Path,
    accessions: &Accessions,
) -> Result<BTreeMap<Channel, Dataset>, MzMLError> {
    parse_channels(open(path)?, accessions)
}

pub(crate) fn collect_accessions<R: BufRead>(
    source: R,
) -> Result<BTreeMap<String, String>, MzMLError> {
    let mut reader = Reader::from_reader(source);
    let mut map = BTreeMap::new();
    let mut spectra_seen = 0;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if e.name().as_ref() == b"cvParam" => {
                let name = attribute(e, "name")?.unwrap_or_default();
                let accession = attribute(e, "accession")?.unwrap_or_default();
                if !name.is_empty() && !accession.is_empty() {
                    map.entry(name).or_insert(accession);
                }
            }
            Event::End(ref e) if e.name().as_ref() == b"spectrum" => {
                spectra_seen += 1;
                if spectra_seen >= ACCESSION_SCAN_SPECTRA {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(map)
}

#[derive(Default)]
struct ChannelColumns {
    mz: Vec<f64>,
    intensity: Vec<f64>,
    retention_time: Vec<f64>,
    drift_time: Vec<f64>,
}

impl ChannelColumns {
    fn into_dataset(self) -> Result<Dataset, MzMLError> {
        Dataset::from_columns([
            (MZ_COLUMN, self.mz),
            (INTENSITY_COLUMN, self.intensity),
            (RETENTION_TIME_COLUMN, self.retention_time),
            (DRIFT_TIME_COLUMN, self.drift_time),
        ])
        .map_err(|e| MzMLError::InvalidStructure(e.to_string()))
    }
}

struct SpectrumState {
    ms_level: Option<u8>,
    retention_time: f64,
    drift_time: f64,
    mz: Vec<f64>,
    intensity: Vec<f64>,
}

impl Default for SpectrumState {
    fn default() -> Self {
        Self {
            ms_level: None,
            retention_time: f64::NAN,
            drift_time: f64::NAN,
            mz: Vec::new(),
            intensity: Vec::new(),
        }
    }
}

#[derive(Default)]
struct ArrayState {
    float32: bool,
    zlib: bool,
    kind: Option<&'static str>,
    text: String,
}

pub(crate) fn parse_channels<R: BufRead>(
    source: R,
    accessions: &Accessions,
) -> Result<BTreeMap<Channel, Dataset>, MzMLError> {
    let mut reader = Reader::from_reader(source);
    let mut out: HashMap<Channel, ChannelColumns> = HashMap::new();
    let mut spectrum: Option<SpectrumState> = None;
    let mut array: Option<ArrayState> = None;
    let mut in_binary = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.name().as_ref() {
                b"spectrum" => spectrum = Some(SpectrumState::default()),
                b"binaryDataArray" if spectrum.is_some() => array = Some(ArrayState::default()),
                b"binary" => in_binary = array.is_some(),
                b"cvParam" => apply_cv_param(e, accessions, &mut spectrum, &mut array)?,
                _ => {}
            },
            Event::Empty(ref e) if e.name().as_ref() == b"cvParam" => {
                apply_cv_param(e, accessions, &mut spectrum, &mut array)?
            }
            Event::Text(ref t) if in_binary => {
                if let Some(a) = array.as_mut() {
                    a.text.push_str(t.unescape()?.trim());
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"binary" => in_binary = false,
                b"binaryDataArray" => {
                    if let (Some(a), Some(s)) = (array.take(), spectrum.as_mut()) {
                        let values = decode_binary(&a)?;
                        match a.kind {
                            Some(MZ_ARRAY) => s.mz = values,
                            Some(INTENSITY_ARRAY) => s.intensity = values,
                            _ => {}
                        }
                    }
                }
                b"spectrum" => {
                    if let Some(s) = spectrum.take() {
                        flush_spectrum(s, &mut out)?;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let channels: BTreeMap<Channel, Dataset> = Channel::ALL
        .into_iter()
        .map(|c| Ok((c, out.remove(&c).unwrap_or_default().into_dataset()?)))
        .collect::<Result<_, MzMLError>>()?;
    for (channel, ds) in &channels {
        log::debug!("mzML {channel}: {} rows", ds.len());
    }
    Ok(channels)
}

fn apply_cv_param(
    e: &BytesStart,
    accessions: &Accessions,
    spectrum: &mut Option<SpectrumState>,
    array: &mut Option<ArrayState>,
) -> Result<(), MzMLError> {
    let accession = attribute(e, "accession")?.unwrap_or_default();

    if let Some(a) = array.as_mut() {
        match accession.as_str() {
            FLOAT32 => a.float32 = true,
            FLOAT64 => a.float32 = false,
            ZLIB => a.zlib = true,
            NO_COMPRESSION => a.zlib = false,
            MZ_ARRAY => a.kind = Some(MZ_ARRAY),
            INTENSITY_ARRAY => a.kind = Some(INTENSITY_ARRAY),
            other if other.starts_with("MS:100231") || other.starts_with("MS:100274") => {
                return Err(MzMLError::UnsupportedCompression(other.to_string()));
            }
            _ => {}
        }
        return Ok(());
    }

    let Some(s) = spectrum.as_mut() else {
        return Ok(());
    };
    let value = || -> Result<Option<f64>, MzMLError> {
        Ok(attribute(e, "value")?.and_then(|v| v.trim().parse().ok()))
    };
    if accession == MS_LEVEL {
        s.ms_level = value()?.map(|v| v as u8);
    } else if accession == accessions.retention_time {
        s.retention_time = value()?.unwrap_or(f64::NAN);
    } else if accession == accessions.drift_time {
        s.drift_time = value()?.unwrap_or(f64::NAN);
    }
    Ok(())
}

fn flush_spectrum(
    s: SpectrumState,
    out: &mut HashMap<Channel, ChannelColumns>,
) -> Result<(), MzMLError> {
    let Some(channel) = s.ms_level.and_then(Channel::from_ms_level) else {
        return Ok(());
    };
    if s.mz.len() != s.intensity.len() {
        return Err(MzMLError::InvalidStructure(format!(
            "m/z array has {} values but intensity array has {}",
            s.mz.len(),
            s.intensity.len()
        )));
    }
    let n = s.mz.len();
    let cols = out.entry(channel).or_default();
    cols.mz.extend(s.mz);
    cols.intensity.extend(s.intensity);
    cols.retention_time.extend(std::iter::repeat(s.retention_time).take(n));
    cols.drift_time.extend(std::iter::repeat(s.drift_time).take(n));
    Ok(())
}

fn decode_binary(a: &ArrayState) -> Result<Vec<f64>, MzMLError> {
    if a.text.is_empty() {
        return Ok(Vec::new());
    }
    let raw = BASE64_STANDARD.decode(a.text.as_bytes())?;
    let bytes = if a.zlib {
        let mut out = Vec::new();
        ZlibDecoder::new(&raw[..]).read_to_end(&mut out)?;
        out
    } else {
        raw
    };

    let width = if a.float32 { 4 } else { 8 };
    if bytes.len() % width != 0 {
        return Err(MzMLError::InvalidStructure(format!(
            "binary array of {} bytes is not a multiple of {width}",
            bytes.len()
        )));
    }
    let mut cursor = Cursor::new(&bytes);
    (0..bytes.len() / width)
        .map(|_| -> Result<f64, MzMLError> {
            Ok(if a.float32 {
                cursor.read_f32::<LittleEndian>()? as f64
            } else {
                cursor.read_f64::<LittleEndian>()?
            })
        })
        .collect()
}

fn attribute(e: &BytesStart, name: &str) -> Result<Option<String>, MzMLError> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == name.as_bytes() {
            return Ok(Some(std::str::from_utf8(&attr.value)?.to_string()));
        }
    }
    Ok(None)
}
