use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Channel – ms1 / ms2 acquisition level
// ---------------------------------------------------------------------------

/// Acquisition channel of a run. Each channel is processed independently
/// and persisted as its own section of a container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Ms1,
    Ms2,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Ms1, Channel::Ms2];

    /// Section key used inside container files.
    pub fn key(&self) -> &'static str {
        match self {
            Channel::Ms1 => "ms1",
            Channel::Ms2 => "ms2",
        }
    }

    /// Map an mzML `ms level` value to a channel. Levels above 2 are
    /// folded into ms2.
    pub fn from_ms_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Channel::Ms1),
            0 => None,
            _ => Some(Channel::Ms2),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ---------------------------------------------------------------------------
// WriteMode – how a section lands in a container
// ---------------------------------------------------------------------------

/// `Overwrite` starts a fresh container, `Append` keeps the other sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Overwrite,
    Append,
}

// ---------------------------------------------------------------------------
// Features – which column means what
// ---------------------------------------------------------------------------

/// Caller-supplied names of the four feature columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub mz: String,
    pub drift_time: String,
    pub retention_time: String,
    pub intensity: String,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            mz: "mz".into(),
            drift_time: "drift_time".into(),
            retention_time: "retention_time".into(),
            intensity: "intensity".into(),
        }
    }
}

impl Features {
    /// Column order used when reading raw channels: `[mz, dt, rt, intensity]`.
    pub fn load_columns(&self) -> Vec<String> {
        vec![
            self.mz.clone(),
            self.drift_time.clone(),
            self.retention_time.clone(),
            self.intensity.clone(),
        ]
    }

    /// Canonical projection order: `[dt, rt, mz, intensity]`.
    pub fn projected_columns(&self) -> Vec<String> {
        vec![
            self.drift_time.clone(),
            self.retention_time.clone(),
            self.mz.clone(),
            self.intensity.clone(),
        ]
    }

    /// Dimensions smoothed and peak-picked over: `[mz, dt, rt]`.
    pub fn dims(&self) -> Vec<String> {
        vec![
            self.mz.clone(),
            self.drift_time.clone(),
            self.retention_time.clone(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Dataset – a column-oriented table of f64 observations
// ---------------------------------------------------------------------------

/// A table of spectral observations. Every column has the same length and
/// rows are always addressed densely from 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset from `(name, values)` pairs.
    pub fn from_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        let mut ds = Dataset::new();
        for (name, values) in columns {
            ds.push_column(name, values)?;
        }
        Ok(ds)
    }

    /// Append a column, replacing any existing column of the same name.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if !self.names.is_empty() && values.len() != self.len() {
            return Err(PipelineError::LengthMismatch {
                column: name,
                expected: self.len(),
                actual: values.len(),
            });
        }
        match self.position(&name) {
            Some(i) => self.columns[i] = values,
            None => {
                self.names.push(name);
                self.columns.push(values);
            }
        }
        Ok(())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.position(name).map(|i| self.columns[i].as_slice())
    }

    /// Like [`Dataset::column`] but failing with `MissingColumn`.
    pub fn require(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Vec<f64>> {
        self.position(name).map(move |i| &mut self.columns[i])
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter().map(Vec::as_slice))
    }

    /// Values of one row in column order.
    pub fn row(&self, index: usize) -> Option<Vec<f64>> {
        (index < self.len()).then(|| self.columns.iter().map(|c| c[index]).collect())
    }

    /// Project onto `names`, in that order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Dataset> {
        let mut out = Dataset::new();
        for name in names {
            let name = name.as_ref();
            out.push_column(name, self.require(name)?.to_vec())?;
        }
        Ok(out)
    }

    /// Keep the rows at `indices`, in that order.
    pub fn take(&self, indices: &[usize]) -> Dataset {
        Dataset {
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| indices.iter().map(|&i| c[i]).collect())
                .collect(),
        }
    }

    /// Keep the rows for which `keep(row_index)` holds.
    pub fn filter<F: FnMut(usize) -> bool>(&self, mut keep: F) -> Dataset {
        let indices: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        self.take(&indices)
    }

    /// Stable sort by `name`, largest first. NaN sorts last.
    pub fn sort_by_desc(&self, name: &str) -> Result<Dataset> {
        let key = self.require(name)?;
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| match (key[a].is_nan(), key[b].is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => key[b].total_cmp(&key[a]),
        });
        Ok(self.take(&order))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}
