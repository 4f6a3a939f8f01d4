//! Numerical processing behind the pipeline.
//!
//! The pipeline never touches numbers directly: it drives a
//! [`SpectralProcessor`]. [`NativeProcessor`] is the implementation used by
//! the dashboard; tests substitute their own.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::data::container;
use crate::data::model::{Channel, Dataset, Features, WriteMode};
use crate::data::mzml::{self, Accessions};
use crate::error::{PipelineError, Result};

/// Columns never treated as dimensions when factors are auto-detected.
/// Callers with a renamed intensity column pass their dimensions explicitly.
pub const NON_DIMENSION_COLUMNS: [&str; 2] = ["intensity", "persistence"];

/// Name of the score column added by peak detection.
pub const PERSISTENCE_COLUMN: &str = "persistence";

// ---------------------------------------------------------------------------
// Radius – per-dimension connectivity
// ---------------------------------------------------------------------------

/// Per-dimension neighbourhood radius in index units. A value `<= 0` means
/// no connectivity along that dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Radius(pub Vec<i64>);

impl Radius {
    /// Radius used when none is given.
    pub fn unit(dims: usize) -> Self {
        Radius(vec![1; dims])
    }

    /// Expand to one value per dimension. A single value is broadcast.
    fn per_dim(&self, dims: usize) -> Result<Vec<i64>> {
        match self.0.len() {
            1 => Ok(vec![self.0[0].max(0); dims]),
            n if n == dims => Ok(self.0.iter().map(|r| (*r).max(0)).collect()),
            n => Err(PipelineError::InvalidRadius {
                input: self.to_string(),
                reason: format!("{n} values given for {dims} dimensions"),
            }),
        }
    }
}

impl fmt::Display for Radius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(i64::to_string).collect();
        f.write_str(&parts.join("-"))
    }
}

/// Parses `-`-joined integers. A `-` at the start of the string or right
/// after a separator is a sign: `"-1-1"` is `[-1, 1]`, `"2--1"` is `[2, -1]`.
impl FromStr for Radius {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| PipelineError::InvalidRadius {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let mut rest = s.trim();
        if rest.is_empty() {
            return Err(invalid("empty"));
        }
        let mut values = Vec::new();
        loop {
            let (negative, body) = match rest.strip_prefix('-') {
                Some(body) => (true, body),
                None => (false, rest),
            };
            let end = body.find('-').unwrap_or(body.len());
            let digits = &body[..end];
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("expected integers joined by '-'"));
            }
            let magnitude: i64 = digits.parse().map_err(|_| invalid("value out of range"))?;
            values.push(if negative { -magnitude } else { magnitude });

            if end == body.len() {
                break;
            }
            rest = &body[end + 1..];
            if rest.is_empty() {
                return Err(invalid("trailing separator"));
            }
        }
        Ok(Radius(values))
    }
}

// ---------------------------------------------------------------------------
// Factors / SpatialIndex
// ---------------------------------------------------------------------------

/// Sorted unique values of each dimension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Factors {
    dims: BTreeMap<String, Vec<f64>>,
}

impl Factors {
    pub fn get(&self, dim: &str) -> Option<&[f64]> {
        self.dims.get(dim).map(Vec::as_slice)
    }

    pub fn dims(&self) -> impl Iterator<Item = &str> {
        self.dims.keys().map(String::as_str)
    }
}

/// Maps dimension values to integer grid positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpatialIndex {
    factors: Factors,
    rows: usize,
}

impl SpatialIndex {
    /// Number of rows of the dataset the index was built over.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn factors(&self) -> &Factors {
        &self.factors
    }

    /// Position of `value` among the factor values of `dim`; values that
    /// were never seen map to their insertion point.
    pub fn position(&self, dim: &str, value: f64) -> Option<i64> {
        let values = self.factors.get(dim)?;
        Some(values.partition_point(|&f| f < value) as i64)
    }

    /// Grid coordinates of every row of `data` over `dims`.
    fn coordinates<S: AsRef<str>>(&self, data: &Dataset, dims: &[S]) -> Result<Vec<Vec<i64>>> {
        let mut coords = vec![Vec::with_capacity(dims.len()); data.len()];
        for dim in dims {
            let dim = dim.as_ref();
            let values = data.require(dim)?;
            let factor = self
                .factors
                .get(dim)
                .ok_or_else(|| PipelineError::MissingColumn(dim.to_string()))?;
            for (row, value) in coords.iter_mut().zip(values) {
                row.push(factor.partition_point(|f| f < value) as i64);
            }
        }
        Ok(coords)
    }
}

// ---------------------------------------------------------------------------
// SpectralProcessor
// ---------------------------------------------------------------------------

/// Storage and numerical operations the pipeline is built from.
pub trait SpectralProcessor {
    /// cvParam name to accession map of a raw file.
    fn accessions(&self, path: &Path) -> Result<BTreeMap<String, String>>;

    /// Read a raw instrument file into its channels.
    fn convert(&self, path: &Path, accessions: &Accessions) -> Result<BTreeMap<Channel, Dataset>>;

    /// Read one section of a container file.
    fn load(&self, path: &Path, key: &str, columns: Option<&[String]>) -> Result<Dataset>;

    /// Write one section of a container file.
    fn save(&self, path: &Path, key: &str, data: &Dataset, mode: WriteMode) -> Result<()>;

    /// Factors over `dims`, or over every column outside
    /// [`NON_DIMENSION_COLUMNS`] when `None`.
    fn build_factors(&self, data: &Dataset, dims: Option<&[String]>) -> Result<Factors>;

    fn build_index(&self, data: &Dataset, factors: &Factors) -> SpatialIndex;

    /// Rows with `by >= value`.
    fn threshold(&self, data: &Dataset, by: &str, value: f64) -> Result<Dataset>;

    fn smooth(
        &self,
        data: &Dataset,
        index: &SpatialIndex,
        features: &Features,
        radius: &Radius,
        iterations: usize,
    ) -> Result<Dataset>;

    /// Peak rows with an added `persistence` column. Without an index one
    /// is built from `data`; without a radius, 1 is used on every dimension.
    fn detect_peaks(
        &self,
        data: &Dataset,
        index: Option<&SpatialIndex>,
        features: &Features,
        radius: Option<&Radius>,
    ) -> Result<Dataset>;
}

/// Processor backed by this crate's mzML reader, container format, sparse
/// mean filter and persistent-homology peak picker.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProcessor;

impl SpectralProcessor for NativeProcessor {
    fn accessions(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        Ok(mzml::get_accessions(path)?)
    }

    fn convert(&self, path: &Path, accessions: &Accessions) -> Result<BTreeMap<Channel, Dataset>> {
        Ok(mzml::read_channels(path, accessions)?)
    }

    fn load(&self, path: &Path, key: &str, columns: Option<&[String]>) -> Result<Dataset> {
        container::read_section(path, key, columns)
    }

    fn save(&self, path: &Path, key: &str, data: &Dataset, mode: WriteMode) -> Result<()> {
        container::write_section(path, key, data, mode)
    }

    fn build_factors(&self, data: &Dataset, dims: Option<&[String]>) -> Result<Factors> {
        let names: Vec<String> = match dims {
            Some(dims) => dims.to_vec(),
            None => data
                .column_names()
                .iter()
                .filter(|n| !NON_DIMENSION_COLUMNS.contains(&n.as_str()))
                .cloned()
                .collect(),
        };
        let mut factors = Factors::default();
        for name in names {
            let mut values = data.require(&name)?.to_vec();
            values.sort_by(f64::total_cmp);
            values.dedup();
            factors.dims.insert(name, values);
        }
        Ok(factors)
    }

    fn build_index(&self, data: &Dataset, factors: &Factors) -> SpatialIndex {
        SpatialIndex {
            factors: factors.clone(),
            rows: data.len(),
        }
    }

    fn threshold(&self, data: &Dataset, by: &str, value: f64) -> Result<Dataset> {
        let column = data.require(by)?;
        Ok(data.filter(|i| column[i] >= value))
    }

    fn smooth(
        &self,
        data: &Dataset,
        index: &SpatialIndex,
        features: &Features,
        radius: &Radius,
        iterations: usize,
    ) -> Result<Dataset> {
        let dims = features.dims();
        let neighbours = neighbour_lists(&index.coordinates(data, &dims)?, &radius.per_dim(dims.len())?);

        let mut current = data.require(&features.intensity)?.to_vec();
        for iteration in 0..iterations {
            let next: Vec<f64> = neighbours
                .iter()
                .map(|nbrs| nbrs.iter().map(|&j| current[j]).sum::<f64>() / nbrs.len() as f64)
                .collect();
            let converged = next == current;
            current = next;
            if converged {
                log::debug!("smoothing converged after {} iterations", iteration + 1);
                break;
            }
        }

        let mut out = data.clone();
        out.push_column(features.intensity.clone(), current)?;
        Ok(out)
    }

    fn detect_peaks(
        &self,
        data: &Dataset,
        index: Option<&SpatialIndex>,
        features: &Features,
        radius: Option<&Radius>,
    ) -> Result<Dataset> {
        let dims = features.dims();
        let built;
        let index = match index {
            Some(index) => index,
            None => {
                built = self.build_index(data, &self.build_factors(data, Some(dims.as_slice()))?);
                &built
            }
        };
        let radius = match radius {
            Some(r) => r.per_dim(dims.len())?,
            None => Radius::unit(dims.len()).per_dim(dims.len())?,
        };

        let neighbours = neighbour_lists(&index.coordinates(data, &dims)?, &radius);
        let intensity = data.require(&features.intensity)?;
        let (rows, persistence) = persistent_homology(intensity, &neighbours);

        let mut peaks = data.take(&rows);
        peaks.push_column(PERSISTENCE_COLUMN, persistence)?;
        Ok(peaks)
    }
}

/// For every row, the rows whose coordinates are within `radius` on every
/// dimension (the row itself included).
///
/// Each radius is first clamped to the extent of the occupied grid on its
/// axis. Neighbours are then found by enumerating offset vectors when there
/// are fewer of them than occupied cells, and by scanning the occupied cells
/// otherwise, so the cost never exceeds what the data itself can hold.
fn neighbour_lists(coords: &[Vec<i64>], radius: &[i64]) -> Vec<Vec<usize>> {
    let mut cells: HashMap<&[i64], Vec<usize>> = HashMap::new();
    for (row, c) in coords.iter().enumerate() {
        cells.entry(c.as_slice()).or_default().push(row);
    }

    let radius: Vec<i64> = radius
        .iter()
        .enumerate()
        .map(|(axis, &r)| {
            let (lo, hi) = coords
                .iter()
                .fold((i64::MAX, i64::MIN), |(lo, hi), c| (lo.min(c[axis]), hi.max(c[axis])));
            r.min(hi.saturating_sub(lo).max(0))
        })
        .collect();

    let offset_count = radius
        .iter()
        .try_fold(1usize, |acc, &r| acc.checked_mul(2 * r as usize + 1));
    match offset_count {
        Some(n) if n <= cells.len() => by_offsets(coords, &cells, &radius),
        _ => by_occupied_cells(coords, &cells, &radius),
    }
}

fn by_offsets(
    coords: &[Vec<i64>],
    cells: &HashMap<&[i64], Vec<usize>>,
    radius: &[i64],
) -> Vec<Vec<usize>> {
    let mut offsets: Vec<Vec<i64>> = vec![Vec::new()];
    for &r in radius {
        offsets = offsets
            .into_iter()
            .flat_map(|prefix| {
                (-r..=r).map(move |d| {
                    let mut o = prefix.clone();
                    o.push(d);
                    o
                })
            })
            .collect();
    }

    let mut key = vec![0i64; radius.len()];
    coords
        .iter()
        .map(|c| {
            let mut nbrs = Vec::new();
            for offset in &offsets {
                for (k, (ci, oi)) in key.iter_mut().zip(c.iter().zip(offset)) {
                    *k = ci + oi;
                }
                if let Some(rows) = cells.get(key.as_slice()) {
                    nbrs.extend_from_slice(rows);
                }
            }
            nbrs
        })
        .collect()
}

fn by_occupied_cells(
    coords: &[Vec<i64>],
    cells: &HashMap<&[i64], Vec<usize>>,
    radius: &[i64],
) -> Vec<Vec<usize>> {
    // Sorted so the first axis can be range-searched.
    let mut occupied: Vec<(&[i64], &Vec<usize>)> = cells.iter().map(|(k, v)| (*k, v)).collect();
    occupied.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let within = |a: &[i64], b: &[i64]| {
        a.iter()
            .zip(b)
            .zip(radius)
            .all(|((x, y), r)| (x - y).abs() <= *r)
    };

    let mut memo: HashMap<&[i64], Vec<usize>> = HashMap::with_capacity(occupied.len());
    coords
        .iter()
        .map(|c| {
            memo.entry(c.as_slice())
                .or_insert_with(|| {
                    let candidates = match (c.first(), radius.first()) {
                        (Some(&c0), Some(&r0)) => {
                            let lo = occupied.partition_point(|(k, _)| k[0] < c0 - r0);
                            let hi = occupied.partition_point(|(k, _)| k[0] <= c0 + r0);
                            &occupied[lo..hi]
                        }
                        _ => &occupied[..],
                    };
                    candidates
                        .iter()
                        .filter(|(k, _)| within(c.as_slice(), *k))
                        .flat_map(|(_, rows)| rows.iter().copied())
                        .collect()
                })
                .clone()
        })
        .collect()
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// 0-dimensional persistent homology of the superlevel sets of
/// `intensity` over the neighbour graph.
///
/// Returns the birth rows of all components (ascending row order) and
/// their persistence. A component dies when it merges into one born
/// higher; components that never die get their birth intensity.
fn persistent_homology(intensity: &[f64], neighbours: &[Vec<usize>]) -> (Vec<usize>, Vec<f64>) {
    let n = intensity.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| intensity[b].total_cmp(&intensity[a]).then(a.cmp(&b)));

    let mut parent: Vec<usize> = (0..n).collect();
    let mut visited = vec![false; n];
    let mut death: Vec<Option<f64>> = vec![None; n];
    let mut births = Vec::new();

    for &i in &order {
        visited[i] = true;
        let mut roots: Vec<usize> = neighbours[i]
            .iter()
            .filter(|&&j| j != i && visited[j])
            .map(|&j| find(&mut parent, j))
            .collect();
        roots.sort_unstable();
        roots.dedup();

        let Some(&survivor) = roots
            .iter()
            .max_by(|&&a, &&b| intensity[a].total_cmp(&intensity[b]).then(b.cmp(&a)))
        else {
            births.push(i);
            continue;
        };

        parent[i] = survivor;
        for r in roots.into_iter().filter(|&r| r != survivor) {
            death[r] = Some(intensity[i]);
            parent[r] = survivor;
        }
    }

    births.sort_unstable();
    let persistence = births
        .iter()
        .map(|&b| intensity[b] - death[b].unwrap_or(0.0))
        .collect();
    (births, persistence)
}
