//! Test doubles shared by the unit tests.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;

use crate::data::model::{Channel, Dataset, Features, WriteMode};
use crate::data::mzml::Accessions;
use crate::error::Result;
use crate::processing::{Factors, NativeProcessor, Radius, SpatialIndex, SpectralProcessor};

/// Delegates to [`NativeProcessor`] and records every call in order.
#[derive(Debug, Default)]
pub struct RecordingProcessor {
    inner: NativeProcessor,
    calls: RefCell<Vec<String>>,
}

impl RecordingProcessor {
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl SpectralProcessor for RecordingProcessor {
    fn accessions(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        self.record("accessions".into());
        self.inner.accessions(path)
    }

    fn convert(&self, path: &Path, accessions: &Accessions) -> Result<BTreeMap<Channel, Dataset>> {
        self.record("convert".into());
        self.inner.convert(path, accessions)
    }

    fn load(&self, path: &Path, key: &str, columns: Option<&[String]>) -> Result<Dataset> {
        self.record(format!("load {key}"));
        self.inner.load(path, key, columns)
    }

    fn save(&self, path: &Path, key: &str, data: &Dataset, mode: WriteMode) -> Result<()> {
        self.record(format!("save {key} {mode:?}"));
        self.inner.save(path, key, data, mode)
    }

    fn build_factors(&self, data: &Dataset, dims: Option<&[String]>) -> Result<Factors> {
        self.record("factors".into());
        self.inner.build_factors(data, dims)
    }

    fn build_index(&self, data: &Dataset, factors: &Factors) -> SpatialIndex {
        self.record(format!("index {}", data.len()));
        self.inner.build_index(data, factors)
    }

    fn threshold(&self, data: &Dataset, by: &str, value: f64) -> Result<Dataset> {
        self.record(format!("threshold {by} {value}"));
        self.inner.threshold(data, by, value)
    }

    fn smooth(
        &self,
        data: &Dataset,
        index: &SpatialIndex,
        features: &Features,
        radius: &Radius,
        iterations: usize,
    ) -> Result<Dataset> {
        self.record(format!("smooth {radius} {iterations}"));
        self.inner.smooth(data, index, features, radius, iterations)
    }

    fn detect_peaks(
        &self,
        data: &Dataset,
        index: Option<&SpatialIndex>,
        features: &Features,
        radius: Option<&Radius>,
    ) -> Result<Dataset> {
        let radius_label = radius.map_or_else(|| "default".to_string(), Radius::to_string);
        let index_label = if index.is_some() { "indexed" } else { "unindexed" };
        self.record(format!("peaks {index_label} {radius_label}"));
        self.inner.detect_peaks(data, index, features, radius)
    }
}
