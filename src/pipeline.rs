//! The load -> smooth -> peak-detect -> align pipeline.
//!
//! Every stage is synchronous and runs to completion. Outputs are named
//! container files that are never overwritten: the existence check happens
//! before any work and is not atomic with the write that follows. Each
//! stage writes ms1 with [`WriteMode::Overwrite`] and then ms2 with
//! [`WriteMode::Append`]; if the second write fails the container is left
//! holding ms1 only.

use std::path::{Path, PathBuf};

use crate::data::loader::{self, AccessionNames};
use crate::data::model::{Channel, Dataset, Features, WriteMode};
use crate::error::{PipelineError, Result};
use crate::notify::NotificationSink;
use crate::processing::{Radius, SpatialIndex, SpectralProcessor, PERSISTENCE_COLUMN};

/// Intensity floor applied before smoothing and peak picking.
pub const INTENSITY_FLOOR: f64 = 128.0;

/// Persistence and intensity cutoff of the alignment reference.
pub const REFERENCE_CUTOFF: f64 = 1000.0;

/// Input paths the dashboard starts with before the user picks a file.
pub const PLACEHOLDER_PATHS: [&str; 2] = ["data/placeholder.csv", "data/created_data/placeholder.csv"];

/// Parse a `-`-joined radius descriptor such as `"2-1-0"`.
pub fn parse_radius(descriptor: &str) -> Result<Radius> {
    descriptor.parse()
}

fn ensure_absent(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(PipelineError::OutputExists {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Smoothed ms1 data plus the indices built for both channels. The ms2
/// smoothed data is only persisted.
#[derive(Debug, Clone)]
pub struct SmoothOutput {
    pub ms1: Dataset,
    pub ms1_index: SpatialIndex,
    pub ms2_index: SpatialIndex,
}

/// Orchestrates a [`SpectralProcessor`] and reports progress to a
/// [`NotificationSink`].
pub struct Pipeline<P, N> {
    processor: P,
    notifier: N,
}

impl<P: SpectralProcessor, N: NotificationSink> Pipeline<P, N> {
    pub fn new(processor: P, notifier: N) -> Self {
        Self {
            processor,
            notifier,
        }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Load one channel and project it to `[dt, rt, mz, intensity]`.
    ///
    /// Fails with [`PipelineError::MissingSelection`] while the input is
    /// still one of the [`PLACEHOLDER_PATHS`].
    pub fn load_initial_data(
        &self,
        path: &Path,
        features: &Features,
        accession_names: &AccessionNames,
        converted: Option<&Path>,
        key: Channel,
    ) -> Result<Dataset> {
        if PLACEHOLDER_PATHS.iter().any(|p| path == Path::new(p)) {
            return Err(PipelineError::MissingSelection);
        }
        let data = loader::load_mz_h5(
            &self.processor,
            &self.notifier,
            path,
            key,
            &features.load_columns(),
            accession_names,
            converted,
        )?;
        data.select(&features.projected_columns())
    }

    /// Smooth both channels of `raw` and persist them to `output`.
    ///
    /// Raw instrument input is converted to `converted`, or to the default
    /// cache location when `None`.
    #[allow(clippy::too_many_arguments)]
    pub fn create_smooth(
        &self,
        raw: &Path,
        features: &Features,
        radius: &str,
        iterations: usize,
        output: &Path,
        accession_names: &AccessionNames,
        converted: Option<&Path>,
    ) -> Result<SmoothOutput> {
        ensure_absent(output)?;
        let radius = parse_radius(radius)?;
        let converted = converted
            .map(Path::to_path_buf)
            .or_else(|| loader::converted_path_for(raw));
        log::info!(
            "smoothing {} -> {} (radius {radius}, {iterations} iterations)",
            raw.display(),
            output.display()
        );

        let (ms1, ms1_index) = self.smooth_channel(
            raw,
            Channel::Ms1,
            features,
            &radius,
            iterations,
            accession_names,
            converted.as_deref(),
        )?;
        self.processor
            .save(output, Channel::Ms1.key(), &ms1, WriteMode::Overwrite)?;

        let (ms2, ms2_index) = self.smooth_channel(
            raw,
            Channel::Ms2,
            features,
            &radius,
            iterations,
            accession_names,
            converted.as_deref(),
        )?;
        self.processor
            .save(output, Channel::Ms2.key(), &ms2, WriteMode::Append)?;

        Ok(SmoothOutput {
            ms1,
            ms1_index,
            ms2_index,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn smooth_channel(
        &self,
        raw: &Path,
        channel: Channel,
        features: &Features,
        radius: &Radius,
        iterations: usize,
        accession_names: &AccessionNames,
        converted: Option<&Path>,
    ) -> Result<(Dataset, SpatialIndex)> {
        let data = loader::load_mz_h5(
            &self.processor,
            &self.notifier,
            raw,
            channel,
            &features.load_columns(),
            accession_names,
            converted,
        )?;
        let factors = self.processor.build_factors(&data, Some(features.dims().as_slice()))?;
        let data = self
            .processor
            .threshold(&data, &features.intensity, INTENSITY_FLOOR)?;
        let index = self.processor.build_index(&data, &factors);

        self.notifier
            .info(&format!("Smooth {} data", channel.key().to_uppercase()));
        let smoothed = self
            .processor
            .smooth(&data, &index, features, radius, iterations)?;
        log::debug!("{channel}: smoothed {} rows", smoothed.len());
        Ok((smoothed, index))
    }

    /// Detect peaks in both channels of a smoothed container and persist
    /// them to `output`. Returns the ms1 peaks, sorted by descending
    /// persistence.
    #[allow(clippy::too_many_arguments)]
    pub fn create_peak(
        &self,
        smooth: &Path,
        features: &Features,
        threshold: f64,
        radius: &str,
        ms1_index: &SpatialIndex,
        ms2_index: &SpatialIndex,
        output: &Path,
        accession_names: &AccessionNames,
    ) -> Result<Dataset> {
        ensure_absent(output)?;
        let radius = parse_radius(radius)?;
        log::info!(
            "peak picking {} -> {} (radius {radius}, threshold {threshold})",
            smooth.display(),
            output.display()
        );

        let ms1 = self.peak_channel(
            smooth,
            Channel::Ms1,
            features,
            threshold,
            &radius,
            ms1_index,
            accession_names,
        )?;
        self.processor
            .save(output, Channel::Ms1.key(), &ms1, WriteMode::Overwrite)?;

        let ms2 = self.peak_channel(
            smooth,
            Channel::Ms2,
            features,
            threshold,
            &radius,
            ms2_index,
            accession_names,
        )?;
        self.processor
            .save(output, Channel::Ms2.key(), &ms2, WriteMode::Append)?;

        Ok(ms1)
    }

    #[allow(clippy::too_many_arguments)]
    fn peak_channel(
        &self,
        smooth: &Path,
        channel: Channel,
        features: &Features,
        threshold: f64,
        radius: &Radius,
        index: &SpatialIndex,
        accession_names: &AccessionNames,
    ) -> Result<Dataset> {
        let data = loader::load_mz_h5(
            &self.processor,
            &self.notifier,
            smooth,
            channel,
            &features.load_columns(),
            accession_names,
            loader::converted_path_for(smooth).as_deref(),
        )?;
        let data = self
            .processor
            .threshold(&data, &features.intensity, INTENSITY_FLOOR)?;
        let peaks = self
            .processor
            .detect_peaks(&data, Some(index), features, Some(radius))?
            .sort_by_desc(PERSISTENCE_COLUMN)?;
        let peaks = self
            .processor
            .threshold(&peaks, PERSISTENCE_COLUMN, threshold)?;
        let peaks = self
            .processor
            .threshold(&peaks, &features.intensity, threshold)?;
        log::debug!("{channel}: {} peaks after thresholding", peaks.len());
        Ok(peaks)
    }

    /// Reference peaks for alignment: full-resolution peak picking with the
    /// processor defaults, keeping persistence and intensity of at least
    /// [`REFERENCE_CUTOFF`]. No I/O.
    pub fn align_peak_create(&self, data: &Dataset, features: &Features) -> Result<Dataset> {
        let data = self
            .processor
            .threshold(data, &features.intensity, INTENSITY_FLOOR)?;
        let peaks = self.processor.detect_peaks(&data, None, features, None)?;
        let peaks = self
            .processor
            .threshold(&peaks, PERSISTENCE_COLUMN, REFERENCE_CUTOFF)?;
        self.processor
            .threshold(&peaks, &features.intensity, REFERENCE_CUTOFF)
    }
}

/// Default output name for a stage: `<dir>/<stem>_<suffix>.h5`.
pub fn derived_output_name(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = stem.strip_suffix(".mzML").unwrap_or(&stem);
    input.with_file_name(format!("{stem}_{suffix}.h5"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::container;
    use crate::notify::NotificationCenter;
    use crate::testing::RecordingProcessor;

    fn pipeline() -> Pipeline<RecordingProcessor, NotificationCenter> {
        Pipeline::new(RecordingProcessor::default(), NotificationCenter::default())
    }

    /// Gaussian blobs on an integer grid, intensities well above the floor.
    fn blobs(centres: &[(f64, f64, f64, f64)]) -> Dataset {
        let (mut mz, mut dt, mut rt, mut intensity) = (vec![], vec![], vec![], vec![]);
        for m in 0..12 {
            for d in 0..8 {
                let value: f64 = centres
                    .iter()
                    .map(|&(cm, cd, _, height)| {
                        let r2 = (m as f64 - cm).powi(2) + (d as f64 - cd).powi(2);
                        height * (-r2 / 4.0).exp()
                    })
                    .sum();
                mz.push(100.0 + m as f64);
                dt.push(10.0 + d as f64);
                rt.push(centres.first().map_or(1.0, |c| c.2));
                intensity.push(value.round());
            }
        }
        Dataset::from_columns([
            ("mz", mz),
            ("drift_time", dt),
            ("retention_time", rt),
            ("intensity", intensity),
        ])
        .unwrap()
    }

    fn write_raw(dir: &Path) -> PathBuf {
        let path = dir.join("raw.h5");
        let ms1 = blobs(&[(3.0, 2.0, 1.0, 50_000.0), (8.0, 5.0, 1.0, 20_000.0)]);
        let ms2 = blobs(&[(5.0, 4.0, 1.0, 9_000.0)]);
        container::write_section(&path, "ms1", &ms1, WriteMode::Overwrite).unwrap();
        container::write_section(&path, "ms2", &ms2, WriteMode::Append).unwrap();
        path
    }

    #[test]
    fn radius_descriptors() {
        assert_eq!(parse_radius("2-1-0").unwrap().0, [2, 1, 0]);
        assert_eq!(parse_radius("-1-1").unwrap().0, [-1, 1]);
        assert!(matches!(
            parse_radius("2,1"),
            Err(PipelineError::InvalidRadius { .. })
        ));
    }

    #[test]
    fn placeholder_input_is_rejected() {
        let p = pipeline();
        for placeholder in PLACEHOLDER_PATHS {
            let err = p
                .load_initial_data(
                    Path::new(placeholder),
                    &Features::default(),
                    &AccessionNames::default(),
                    None,
                    Channel::Ms1,
                )
                .unwrap_err();
            assert!(matches!(err, PipelineError::MissingSelection));
        }
        assert!(p.processor().calls().is_empty());
    }

    #[test]
    fn projection_has_fixed_column_order_and_dense_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two_rows.csv");
        std::fs::write(
            &path,
            "intensity,extra,mz,retention_time,drift_time\n10,0,100,1.0,20\n30,0,200,2.0,21\n",
        )
        .unwrap();

        let ds = pipeline()
            .load_initial_data(
                &path,
                &Features::default(),
                &AccessionNames::default(),
                None,
                Channel::Ms1,
            )
            .unwrap();
        assert_eq!(
            ds.column_names(),
            ["drift_time", "retention_time", "mz", "intensity"]
        );
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.row(0).unwrap(), vec![20.0, 1.0, 100.0, 10.0]);
        assert_eq!(ds.row(1).unwrap(), vec![21.0, 2.0, 200.0, 30.0]);
    }

    #[test]
    fn existing_outputs_are_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("taken.h5");
        std::fs::write(&taken, b"keep me").unwrap();
        let p = pipeline();

        // Inputs are deliberately invalid: the existence check comes first.
        let err = p
            .create_smooth(
                Path::new("missing.txt"),
                &Features::default(),
                "not a radius",
                3,
                &taken,
                &AccessionNames::default(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::OutputExists { ref path } if path == &taken));

        let err = p
            .create_peak(
                Path::new("missing.txt"),
                &Features::default(),
                1000.0,
                "",
                &SpatialIndex::default(),
                &SpatialIndex::default(),
                &taken,
                &AccessionNames::default(),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::OutputExists { .. }));
        assert_eq!(std::fs::read(&taken).unwrap(), b"keep me");
        assert!(p.processor().calls().is_empty());
    }

    #[test]
    fn smoothing_persists_both_channels_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let raw = write_raw(dir.path());
        let smooth_path = dir.path().join("raw_smooth.h5");
        let p = pipeline();

        let out = p
            .create_smooth(
                &raw,
                &Features::default(),
                "1-1-0",
                2,
                &smooth_path,
                &AccessionNames::default(),
                None,
            )
            .unwrap();

        let calls = p.processor().calls();
        let saves: Vec<&String> = calls.iter().filter(|c| c.starts_with("save")).collect();
        assert_eq!(saves, ["save ms1 Overwrite", "save ms2 Append"]);
        assert!(calls.contains(&format!("threshold intensity {INTENSITY_FLOOR}")));
        assert!(calls.contains(&"smooth 1-1-0 2".to_string()));
        assert_eq!(
            p.notifier().messages(),
            ["Smooth MS1 data", "Smooth MS2 data"]
        );

        assert_eq!(container::list_sections(&smooth_path).unwrap(), ["ms1", "ms2"]);
        let stored_ms1 = container::read_section(&smooth_path, "ms1", None).unwrap();
        assert_eq!(stored_ms1, out.ms1);
        assert!(out.ms1.column("intensity").unwrap().iter().all(|&v| v >= 0.0));
        assert_eq!(out.ms1_index.rows(), out.ms1.len());
        assert!(out.ms2_index.rows() > 0);
    }

    #[test]
    fn smoothing_converts_raw_input_to_the_given_path() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("run.mzML");
        std::fs::write(&raw, crate::data::mzml::tests::minimal_mzml()).unwrap();
        let converted = dir.path().join("custom.h5");
        let p = pipeline();

        p.create_smooth(
            &raw,
            &Features::default(),
            "1-1-0",
            1,
            &dir.path().join("run_smooth.h5"),
            &AccessionNames::default(),
            Some(&converted),
        )
        .unwrap();

        assert_eq!(container::list_sections(&converted).unwrap(), ["ms1", "ms2"]);
        let calls = p.processor().calls();
        assert_eq!(calls.iter().filter(|c| *c == "convert").count(), 1);
        // The second channel is served from the freshly written container.
        assert!(calls.contains(&"load ms2".to_string()));
    }

    #[test]
    fn custom_intensity_column_is_not_a_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("abundance.h5");
        let blob = blobs(&[(4.0, 3.0, 1.0, 30_000.0)]);
        let renamed = Dataset::from_columns(
            ["mz", "drift_time", "retention_time"]
                .map(|n| (n, blob.column(n).unwrap().to_vec()))
                .into_iter()
                .chain([("abundance", blob.column("intensity").unwrap().to_vec())]),
        )
        .unwrap();
        container::write_section(&raw, "ms1", &renamed, WriteMode::Overwrite).unwrap();
        container::write_section(&raw, "ms2", &renamed, WriteMode::Append).unwrap();
        let features = Features {
            intensity: "abundance".into(),
            ..Features::default()
        };

        let out = pipeline()
            .create_smooth(
                &raw,
                &features,
                "1-1-0",
                1,
                &dir.path().join("s.h5"),
                &AccessionNames::default(),
                None,
            )
            .unwrap();
        let dims: Vec<&str> = out.ms1_index.factors().dims().collect();
        assert_eq!(dims, ["drift_time", "mz", "retention_time"]);
        assert!(out.ms1.has_column("abundance"));
    }

    #[test]
    fn peaks_are_sorted_and_thresholded() {
        let dir = tempfile::tempdir().unwrap();
        let raw = write_raw(dir.path());
        let smooth_path = dir.path().join("raw_smooth.h5");
        let peak_path = dir.path().join("raw_peaks.h5");
        let p = pipeline();
        let features = Features::default();
        let smoothed = p
            .create_smooth(&raw, &features, "1-1-0", 1, &smooth_path, &AccessionNames::default(), None)
            .unwrap();

        let threshold = 1000.0;
        let ms1 = p
            .create_peak(
                &smooth_path,
                &features,
                threshold,
                "1-1-0",
                &smoothed.ms1_index,
                &smoothed.ms2_index,
                &peak_path,
                &AccessionNames::default(),
            )
            .unwrap();

        assert!(!ms1.is_empty());
        let persistence = ms1.column(PERSISTENCE_COLUMN).unwrap();
        assert!(persistence.windows(2).all(|w| w[0] >= w[1]));
        assert!(persistence.iter().all(|&v| v >= threshold));
        assert!(ms1.column("intensity").unwrap().iter().all(|&v| v >= threshold));

        let ms2 = container::read_section(&peak_path, "ms2", None).unwrap();
        let ms2_persistence = ms2.column(PERSISTENCE_COLUMN).unwrap();
        assert!(ms2_persistence.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(container::read_section(&peak_path, "ms1", None).unwrap(), ms1);
    }

    #[test]
    fn threshold_above_every_peak_yields_empty_sections() {
        let dir = tempfile::tempdir().unwrap();
        let raw = write_raw(dir.path());
        let smooth_path = dir.path().join("s.h5");
        let peak_path = dir.path().join("p.h5");
        let p = pipeline();
        let features = Features::default();
        let smoothed = p
            .create_smooth(&raw, &features, "0-0-0", 1, &smooth_path, &AccessionNames::default(), None)
            .unwrap();

        let ms1 = p
            .create_peak(
                &smooth_path,
                &features,
                1e12,
                "1-1-0",
                &smoothed.ms1_index,
                &smoothed.ms2_index,
                &peak_path,
                &AccessionNames::default(),
            )
            .unwrap();
        assert!(ms1.is_empty());
        assert!(container::read_section(&peak_path, "ms2", None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn alignment_reference_uses_fixed_cutoffs() {
        let p = pipeline();
        let features = Features::default();
        let data = blobs(&[(3.0, 2.0, 1.0, 50_000.0), (9.0, 6.0, 1.0, 1_100.0)]);

        let reference = p.align_peak_create(&data, &features).unwrap();
        assert!(!reference.is_empty());
        assert!(reference
            .column(PERSISTENCE_COLUMN)
            .unwrap()
            .iter()
            .all(|&v| v >= REFERENCE_CUTOFF));
        assert!(reference
            .column("intensity")
            .unwrap()
            .iter()
            .all(|&v| v >= REFERENCE_CUTOFF));

        let calls = p.processor().calls();
        assert!(calls.contains(&"peaks unindexed default".to_string()));
        assert!(calls.contains(&format!("threshold persistence {REFERENCE_CUTOFF}")));
        assert!(!calls.iter().any(|c| c.starts_with("save") || c.starts_with("load")));

        // Same input, same reference: nothing caller-tunable feeds this stage.
        assert_eq!(p.align_peak_create(&data, &features).unwrap(), reference);
    }

    #[test]
    fn derived_names() {
        assert_eq!(
            derived_output_name(Path::new("data/run.mzML.gz"), "smooth"),
            Path::new("data/run_smooth.h5")
        );
        assert_eq!(
            derived_output_name(Path::new("run.h5"), "peaks"),
            Path::new("run_peaks.h5")
        );
    }
}
