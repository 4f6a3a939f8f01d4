use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use eframe::egui::TextureHandle;

use rusty_ims::config::{DashboardConfig, CONFIG_FILE};
use rusty_ims::data::loader::converted_path_for;
use rusty_ims::data::model::{Channel, Dataset, Features};
use rusty_ims::drift;
use rusty_ims::notify::NotificationCenter;
use rusty_ims::pipeline::{Pipeline, SmoothOutput};
use rusty_ims::processing::{NativeProcessor, SpectralProcessor};
use rusty_ims::raster::{Raster, RasterRequest};

// ---------------------------------------------------------------------------
// View selection
// ---------------------------------------------------------------------------

/// Which result the central panel shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTab {
    Raw,
    Smoothed,
    Peaks,
    Reference,
}

impl DataTab {
    pub const ALL: [DataTab; 4] = [DataTab::Raw, DataTab::Smoothed, DataTab::Peaks, DataTab::Reference];

    pub fn label(&self) -> &'static str {
        match self {
            DataTab::Raw => "Raw",
            DataTab::Smoothed => "Smoothed",
            DataTab::Peaks => "Peaks",
            DataTab::Reference => "Reference",
        }
    }
}

/// Pair of columns plotted on the heatmap's x and y axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisPair {
    MzDt,
    RtDt,
    MzRt,
}

impl AxisPair {
    pub const ALL: [AxisPair; 3] = [AxisPair::MzDt, AxisPair::RtDt, AxisPair::MzRt];

    pub fn label(&self) -> &'static str {
        match self {
            AxisPair::MzDt => "mz x dt",
            AxisPair::RtDt => "rt x dt",
            AxisPair::MzRt => "mz x rt",
        }
    }

    /// `(x, y)` column names under the current feature mapping.
    pub fn columns<'a>(&self, features: &'a Features) -> (&'a str, &'a str) {
        match self {
            AxisPair::MzDt => (features.mz.as_str(), features.drift_time.as_str()),
            AxisPair::RtDt => (features.retention_time.as_str(), features.drift_time.as_str()),
            AxisPair::MzRt => (features.mz.as_str(), features.retention_time.as_str()),
        }
    }
}

/// Heatmap controls. A zero sampling means "no cap".
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSettings {
    pub axes: AxisPair,
    pub fixed_x: bool,
    pub x_range: (f64, f64),
    pub fixed_y: bool,
    pub y_range: (f64, f64),
    pub x_sampling: f64,
    pub y_sampling: f64,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            axes: AxisPair::MzDt,
            fixed_x: false,
            x_range: (0.0, 2000.0),
            fixed_y: false,
            y_range: (0.0, 60.0),
            x_sampling: 0.0,
            y_sampling: 0.0,
        }
    }
}

impl ViewSettings {
    pub fn request(&self) -> RasterRequest {
        let positive = |v: f64| (v > 0.0).then_some(v);
        RasterRequest {
            x_range: self.fixed_x.then_some(self.x_range),
            y_range: self.fixed_y.then_some(self.y_range),
            x_sampling: positive(self.x_sampling),
            y_sampling: positive(self.y_sampling),
            ..RasterRequest::default()
        }
    }
}

/// Identifies what a cached raster was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterKey {
    pub generation: u64,
    pub tab: DataTab,
    pub view: ViewSettings,
    pub features: Features,
}

pub struct RasterCache {
    pub key: RasterKey,
    pub raster: Raster,
    pub texture: TextureHandle,
}

// ---------------------------------------------------------------------------
// Actions triggered from the UI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Load,
    Smooth,
    DetectPeaks,
    Reference,
    CorrectDrift,
    SaveSettings,
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
pub struct AppState {
    pub config: DashboardConfig,
    pub pipeline: Pipeline<NativeProcessor, NotificationCenter>,

    /// Channel the Load button reads.
    pub channel: Channel,

    pub raw: Option<Dataset>,
    pub smoothed: Option<SmoothOutput>,
    pub peaks: Option<Dataset>,
    pub reference: Option<Dataset>,
    /// ms2 peaks with a corrected drift-time column.
    pub corrected: Option<Dataset>,

    pub tab: DataTab,
    pub view: ViewSettings,

    /// Bumped whenever any dataset changes; invalidates the raster cache.
    pub generation: u64,
    pub raster_cache: Option<RasterCache>,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DashboardConfig::default())
    }
}

impl AppState {
    pub fn new(config: DashboardConfig) -> Self {
        Self {
            config,
            pipeline: Pipeline::new(NativeProcessor, NotificationCenter::default()),
            channel: Channel::Ms1,
            raw: None,
            smoothed: None,
            peaks: None,
            reference: None,
            corrected: None,
            tab: DataTab::Raw,
            view: ViewSettings::default(),
            generation: 0,
            raster_cache: None,
            status_message: None,
        }
    }

    /// Dataset behind the active tab.
    pub fn current(&self) -> Option<&Dataset> {
        match self.tab {
            DataTab::Raw => self.raw.as_ref(),
            DataTab::Smoothed => self.smoothed.as_ref().map(|s| &s.ms1),
            DataTab::Peaks => self.peaks.as_ref(),
            DataTab::Reference => self.reference.as_ref(),
        }
    }

    /// Explicit converted path, or the default cache location for raw input.
    pub fn converted_path(&self) -> Option<PathBuf> {
        self.config
            .converted_path
            .clone()
            .or_else(|| converted_path_for(&self.config.input_path))
    }

    /// Point the dashboard at a new input and derive the output names.
    /// Results computed from the previous input are dropped.
    pub fn set_input(&mut self, path: PathBuf) {
        self.config.smooth_output = rusty_ims::pipeline::derived_output_name(&path, "smooth");
        self.config.peak_output = rusty_ims::pipeline::derived_output_name(&path, "peaks");
        self.config.converted_path = None;
        self.config.input_path = path;

        self.raw = None;
        self.smoothed = None;
        self.peaks = None;
        self.reference = None;
        self.corrected = None;
        self.touch(DataTab::Raw);
    }

    /// Run an action and report its outcome in the status line.
    pub fn run(&mut self, action: Action) {
        let result = match action {
            Action::Load => self.load(),
            Action::Smooth => self.smooth(),
            Action::DetectPeaks => self.detect_peaks(),
            Action::Reference => self.build_reference(),
            Action::CorrectDrift => self.correct_drift(),
            Action::SaveSettings => self.config.save(Path::new(CONFIG_FILE)),
        };
        match result {
            Ok(()) => self.status_message = None,
            Err(e) => {
                log::error!("{action:?} failed: {e:#}");
                self.status_message = Some(format!("Error: {e:#}"));
            }
        }
    }

    fn touch(&mut self, tab: DataTab) {
        self.tab = tab;
        self.generation += 1;
    }

    fn load(&mut self) -> Result<()> {
        let converted = self.converted_path();
        let data = self
            .pipeline
            .load_initial_data(
                &self.config.input_path,
                &self.config.features,
                &self.config.accession_names,
                converted.as_deref(),
                self.channel,
            )
            .with_context(|| format!("Failed to load {}", self.config.input_path.display()))?;
        log::info!("Loaded {} {} rows", data.len(), self.channel);
        self.raw = Some(data);
        self.touch(DataTab::Raw);
        Ok(())
    }

    fn smooth(&mut self) -> Result<()> {
        let converted = self.converted_path();
        let cfg = &self.config;
        let output = self
            .pipeline
            .create_smooth(
                &cfg.input_path,
                &cfg.features,
                &cfg.smooth_radius,
                cfg.smooth_iterations,
                &cfg.smooth_output,
                &cfg.accession_names,
                converted.as_deref(),
            )
            .context("Smoothing failed")?;
        self.smoothed = Some(output);
        self.touch(DataTab::Smoothed);
        Ok(())
    }

    fn detect_peaks(&mut self) -> Result<()> {
        let Some(smoothed) = &self.smoothed else {
            bail!("Run smoothing before detecting peaks");
        };
        let cfg = &self.config;
        let peaks = self
            .pipeline
            .create_peak(
                &cfg.smooth_output,
                &cfg.features,
                cfg.peak_threshold,
                &cfg.peak_radius,
                &smoothed.ms1_index,
                &smoothed.ms2_index,
                &cfg.peak_output,
                &cfg.accession_names,
            )
            .context("Peak detection failed")?;
        log::info!("{} ms1 peaks", peaks.len());
        self.peaks = Some(peaks);
        self.touch(DataTab::Peaks);
        Ok(())
    }

    fn build_reference(&mut self) -> Result<()> {
        let Some(raw) = &self.raw else {
            bail!("Load data before building the alignment reference");
        };
        let reference = self
            .pipeline
            .align_peak_create(raw, &self.config.features)
            .context("Building the alignment reference failed")?;
        self.reference = Some(reference);
        self.touch(DataTab::Reference);
        Ok(())
    }

    fn correct_drift(&mut self) -> Result<()> {
        let Some(ms1) = &self.peaks else {
            bail!("Detect peaks before correcting ms2 drift times");
        };
        let ms2 = self
            .pipeline
            .processor()
            .load(&self.config.peak_output, Channel::Ms2.key(), None)
            .context("Failed to read ms2 peaks")?;
        let corrected = drift::correct_ms2_peaks(
            ms1,
            &ms2,
            &self.config.features,
            self.config.collision_energy,
            drift::DEFAULT_OFFSET_PARAMS,
        )?;
        log::info!("Corrected drift times of {} ms2 peaks", corrected.len());
        self.corrected = Some(corrected);
        Ok(())
    }
}
