//! Dashboard settings persisted between sessions.
//!
//! ```json
//! {
//!   "input_path": "data/run.mzML.gz",
//!   "smooth_radius": "0-1-0",
//!   "smooth_iterations": 7
//! }
//! ```
//!
//! Missing fields take their defaults, so older files keep loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::loader::AccessionNames;
use crate::data::model::Features;
use crate::pipeline::PLACEHOLDER_PATHS;

/// File the dashboard reads at startup and writes from the File menu.
pub const CONFIG_FILE: &str = "rusty-ims.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Raw, container or CSV input.
    pub input_path: PathBuf,
    /// Where a raw input is converted to; empty lets the dashboard derive it.
    pub converted_path: Option<PathBuf>,
    pub features: Features,
    pub accession_names: AccessionNames,

    pub smooth_radius: String,
    pub smooth_iterations: usize,
    pub smooth_output: PathBuf,

    pub peak_radius: String,
    pub peak_threshold: f64,
    pub peak_output: PathBuf,

    /// Collision energy fed to the drift-time offset model.
    pub collision_energy: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from(PLACEHOLDER_PATHS[0]),
            converted_path: None,
            features: Features::default(),
            accession_names: AccessionNames::default(),
            smooth_radius: "0-1-0".into(),
            smooth_iterations: 7,
            smooth_output: PathBuf::from("data/created_data/smooth.h5"),
            peak_radius: "2-10-0".into(),
            peak_threshold: 1000.0,
            peak_output: PathBuf::from("data/created_data/peaks.h5"),
            collision_energy: 20.0,
        }
    }
}

impl DashboardConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse dashboard configuration")
    }

    /// The config at `path`, or the defaults when there is none yet.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("{} not found, using default settings", path.display());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialise configuration")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        log::info!("saved settings to {}", path.display());
        Ok(())
    }
}
