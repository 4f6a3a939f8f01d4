//! Data layer: core types, file formats and loading.
//!
//! Architecture:
//! ```text
//!  .mzML / .mzML.gz        .h5            .csv
//!        │                  │               │
//!        ▼                  │               │
//!   ┌──────────┐            │               │
//!   │   mzml    │ spectra → ms1 / ms2       │
//!   └──────────┘            │               │
//!        │ convert once     │               │
//!        ▼                  ▼               │
//!   ┌───────────┐                           │
//!   │ container  │  <key>.parquet sections  │
//!   └───────────┘                           │
//!        │                                  │
//!        ▼                                  ▼
//!   ┌──────────┐
//!   │  loader   │  dispatch on extension → Dataset
//!   └──────────┘
//! ```

pub mod container;
pub mod loader;
pub mod model;
pub mod mzml;
