//! Processing core of the LC-IMS-MS dashboard: data loading, the
//! smoothing / peak-picking pipeline, drift-time correction and plot
//! rasterization.

pub mod config;
pub mod data;
pub mod drift;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod processing;
pub mod raster;

#[cfg(test)]
mod testing;
