//! Aggregation of large point clouds onto a fixed-size grid.
//!
//! Plots with hundreds of thousands of points are drawn as one image: each
//! point adds its weight to the bin it falls into and the bins are colour
//! mapped after histogram equalisation.

pub const DEFAULT_WIDTH: usize = 800;
pub const DEFAULT_HEIGHT: usize = 600;

/// Inclusive `(min, max)` range of one axis.
pub type AxisRange = (f64, f64);

#[derive(Debug, Clone, PartialEq)]
pub struct RasterRequest {
    pub width: usize,
    pub height: usize,
    /// `None` uses the extent of the data.
    pub x_range: Option<AxisRange>,
    pub y_range: Option<AxisRange>,
    /// Minimum bin span along x; caps the number of columns.
    pub x_sampling: Option<f64>,
    pub y_sampling: Option<f64>,
}

impl Default for RasterRequest {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            x_range: None,
            y_range: None,
            x_sampling: None,
            y_sampling: None,
        }
    }
}

impl RasterRequest {
    /// Both ranges were given explicitly, so they also bound the plot.
    pub fn fixes_plot_limits(&self) -> bool {
        self.x_range.is_some() && self.y_range.is_some()
    }
}

/// Sum-aggregated grid. Row 0 holds the lowest y values.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub columns: usize,
    pub rows: usize,
    pub x_range: AxisRange,
    pub y_range: AxisRange,
    bins: Vec<Option<f64>>,
}

impl Raster {
    /// Aggregated weight of a bin, `None` when no point landed in it.
    pub fn bin(&self, column: usize, row: usize) -> Option<f64> {
        if column >= self.columns || row >= self.rows {
            return None;
        }
        self.bins[row * self.columns + column]
    }

    /// Bin value under a data-space coordinate.
    pub fn value_at(&self, x: f64, y: f64) -> Option<f64> {
        let column = bin_of(x, self.x_range, self.columns)?;
        let row = bin_of(y, self.y_range, self.rows)?;
        self.bin(column, row)
    }

    pub fn filled_bins(&self) -> usize {
        self.bins.iter().filter(|b| b.is_some()).count()
    }

    /// Total weight over all bins.
    pub fn total(&self) -> f64 {
        self.bins.iter().flatten().sum()
    }

    /// Smallest non-empty bin value.
    pub fn min(&self) -> Option<f64> {
        self.bins.iter().flatten().copied().reduce(f64::min)
    }

    /// Largest bin value, `None` for an empty raster.
    pub fn max(&self) -> Option<f64> {
        self.bins.iter().flatten().copied().reduce(f64::max)
    }

    /// Equalised-histogram normalisation: each non-empty bin maps to its
    /// rank among the distinct non-empty values, scaled to `[0, 1]`.
    /// Empty bins stay `None`.
    pub fn eq_hist(&self) -> Vec<Option<f32>> {
        let mut distinct: Vec<f64> = self.bins.iter().flatten().copied().collect();
        distinct.sort_by(f64::total_cmp);
        distinct.dedup();

        let top = distinct.len().saturating_sub(1);
        self.bins
            .iter()
            .map(|bin| {
                bin.map(|v| {
                    if top == 0 {
                        return 1.0;
                    }
                    let rank = distinct.partition_point(|&d| d < v);
                    rank as f32 / top as f32
                })
            })
            .collect()
    }
}

fn extent(values: &[f64]) -> Option<AxisRange> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

fn bin_count(limit: usize, range: AxisRange, sampling: Option<f64>) -> usize {
    let limit = limit.max(1);
    match sampling {
        Some(step) if step > 0.0 => {
            let capped = ((range.1 - range.0) / step).floor();
            if capped.is_finite() {
                (capped as usize).clamp(1, limit)
            } else {
                limit
            }
        }
        _ => limit,
    }
}

fn bin_of(value: f64, (lo, hi): AxisRange, bins: usize) -> Option<usize> {
    if !(value >= lo && value <= hi) {
        return None;
    }
    let span = hi - lo;
    if span <= 0.0 {
        return Some(0);
    }
    let bin = ((value - lo) / span * bins as f64) as usize;
    Some(bin.min(bins - 1))
}

/// Sum `weights` into a grid over the `x`/`y` coordinates. Points outside
/// the requested ranges, or with a non-finite coordinate, are dropped.
pub fn rasterize(x: &[f64], y: &[f64], weights: &[f64], request: &RasterRequest) -> Raster {
    let x_range = request.x_range.or_else(|| extent(x)).unwrap_or((0.0, 1.0));
    let y_range = request.y_range.or_else(|| extent(y)).unwrap_or((0.0, 1.0));
    let columns = bin_count(request.width, x_range, request.x_sampling);
    let rows = bin_count(request.height, y_range, request.y_sampling);

    let mut bins = vec![None; columns * rows];
    let mut dropped = 0usize;
    for ((&px, &py), &w) in x.iter().zip(y).zip(weights) {
        match (bin_of(px, x_range, columns), bin_of(py, y_range, rows)) {
            (Some(c), Some(r)) => {
                let bin: &mut Option<f64> = &mut bins[r * columns + c];
                *bin = Some(bin.unwrap_or(0.0) + w);
            }
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        log::debug!("rasterize: {dropped} points outside the requested ranges");
    }

    Raster {
        columns,
        rows,
        x_range,
        y_range,
        bins,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(width: usize, height: usize) -> RasterRequest {
        RasterRequest {
            width,
            height,
            ..RasterRequest::default()
        }
    }

    #[test]
    fn defaults_to_dashboard_size() {
        let r = RasterRequest::default();
        assert_eq!((r.width, r.height), (800, 600));
        assert!(!r.fixes_plot_limits());
    }

    #[test]
    fn sums_weights_per_bin() {
        let x = [0.0, 0.1, 1.0, 1.0];
        let y = [0.0, 0.1, 1.0, 1.0];
        let w = [1.0, 2.0, 5.0, 7.0];
        let raster = rasterize(&x, &y, &w, &request(2, 2));

        assert_eq!(raster.bin(0, 0), Some(3.0));
        assert_eq!(raster.bin(1, 1), Some(12.0));
        assert_eq!(raster.bin(1, 0), None);
        assert_eq!(raster.filled_bins(), 2);
        assert_eq!(raster.total(), 15.0);
        assert_eq!(raster.max(), Some(12.0));
        assert_eq!(raster.min(), Some(3.0));
        assert_eq!(raster.value_at(0.9, 0.9), Some(12.0));
    }

    #[test]
    fn drops_points_outside_requested_ranges() {
        let x = [-1.0, 0.5, 2.0, f64::NAN];
        let y = [0.5, 0.5, 0.5, 0.5];
        let w = [100.0, 1.0, 100.0, 100.0];
        let req = RasterRequest {
            x_range: Some((0.0, 1.0)),
            y_range: Some((0.0, 1.0)),
            ..request(4, 4)
        };
        let raster = rasterize(&x, &y, &w, &req);
        assert!(req.fixes_plot_limits());
        assert_eq!(raster.total(), 1.0);
        assert_eq!(raster.x_range, (0.0, 1.0));
    }

    #[test]
    fn sampling_caps_bin_count() {
        let x = [0.0, 10.0];
        let y = [0.0, 10.0];
        let req = RasterRequest {
            x_sampling: Some(2.5),
            y_sampling: Some(100.0),
            ..RasterRequest::default()
        };
        let raster = rasterize(&x, &y, &[1.0, 1.0], &req);
        assert_eq!(raster.columns, 4);
        assert_eq!(raster.rows, 1);
        assert_eq!(raster.bin(0, 0), Some(1.0));
        assert_eq!(raster.bin(3, 0), Some(1.0));
    }

    #[test]
    fn eq_hist_ranks_distinct_values() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [0.0; 4];
        let w = [10.0, 1000.0, 10.0, 50.0];
        let raster = rasterize(&x, &y, &w, &request(4, 1));
        assert_eq!(
            raster.eq_hist(),
            vec![Some(0.0), Some(1.0), Some(0.0), Some(0.5)]
        );

        let single = rasterize(&[0.0, 3.0], &[0.0, 0.0], &[4.0, 4.0], &request(4, 2));
        let levels = single.eq_hist();
        assert_eq!(levels.iter().flatten().count(), 2);
        assert!(levels.iter().flatten().all(|&l| l == 1.0));
    }

    #[test]
    fn empty_input_gives_empty_raster() {
        let raster = rasterize(&[], &[], &[], &request(3, 3));
        assert_eq!(raster.filled_bins(), 0);
        assert_eq!(raster.max(), None);
        assert!(raster.eq_hist().iter().all(Option::is_none));
    }
}
