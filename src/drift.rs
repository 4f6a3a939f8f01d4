use crate::data::model::{Dataset, Features};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Drift-time offset model for ms2 ions
// ---------------------------------------------------------------------------

/// Column added by [`correct_ms2_peaks`].
pub const CORRECTED_DRIFT_COLUMN: &str = "drift_time_corrected";

/// Fitted `[p0, p1, p2]` used when the caller has no calibration of its own.
pub const DEFAULT_OFFSET_PARAMS: [f64; 3] = [1.020_670_31, -0.020_623_23, 0.001_766_94];

/// Predict the corrected drift time of each ms2 ion from its precursor:
///
/// ```text
/// y_i = (p0 + p1 * sqrt(mz_ms2_i) / sqrt(mz_ms1_i) + p2 * ln(ce)) * dt_i
/// ```
///
/// All three inputs must have the same length; otherwise
/// [`PipelineError::LengthMismatch`] names the first one that differs from
/// `dt_ms2`. NaN and infinities propagate, and `ce == 0` gives `-inf` terms.
pub fn offset_correction_model(
    dt_ms2: &[f64],
    mz_ms2: &[f64],
    mz_ms1: &[f64],
    ce: f64,
    params: [f64; 3],
) -> Result<Vec<f64>> {
    for (column, values) in [("mz_ms2", mz_ms2), ("mz_ms1", mz_ms1)] {
        if values.len() != dt_ms2.len() {
            return Err(PipelineError::LengthMismatch {
                column: column.to_string(),
                expected: dt_ms2.len(),
                actual: values.len(),
            });
        }
    }

    let [p0, p1, p2] = params;
    let energy_term = p2 * ce.ln();
    Ok(dt_ms2
        .iter()
        .zip(mz_ms2)
        .zip(mz_ms1)
        .map(|((&dt, &fragment), &precursor)| {
            (p0 + p1 * fragment.sqrt() / precursor.sqrt() + energy_term) * dt
        })
        .collect())
}

fn nearest(values: &[f64], target: f64) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .min_by(|(_, a), (_, b)| (*a - target).abs().total_cmp(&(*b - target).abs()))
        .map(|(i, _)| i)
}

/// Apply the offset model to ms2 peaks, taking as precursor the ms1 peak
/// closest in retention time. Ties go to the earlier ms1 row, so a
/// persistence-sorted ms1 table prefers the stronger peak. Without any ms1
/// peak the corrected column is NaN.
pub fn correct_ms2_peaks(
    ms1: &Dataset,
    ms2: &Dataset,
    features: &Features,
    ce: f64,
    params: [f64; 3],
) -> Result<Dataset> {
    let ms1_rt = ms1.require(&features.retention_time)?;
    let ms1_mz = ms1.require(&features.mz)?;
    let precursor_mz: Vec<f64> = ms2
        .require(&features.retention_time)?
        .iter()
        .map(|&rt| nearest(ms1_rt, rt).map_or(f64::NAN, |i| ms1_mz[i]))
        .collect();

    let corrected = offset_correction_model(
        ms2.require(&features.drift_time)?,
        ms2.require(&features.mz)?,
        &precursor_mz,
        ce,
        params,
    )?;
    let mut out = ms2.clone();
    out.push_column(CORRECTED_DRIFT_COLUMN, corrected)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_energy_equal_masses() {
        let [p0, p1, _] = DEFAULT_OFFSET_PARAMS;
        let y = offset_correction_model(&[1.0], &[100.0], &[100.0], 1.0, DEFAULT_OFFSET_PARAMS).unwrap();
        assert_eq!(y, vec![p0 + p1]);
    }

    #[test]
    fn scales_linearly_with_drift_time() {
        let params = [1.0, 0.5, 0.0];
        let y = offset_correction_model(&[2.0, 4.0], &[25.0, 25.0], &[100.0, 100.0], 10.0, params).unwrap();
        assert_eq!(y, vec![2.5, 5.0]);
    }

    #[test]
    fn collision_energy_enters_logarithmically() {
        let params = [0.0, 0.0, 1.0];
        let y = offset_correction_model(&[3.0], &[1.0], &[1.0], std::f64::consts::E, params).unwrap();
        assert!((y[0] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn nan_and_zero_energy_propagate() {
        let y = offset_correction_model(
            &[f64::NAN, 1.0],
            &[100.0, 100.0],
            &[100.0, 100.0],
            1.0,
            DEFAULT_OFFSET_PARAMS,
        )
        .unwrap();
        assert!(y[0].is_nan());
        assert!(y[1].is_finite());

        let y = offset_correction_model(&[1.0], &[100.0], &[100.0], 0.0, DEFAULT_OFFSET_PARAMS).unwrap();
        assert_eq!(y[0], f64::NEG_INFINITY);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = offset_correction_model(&[1.0, 2.0, 3.0], &[4.0, 4.0], &[4.0, 4.0, 4.0], 1.0, [1.0, 0.0, 0.0])
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::LengthMismatch { ref column, expected: 3, actual: 2 } if column == "mz_ms2"
        ));

        let err = offset_correction_model(&[1.0], &[4.0], &[], 1.0, [1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, PipelineError::LengthMismatch { ref column, .. } if column == "mz_ms1"));
    }

    fn peaks(rt: Vec<f64>, mz: Vec<f64>, dt: Vec<f64>) -> Dataset {
        Dataset::from_columns([("retention_time", rt), ("mz", mz), ("drift_time", dt)]).unwrap()
    }

    #[test]
    fn ms2_peaks_pair_with_closest_ms1_in_time() {
        let ms1 = peaks(vec![1.0, 5.0], vec![400.0, 900.0], vec![30.0, 31.0]);
        let ms2 = peaks(vec![4.6, 1.2], vec![100.0, 100.0], vec![10.0, 10.0]);
        let out = correct_ms2_peaks(&ms1, &ms2, &Features::default(), 1.0, [0.0, 1.0, 0.0]).unwrap();

        let corrected = out.column(CORRECTED_DRIFT_COLUMN).unwrap();
        assert!((corrected[0] - 10.0 / 3.0).abs() < 1e-12);
        assert_eq!(corrected[1], 5.0);
        assert_eq!(out.column("mz"), ms2.column("mz"));
    }

    #[test]
    fn no_ms1_peaks_gives_nan() {
        let ms1 = peaks(vec![], vec![], vec![]);
        let ms2 = peaks(vec![1.0], vec![100.0], vec![10.0]);
        let out = correct_ms2_peaks(&ms1, &ms2, &Features::default(), 20.0, DEFAULT_OFFSET_PARAMS).unwrap();
        assert!(out.column(CORRECTED_DRIFT_COLUMN).unwrap()[0].is_nan());
    }
}
