//! Separable Gaussian smoothing used as the anti-aliasing pre-filter.

use ndarray::ArrayD;

use super::boundary::sample;
use super::lanes::map_lanes;
use crate::enums::SplineMode;
use crate::error::Result;

/// Kernel radius as a multiple of sigma.
pub(crate) const TRUNCATE: f64 = 4.0;

/// Normalized 1-D Gaussian kernel of radius `round(truncate * sigma)`.
pub(crate) fn kernel(sigma: f64) -> Vec<f64> {
    let radius = (TRUNCATE * sigma + 0.5) as isize;
    let two_sigma2 = 2.0 * sigma * sigma;
    let mut weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-((x * x) as f64) / two_sigma2).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= sum;
    }
    weights
}

fn correlate(input: &[f64], output: &mut [f64], weights: &[f64], mode: SplineMode, cval: f64) {
    let radius = (weights.len() / 2) as isize;
    for (i, out) in output.iter_mut().enumerate() {
        let centre = i as isize;
        *out = weights
            .iter()
            .enumerate()
            .map(|(k, w)| w * sample(input, centre + k as isize - radius, mode, cval))
            .sum();
    }
}

/// Smooth `array` with a per-axis standard deviation. Axes with a zero
/// sigma are left untouched.
pub(crate) fn gaussian_filter(array: ArrayD<f64>, sigma: &[f64], mode: SplineMode, cval: f64) -> Result<ArrayD<f64>> {
    let mut array = array;
    for (axis, &s) in sigma.iter().enumerate() {
        if s <= 0.0 || array.shape()[axis] == 0 {
            continue;
        }
        let weights = kernel(s);
        let len = array.shape()[axis];
        array = map_lanes(&array, axis, len, |input, output| {
            correlate(input, output, &weights, mode, cval)
        })?;
    }
    Ok(array)
}
