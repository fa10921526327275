//! Anti-aliased spline resampling of N-d arrays.
//!
//! [`resize`] follows the usual image-resize contract: an optional Gaussian
//! pre-filter when downsampling, a separable B-spline zoom with grid-centred
//! coordinates, and clipping of the result to the input value range.

mod boundary;
mod gaussian;
mod lanes;
mod spline;

use ndarray::{ArrayD, ArrayViewD, IxDyn};

use self::gaussian::gaussian_filter;
use self::lanes::map_lanes;
use self::spline::zoom_lane;
use crate::enums::{BoundaryMode, DataType, SplineMode};
use crate::error::{Error, Result};

pub const MAX_ORDER: u8 = 5;

/// Options of [`resize`]. `None` fields take dtype-dependent defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct ResizeOptions {
    pub order: Option<u8>,
    pub mode: BoundaryMode,
    pub cval: f64,
    pub clip: bool,
    pub anti_aliasing: Option<bool>,
    pub anti_aliasing_sigma: Option<Vec<f64>>,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            order: None,
            mode: BoundaryMode::Reflect,
            cval: 0.0,
            clip: true,
            anti_aliasing: None,
            anti_aliasing_sigma: None,
        }
    }
}

impl ResizeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(mut self, order: u8) -> Self {
        self.order = Some(order);
        self
    }

    pub fn mode(mut self, mode: BoundaryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn cval(mut self, cval: f64) -> Self {
        self.cval = cval;
        self
    }

    pub fn clip(mut self, clip: bool) -> Self {
        self.clip = clip;
        self
    }

    pub fn anti_aliasing(mut self, anti_aliasing: bool) -> Self {
        self.anti_aliasing = Some(anti_aliasing);
        self
    }

    /// One sigma for every axis, or one per axis.
    pub fn anti_aliasing_sigma(mut self, sigma: Vec<f64>) -> Self {
        self.anti_aliasing_sigma = Some(sigma);
        self
    }
}

/// Interpolation order after dtype rules: bool data is always nearest.
pub fn resolve_order(order: Option<u8>, dtype: DataType) -> Result<u8> {
    match order {
        Some(order) if order > MAX_ORDER => Err(Error::InvalidArgument(format!(
            "spline order must be in 0..={MAX_ORDER}, got {order}"
        ))),
        Some(order) if order > 0 && dtype.is_bool() => {
            log::warn!("interpolation is undefined for bool data, using order 0 instead of {order}");
            Ok(0)
        }
        Some(order) => Ok(order),
        None if dtype.is_bool() => Ok(0),
        None => Ok(1),
    }
}

/// Output shape with the input's rank: a shape one axis short keeps the
/// trailing channel axis. Also returns the input shape padded with
/// trailing unit axes when the output has more axes.
fn resolve_shapes(input: &[usize], output: &[usize]) -> Result<(Vec<usize>, Vec<usize>)> {
    if output.iter().any(|&s| s == 0) {
        return Err(Error::InvalidArgument(format!("output shape {output:?} has an empty axis")));
    }
    if output.len() + 1 == input.len() {
        let mut full = output.to_vec();
        full.push(input[input.len() - 1]);
        return Ok((input.to_vec(), full));
    }
    if output.len() < input.len() {
        return Err(Error::dimension(format!(
            "output shape {output:?} has fewer axes than input {input:?}"
        )));
    }
    let mut padded = input.to_vec();
    padded.resize(output.len(), 1);
    Ok((padded, output.to_vec()))
}

fn default_anti_aliasing(dtype: DataType, order: u8, input: &[usize], output: &[usize]) -> bool {
    let downsampling = input.iter().zip(output).any(|(i, o)| o < i);
    !dtype.is_bool() && !(order == 0 && dtype.is_integer()) && downsampling
}

/// Per-axis Gaussian sigma for the anti-aliasing filter.
fn anti_aliasing_sigma(explicit: Option<&[f64]>, factors: &[f64]) -> Result<Vec<f64>> {
    let Some(sigma) = explicit else {
        return Ok(factors.iter().map(|f| ((f - 1.0) / 2.0).max(0.0)).collect());
    };
    let sigma: Vec<f64> = match sigma.len() {
        1 => vec![sigma[0]; factors.len()],
        n if n == factors.len() => sigma.to_vec(),
        n => {
            return Err(Error::InvalidArgument(format!(
                "{n} anti-aliasing sigmas for {} axes",
                factors.len()
            )));
        }
    };
    if sigma.iter().any(|s| *s < 0.0 || !s.is_finite()) {
        return Err(Error::InvalidArgument(
            "anti-aliasing sigma must be non-negative".to_string(),
        ));
    }
    Ok(sigma
        .into_iter()
        .zip(factors)
        .enumerate()
        .map(|(axis, (s, &f))| {
            if s > 0.0 && f <= 1.0 {
                log::warn!("anti-aliasing sigma {s} on axis {axis} is ignored: axis is not downsampled");
                0.0
            } else {
                s
            }
        })
        .collect())
}

/// NaN-ignoring minimum and maximum.
pub fn value_range<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<(f64, f64)> {
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(None, |range, &v| match range {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Clamp `output` to the input range. In constant mode a `cval` outside the
/// input range but reached by the output widens the bounds to include it.
fn clip_output(output: &mut ArrayD<f64>, input_range: Option<(f64, f64)>, mode: BoundaryMode, cval: f64) {
    let Some((mut lo, mut hi)) = input_range else {
        return;
    };
    if mode == BoundaryMode::Constant && !(lo <= cval && cval <= hi) {
        if let Some((out_lo, out_hi)) = value_range(output.iter()) {
            if out_lo <= cval && cval <= out_hi {
                lo = lo.min(cval);
                hi = hi.max(cval);
            }
        }
    }
    output.mapv_inplace(|v| v.clamp(lo, hi));
}

/// Resample `input` to `output_shape`.
///
/// The result holds interpolated floating-point values; callers that keep
/// integer data round them with [`DataType::quantize`].
pub fn resize(input: ArrayViewD<'_, f32>, dtype: DataType, output_shape: &[usize], options: &ResizeOptions) -> Result<ArrayD<f32>> {
    if input.is_empty() {
        return Err(Error::dimension("cannot resize an empty array"));
    }
    let (input_shape, output_shape) = resolve_shapes(input.shape(), output_shape)?;
    let order = resolve_order(options.order, dtype)?;

    let anti_aliasing = match options.anti_aliasing {
        Some(true) if dtype.is_bool() => {
            return Err(Error::InvalidArgument(
                "anti-aliasing is not supported for bool data".to_string(),
            ));
        }
        Some(explicit) => explicit,
        None => default_anti_aliasing(dtype, order, &input_shape, &output_shape),
    };

    let mut data: ArrayD<f64> = input.mapv(f64::from).into_shape_with_order(IxDyn(&input_shape))?;
    if input_shape == output_shape {
        return Ok(data.mapv(|v| v as f32));
    }
    let input_range = if options.clip { value_range(data.iter()) } else { None };

    let factors: Vec<f64> = input_shape
        .iter()
        .zip(&output_shape)
        .map(|(&i, &o)| i as f64 / o as f64)
        .collect();
    let spline_mode = SplineMode::from(options.mode);

    if anti_aliasing {
        let sigma = anti_aliasing_sigma(options.anti_aliasing_sigma.as_deref(), &factors)?;
        log::debug!("anti-aliasing with sigma {sigma:?}");
        data = gaussian_filter(data, &sigma, spline_mode, options.cval)?;
    }

    for axis in 0..data.ndim() {
        let len = output_shape[axis];
        if data.shape()[axis] == len {
            continue;
        }
        data = map_lanes(&data, axis, len, |lane, out| {
            zoom_lane(lane, out, order, spline_mode, options.cval)
        })?;
    }

    if options.clip {
        clip_output(&mut data, input_range, options.mode, options.cval);
    }
    Ok(data.mapv(|v| v as f32))
}

/// XYZ shape covering the same extent at a new bioxel size, at least one
/// sample per axis.
pub fn bioxel_shape(xyz_shape: [usize; 3], current: [f64; 3], target: [f64; 3]) -> Result<[usize; 3]> {
    if target.iter().any(|t| !t.is_finite() || *t <= 0.0) {
        return Err(Error::InvalidArgument(format!("bioxel size must be positive, got {target:?}")));
    }
    let mut shape = [1; 3];
    for axis in 0..3 {
        let extent = xyz_shape[axis] as f64 * current[axis];
        shape[axis] = ((extent / target[axis]).round() as usize).max(1);
    }
    Ok(shape)
}
