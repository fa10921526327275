//! B-spline interpolation of orders 0 to 5.
//!
//! Orders above 1 first convert samples into spline coefficients with a
//! recursive causal/anti-causal filter (Unser's formulation). The lane is
//! padded with its boundary extension before filtering so every mode can
//! share the whole-sample symmetric initialisation.

use super::boundary::{pad, sample};
use crate::enums::SplineMode;

/// Extra samples on each side of a lane before prefiltering. The largest
/// pole magnitude (order 5) decays below 1e-4 over this distance.
const PREFILTER_PAD: usize = 12;

fn poles(order: u8) -> Vec<f64> {
    match order {
        2 => vec![8f64.sqrt() - 3.0],
        3 => vec![3f64.sqrt() - 2.0],
        4 => vec![
            (664.0 - 438976f64.sqrt()).sqrt() + 304f64.sqrt() - 19.0,
            (664.0 + 438976f64.sqrt()).sqrt() - 304f64.sqrt() - 19.0,
        ],
        5 => vec![
            (67.5 - 4436.25f64.sqrt()).sqrt() + 26.25f64.sqrt() - 6.5,
            (67.5 + 4436.25f64.sqrt()).sqrt() - 26.25f64.sqrt() - 6.5,
        ],
        _ => Vec::new(),
    }
}

/// In-place conversion of samples to interpolating B-spline coefficients,
/// with mirror boundary conditions.
pub(crate) fn prefilter(c: &mut [f64], order: u8) {
    let n = c.len();
    let poles = poles(order);
    if n < 2 || poles.is_empty() {
        return;
    }
    let gain: f64 = poles.iter().map(|z| (1.0 - z) * (1.0 - 1.0 / z)).product();
    for v in c.iter_mut() {
        *v *= gain;
    }

    for &z in &poles {
        c[0] = causal_init(c, z);
        for i in 1..n {
            c[i] += z * c[i - 1];
        }
        c[n - 1] = (z / (z * z - 1.0)) * (z * c[n - 2] + c[n - 1]);
        for i in (0..n - 1).rev() {
            c[i] = z * (c[i + 1] - c[i]);
        }
    }
}

fn causal_init(c: &[f64], z: f64) -> f64 {
    let n = c.len();
    let horizon = ((f64::EPSILON.ln() / z.abs().ln()).ceil() as usize).max(1);
    if horizon < n {
        let mut zn = z;
        let mut sum = c[0];
        for &v in &c[1..horizon] {
            sum += zn * v;
            zn *= z;
        }
        sum
    } else {
        // Exact mirror-symmetric sum over the whole lane.
        let mut zn = z;
        let iz = 1.0 / z;
        let mut z2n = z.powi(n as i32 - 1);
        let mut sum = c[0] + z2n * c[n - 1];
        z2n *= z2n * iz;
        for &v in &c[1..n - 1] {
            sum += (zn + z2n) * v;
            zn *= z;
            z2n *= iz;
        }
        sum / (1.0 - zn * zn)
    }
}

/// Centred B-spline basis of degree `order` evaluated at `t`.
pub(crate) fn bspline(order: u8, t: f64) -> f64 {
    let t = t.abs();
    match order {
        0 => {
            if t < 0.5 {
                1.0
            } else {
                0.0
            }
        }
        1 => (1.0 - t).max(0.0),
        _ => {
            // Truncated-power form: sum of (t + (n+1)/2 - i)_+^n terms.
            let n = order as i32;
            let half = (n + 1) as f64 / 2.0;
            if t >= half {
                return 0.0;
            }
            let mut binomial = 1.0;
            let mut sum = 0.0;
            for i in 0..=(n + 1) {
                let x = t + half - i as f64;
                if x > 0.0 {
                    let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                    sum += sign * binomial * x.powi(n);
                }
                binomial = binomial * (n + 1 - i) as f64 / (i + 1) as f64;
            }
            let factorial: f64 = (1..=n).map(f64::from).product();
            sum / factorial
        }
    }
}

/// Coefficients of one lane and the offset of sample 0 within them.
pub(crate) struct Coefficients {
    values: Vec<f64>,
    offset: usize,
    order: u8,
    mode: SplineMode,
    cval: f64,
}

impl Coefficients {
    pub(crate) fn new(lane: &[f64], order: u8, mode: SplineMode, cval: f64) -> Self {
        if order <= 1 {
            return Self {
                values: lane.to_vec(),
                offset: 0,
                order,
                mode,
                cval,
            };
        }
        let mut values = pad(lane, PREFILTER_PAD, mode, cval);
        prefilter(&mut values, order);
        Self {
            values,
            offset: PREFILTER_PAD,
            order,
            mode,
            cval,
        }
    }

    /// Interpolated value at continuous sample coordinate `x`.
    pub(crate) fn at(&self, x: f64) -> f64 {
        match self.order {
            0 => {
                let i = (x + 0.5).floor() as isize;
                sample(&self.values, i, self.mode, self.cval)
            }
            1 => {
                let i0 = x.floor();
                let dx = x - i0;
                let i0 = i0 as isize;
                let v0 = sample(&self.values, i0, self.mode, self.cval);
                let v1 = sample(&self.values, i0 + 1, self.mode, self.cval);
                v0.mul_add(1.0 - dx, v1 * dx)
            }
            order => {
                let x = x + self.offset as f64;
                let half = (order as f64 + 1.0) / 2.0;
                let first = (x - half).floor() as isize + 1;
                let last = (x + half).ceil() as isize - 1;
                let last_index = self.values.len() as isize - 1;
                (first..=last)
                    .map(|k| {
                        let coefficient = self.values[k.clamp(0, last_index) as usize];
                        coefficient * bspline(order, x - k as f64)
                    })
                    .sum()
            }
        }
    }
}

/// Resample one lane onto `output.len()` samples with grid-centred
/// coordinates: output sample `j` reads input position `(j + 0.5)·f − 0.5`.
pub(crate) fn zoom_lane(input: &[f64], output: &mut [f64], order: u8, mode: SplineMode, cval: f64) {
    let factor = input.len() as f64 / output.len() as f64;
    let coefficients = Coefficients::new(input, order, mode, cval);
    for (j, out) in output.iter_mut().enumerate() {
        *out = coefficients.at((j as f64 + 0.5) * factor - 0.5);
    }
}
