//! Reorientation of oriented 3D volumes to a canonical anatomical frame.
//!
//! Geometry is held in LPS world coordinates (the DICOM convention). The
//! voxel axes are permuted and flipped so index axes point Right, Anterior
//! and Superior, i.e. the direction matrix becomes as close as possible to
//! `diag(-1, -1, 1)` in LPS. The caller then composes the LPS→RAS flip
//! into the affine, which makes the final rotation close to identity.

use nalgebra::Matrix3;
use ndarray::{ArrayD, Axis as NdAxis};

use crate::affine::LPS_TO_RAS;
use crate::enums::Axis;

const PERMUTATIONS: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

/// Geometry of a volume in LPS world space. Spacing and direction columns
/// are indexed by voxel axis X, Y, Z.
#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    pub direction: Matrix3<f64>,
}

/// Index axis feeding each new axis, and whether it is flipped.
fn plan(direction: &Matrix3<f64>) -> ([usize; 3], [bool; 3]) {
    let permutation = PERMUTATIONS
        .iter()
        .copied()
        .max_by(|a, b| {
            let score = |p: &[usize; 3]| (0..3).map(|w| direction[(w, p[w])].abs()).sum::<f64>();
            score(a).total_cmp(&score(b))
        })
        .unwrap_or([0, 1, 2]);
    let mut flips = [false; 3];
    for w in 0..3 {
        let component = direction[(w, permutation[w])];
        flips[w] = component.signum() != LPS_TO_RAS[w].signum();
    }
    (permutation, flips)
}

/// Reorient `data` (whose spatial axes are labelled X/Y/Z by voxel axis)
/// and its geometry. Non-spatial axes are left untouched.
pub fn reorient(data: ArrayD<f32>, axes: &[Axis], geometry: &Geometry) -> (ArrayD<f32>, Vec<Axis>, Geometry) {
    let (permutation, flips) = plan(&geometry.direction);
    if permutation == [0, 1, 2] && flips == [false; 3] {
        return (data, axes.to_vec(), geometry.clone());
    }

    let spatial = [Axis::X, Axis::Y, Axis::Z];
    let mut direction = Matrix3::zeros();
    let mut spacing = [1.0; 3];
    let mut origin = geometry.origin;
    let size_of = |index_axis: usize| {
        axes.iter()
            .position(|a| *a == spatial[index_axis])
            .map_or(1, |k| data.shape()[k])
    };
    for w in 0..3 {
        let source = permutation[w];
        let column = geometry.direction.column(source).into_owned();
        spacing[w] = geometry.spacing[source];
        if flips[w] {
            let extent = (size_of(source).saturating_sub(1)) as f64 * geometry.spacing[source];
            for r in 0..3 {
                origin[r] += column[r] * extent;
            }
            direction.set_column(w, &(-column));
        } else {
            direction.set_column(w, &column);
        }
    }

    let mut data = data;
    let mut labels = axes.to_vec();
    for (k, label) in labels.iter_mut().enumerate() {
        let Some(source) = spatial.iter().position(|a| a == label) else {
            continue;
        };
        let Some(w) = permutation.iter().position(|&p| p == source) else {
            continue;
        };
        if flips[w] {
            data.invert_axis(NdAxis(k));
        }
        *label = spatial[w];
    }
    log::debug!("reoriented volume: permutation {permutation:?}, flips {flips:?}");

    (data, labels, Geometry { spacing, origin, direction })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, IxDyn};

    #[test]
    fn lps_identity_flips_x_and_y() {
        let data = Array3::from_shape_fn((2, 3, 4), |(x, y, z)| (x * 100 + y * 10 + z) as f32).into_dyn();
        let geometry = Geometry {
            spacing: [1.0, 2.0, 3.0],
            origin: [10.0, 20.0, 30.0],
            direction: Matrix3::identity(),
        };
        let (out, axes, g) = reorient(data, &[Axis::X, Axis::Y, Axis::Z], &geometry);
        assert_eq!(axes, vec![Axis::X, Axis::Y, Axis::Z]);
        assert_eq!(g.direction, Matrix3::from_diagonal(&nalgebra::Vector3::new(-1.0, -1.0, 1.0)));
        assert_eq!(g.origin, [11.0, 24.0, 30.0]);
        assert_eq!(out[IxDyn(&[0, 0, 0])], 120.0);
    }

    #[test]
    fn permuted_axes_are_relabelled() {
        // Voxel axis X runs along world S, voxel Z along world R.
        let direction = Matrix3::new(0.0, 0.0, -1.0, 0.0, -1.0, 0.0, 1.0, 0.0, 0.0);
        let geometry = Geometry {
            spacing: [1.0, 2.0, 3.0],
            origin: [0.0; 3],
            direction,
        };
        let data = ArrayD::<f32>::zeros(IxDyn(&[5, 6, 7]));
        let (out, axes, g) = reorient(data, &[Axis::X, Axis::Y, Axis::Z], &geometry);
        assert_eq!(axes, vec![Axis::Z, Axis::Y, Axis::X]);
        assert_eq!(out.shape(), &[5, 6, 7]);
        assert_eq!(g.spacing, [3.0, 2.0, 1.0]);
        assert_eq!(g.direction, Matrix3::from_diagonal(&nalgebra::Vector3::new(-1.0, -1.0, 1.0)));
    }
}
