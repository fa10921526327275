//! 4×4 homogeneous transforms mapping voxel indices to world coordinates.

use nalgebra::{Matrix3, Matrix4, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Coordinate flip between LPS and RAS world conventions.
pub const LPS_TO_RAS: [f64; 3] = [-1.0, -1.0, 1.0];

/// Voxel index → world affine, decomposable as `T · R · Z` with `R`
/// orthonormal and `Z` a positive diagonal scale.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 4]; 4]", into = "[[f64; 4]; 4]")]
pub struct Affine(pub Matrix4<f64>);

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    pub fn identity() -> Self {
        Self(Matrix4::identity())
    }

    /// Compose translation, rotation and per-axis scale into one matrix.
    pub fn compose(translation: [f64; 3], rotation: &Matrix3<f64>, zoom: [f64; 3]) -> Self {
        let linear = rotation * Matrix3::from_diagonal(&Vector3::from(zoom));
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&linear);
        m.fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&Vector3::from(translation));
        Self(m)
    }

    /// Homogeneous diagonal flip, e.g. [`LPS_TO_RAS`].
    pub fn flip(signs: [f64; 3]) -> Self {
        Self(Matrix4::from_diagonal(&nalgebra::Vector4::new(
            signs[0], signs[1], signs[2], 1.0,
        )))
    }

    pub fn from_rows(rows: [[f64; 4]; 4]) -> Self {
        Self(Matrix4::from_fn(|r, c| rows[r][c]))
    }

    /// Build from a row-major slice, which must hold exactly 16 values.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        if values.len() != 16 {
            return Err(Error::dimension(format!(
                "affine must be 4x4, got {} values",
                values.len()
            )));
        }
        Ok(Self(Matrix4::from_row_slice(values)))
    }

    pub fn to_rows(&self) -> [[f64; 4]; 4] {
        let mut rows = [[0.0; 4]; 4];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = self.0[(r, c)];
            }
        }
        rows
    }

    pub fn then(&self, other: &Affine) -> Affine {
        Affine(other.0 * self.0)
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.0
    }

    pub fn linear(&self) -> Matrix3<f64> {
        self.0.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn translation(&self) -> [f64; 3] {
        [self.0[(0, 3)], self.0[(1, 3)], self.0[(2, 3)]]
    }

    /// Per-axis scale: the norms of the linear block's columns.
    pub fn scale(&self) -> [f64; 3] {
        let linear = self.linear();
        [
            linear.column(0).norm(),
            linear.column(1).norm(),
            linear.column(2).norm(),
        ]
    }

    /// Rotation block with the scale divided out.
    pub fn rotation(&self) -> Matrix3<f64> {
        let mut linear = self.linear();
        let scale = self.scale();
        for (c, s) in scale.iter().enumerate() {
            if *s > 0.0 {
                linear.column_mut(c).unscale_mut(*s);
            }
        }
        linear
    }

    /// Split into translation, rotation and scale, failing when the matrix
    /// is not a rigid transform times a positive diagonal scale.
    pub fn decompose(&self) -> Result<([f64; 3], Matrix3<f64>, [f64; 3])> {
        let bottom = self.0.fixed_view::<1, 4>(3, 0);
        if bottom[(0, 0)] != 0.0 || bottom[(0, 1)] != 0.0 || bottom[(0, 2)] != 0.0 || bottom[(0, 3)] != 1.0
        {
            return Err(Error::dimension("affine bottom row must be [0, 0, 0, 1]"));
        }
        let scale = self.scale();
        if scale.iter().any(|s| !s.is_finite() || *s <= 1e-12) {
            return Err(Error::dimension(format!("affine has degenerate scale {scale:?}")));
        }
        let rotation = self.rotation();
        let gram = rotation.transpose() * rotation;
        if (gram - Matrix3::identity()).abs().max() > 1e-4 {
            return Err(Error::dimension("affine rotation block is sheared"));
        }
        Ok((self.translation(), rotation, scale))
    }

    /// Rotation as static-frame XYZ Euler angles in radians.
    pub fn euler(&self) -> [f64; 3] {
        let mut rotation = self.rotation();
        // Improper rotations (a mirrored axis) fold the reflection into z so
        // the remainder is a proper rotation.
        if rotation.determinant() < 0.0 {
            rotation.column_mut(2).neg_mut();
        }
        let (roll, pitch, yaw) = Rotation3::from_matrix_unchecked(rotation).euler_angles();
        [roll, pitch, yaw]
    }
}

impl From<[[f64; 4]; 4]> for Affine {
    fn from(rows: [[f64; 4]; 4]) -> Self {
        Affine::from_rows(rows)
    }
}

impl From<Affine> for [[f64; 4]; 4] {
    fn from(affine: Affine) -> Self {
        affine.to_rows()
    }
}

pub fn direction_array(matrix: &Matrix3<f64>) -> [f64; 9] {
    let mut out = [0.0; 9];
    for r in 0..3 {
        for c in 0..3 {
            out[r * 3 + c] = matrix[(r, c)];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn compose_then_decompose() {
        let rotation = Rotation3::from_euler_angles(0.1, -0.2, 0.3).into_inner();
        let affine = Affine::compose([1.0, 2.0, 3.0], &rotation, [0.5, 2.0, 4.0]);
        let (t, r, z) = affine.decompose().unwrap();
        assert_eq!(t, [1.0, 2.0, 3.0]);
        assert!(close(z[0], 0.5) && close(z[1], 2.0) && close(z[2], 4.0));
        assert!((r - rotation).abs().max() < 1e-9);
        let euler = affine.euler();
        assert!(close(euler[0], 0.1) && close(euler[1], -0.2) && close(euler[2], 0.3));
    }

    #[test]
    fn sheared_matrix_fails_to_decompose() {
        let mut m = Matrix4::identity();
        m[(0, 1)] = 0.5;
        assert!(Affine(m).decompose().is_err());
    }

    #[test]
    fn from_slice_requires_sixteen_values() {
        assert!(Affine::from_slice(&[1.0; 9]).is_err());
        assert!(Affine::from_slice(&[0.0; 16]).is_ok());
    }

    #[test]
    fn flip_then_maps_lps_to_ras() {
        let lps = Affine::compose([10.0, 20.0, 30.0], &Matrix3::identity(), [1.0; 3]);
        let ras = lps.then(&Affine::flip(LPS_TO_RAS));
        assert_eq!(ras.translation(), [-10.0, -20.0, 30.0]);
    }
}
