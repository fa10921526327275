//! Conversion of reader output into the canonical (Frame, X, Y, Z, Channel)
//! tensor and its metadata.

use ndarray::{Array5, IxDyn};
use serde::{Deserialize, Serialize};

use crate::affine::Affine;
use crate::enums::{Axis, DataType};
use crate::error::{Error, Result};
use crate::readers::RawVolume;

const CANONICAL: [Axis; 5] = [Axis::T, Axis::X, Axis::Y, Axis::Z, Axis::C];

/// Metadata returned by [`crate::parse`] next to the canonical tensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedMetadata {
    pub name: String,
    pub description: String,
    pub spacing: [f64; 3],
    /// Voxel index → world, without the spacing scale.
    pub affine: Affine,
    pub xyz_shape: [usize; 3],
    pub frame_count: usize,
    pub channel_count: usize,
    pub dtype: DataType,
    pub is_oriented: bool,
}

fn check_axes(raw: &RawVolume) -> Result<()> {
    let ndim = raw.data.ndim();
    if ndim > 5 {
        return Err(Error::TooManyDimensions(ndim));
    }
    if raw.axes.len() != ndim {
        return Err(Error::dimension(format!(
            "{} axis labels for a {ndim}-d array",
            raw.axes.len()
        )));
    }
    for (i, axis) in raw.axes.iter().enumerate() {
        if raw.axes[..i].contains(axis) {
            return Err(Error::dimension(format!("axis {axis:?} appears twice in {:?}", raw.axes)));
        }
    }
    Ok(())
}

fn sanitize_spacing(spacing: [f64; 3]) -> [f64; 3] {
    spacing.map(|s| {
        if s.is_finite() && s > 0.0 {
            s
        } else {
            log::warn!("invalid voxel spacing {s}, using 1.0");
            1.0
        }
    })
}

/// Transpose `raw` into (Frame, X, Y, Z, Channel), inserting unit axes for
/// labels the source does not have, and compose its affine.
pub fn canonicalize(raw: RawVolume) -> Result<(Array5<f32>, ParsedMetadata)> {
    check_axes(&raw)?;

    let mut order: Vec<usize> = (0..raw.axes.len()).collect();
    order.sort_by_key(|&k| raw.axes[k].canonical_index());
    let mut shape = [1usize; 5];
    for &k in &order {
        shape[raw.axes[k].canonical_index()] = raw.data.shape()[k];
    }

    let permuted = raw.data.permuted_axes(IxDyn(&order));
    let tensor: Array5<f32> = permuted.to_shape(shape)?.into_owned();

    let affine = Affine::compose(raw.origin, &raw.direction, [1.0; 3]).then(&raw.base_affine);
    affine.decompose()?;

    let metadata = ParsedMetadata {
        name: raw.name,
        description: raw.description,
        spacing: sanitize_spacing(raw.spacing),
        affine,
        xyz_shape: [shape[1], shape[2], shape[3]],
        frame_count: shape[0],
        channel_count: shape[4],
        dtype: raw.dtype,
        is_oriented: raw.is_oriented,
    };
    log::debug!(
        "canonical tensor {:?} from axes {:?}",
        tensor.shape(),
        CANONICAL
            .iter()
            .filter(|a| raw.axes.contains(a))
            .collect::<Vec<_>>()
    );
    Ok((tensor, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affine::LPS_TO_RAS;
    use nalgebra::{Matrix3, Vector3};
    use ndarray::{Array3, Array4};

    #[test]
    fn zyx_volume_becomes_single_frame() {
        let data = Array3::from_shape_fn((4, 3, 2), |(z, y, x)| (z * 100 + y * 10 + x) as f32);
        let raw = RawVolume::new(data.into_dyn(), vec![Axis::Z, Axis::Y, Axis::X], DataType::I16, "map")
            .with_spacing([0.5, 0.5, 2.0]);
        let (tensor, metadata) = canonicalize(raw).unwrap();
        assert_eq!(tensor.shape(), &[1, 2, 3, 4, 1]);
        assert_eq!(tensor[[0, 1, 2, 3, 0]], 321.0);
        assert_eq!(metadata.xyz_shape, [2, 3, 4]);
        assert_eq!(metadata.spacing, [0.5, 0.5, 2.0]);
        assert_eq!(metadata.affine, Affine::identity());
    }

    #[test]
    fn frames_and_channels_move_to_the_ends() {
        // (C, T, Y, X) as an unusual reader might report it.
        let data = Array4::from_shape_fn((2, 3, 4, 5), |(c, t, y, x)| (c * 1000 + t * 100 + y * 10 + x) as f32);
        let raw = RawVolume::new(
            data.into_dyn(),
            vec![Axis::C, Axis::T, Axis::Y, Axis::X],
            DataType::U8,
            "stack",
        );
        let (tensor, metadata) = canonicalize(raw).unwrap();
        assert_eq!(tensor.shape(), &[3, 5, 4, 1, 2]);
        assert_eq!(tensor[[2, 4, 3, 0, 1]], 1234.0);
        assert_eq!(metadata.frame_count, 3);
        assert_eq!(metadata.channel_count, 2);
    }

    #[test]
    fn base_affine_premultiplies_geometry() {
        let direction = Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0));
        let mut raw = RawVolume::new(
            Array3::<f32>::zeros((2, 2, 2)).into_dyn(),
            vec![Axis::X, Axis::Y, Axis::Z],
            DataType::I16,
            "ct",
        );
        raw.direction = direction;
        raw.origin = [10.0, 20.0, 30.0];
        raw.base_affine = Affine::flip(LPS_TO_RAS);
        let (_, metadata) = canonicalize(raw).unwrap();
        assert_eq!(metadata.affine.rotation(), Matrix3::identity());
        assert_eq!(metadata.affine.translation(), [-10.0, -20.0, 30.0]);
    }

    #[test]
    fn rejects_duplicate_labels() {
        let raw = RawVolume::new(
            Array3::<f32>::zeros((2, 2, 2)).into_dyn(),
            vec![Axis::X, Axis::X, Axis::Z],
            DataType::F32,
            "bad",
        );
        assert!(matches!(canonicalize(raw), Err(Error::Dimension(_))));
    }
}
