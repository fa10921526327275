//! NIfTI-1 volumes (`.nii`, `.nii.gz`).
//!
//! NIfTI stores RAS world coordinates; geometry is converted to LPS here so
//! every oriented source reaches the reorientation step in one convention.

use nalgebra::{Matrix3, Vector3};
use ndarray::{ArrayD, Axis as NdAxis};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::{Path, PathBuf};

use super::orient::Geometry;
use super::{RawVolume, display_name};
use crate::affine::LPS_TO_RAS;
use crate::enums::{Axis, DataType};
use crate::error::{Error, ReaderError};
use crate::progress::Progress;

pub(crate) const EXTENSIONS: &[&str] = &[".nii", ".nii.gz"];

/// Index → RAS world rows, from sform, then qform, then pixdim.
fn ras_affine(header: &NiftiHeader) -> [[f64; 4]; 3] {
    let widen = |row: [f32; 4]| row.map(f64::from);
    if header.sform_code > 0 {
        return [widen(header.srow_x), widen(header.srow_y), widen(header.srow_z)];
    }
    let dx = header.pixdim[1] as f64;
    let dy = header.pixdim[2] as f64;
    let dz = header.pixdim[3] as f64;
    if header.qform_code > 0 {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let r = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - c * c - b * b],
        ];
        let offset = [
            header.quatern_x as f64,
            header.quatern_y as f64,
            header.quatern_z as f64,
        ];
        let mut rows = [[0.0; 4]; 3];
        for i in 0..3 {
            rows[i] = [r[i][0] * dx, r[i][1] * dy, r[i][2] * dz * qfac, offset[i]];
        }
        return rows;
    }
    [[dx, 0.0, 0.0, 0.0], [0.0, dy, 0.0, 0.0], [0.0, 0.0, dz, 0.0]]
}

/// Spacing, LPS origin and LPS direction of the header's spatial axes.
pub(crate) fn lps_geometry(header: &NiftiHeader) -> Geometry {
    let rows = ras_affine(header);
    let mut spacing = [1.0; 3];
    let mut direction = Matrix3::identity();
    for axis in 0..3 {
        let column = Vector3::new(rows[0][axis], rows[1][axis], rows[2][axis]);
        let norm = column.norm();
        if norm > 1e-9 {
            spacing[axis] = norm;
            direction.set_column(axis, &(column / norm));
        }
    }
    let flip = Matrix3::from_diagonal(&Vector3::from(LPS_TO_RAS));
    let origin = [
        rows[0][3] * LPS_TO_RAS[0],
        rows[1][3] * LPS_TO_RAS[1],
        rows[2][3] * LPS_TO_RAS[2],
    ];
    Geometry {
        spacing,
        origin,
        direction: flip * direction,
    }
}

fn data_type(header: &NiftiHeader) -> DataType {
    if header.scl_slope != 0.0 && (header.scl_slope != 1.0 || header.scl_inter != 0.0) {
        return DataType::F32;
    }
    match header.datatype {
        1 => DataType::Bool,
        2 => DataType::U8,
        4 => DataType::I16,
        8 => DataType::I32,
        256 => DataType::I8,
        512 => DataType::U16,
        768 => DataType::U32,
        64 => DataType::F64,
        _ => DataType::F32,
    }
}

fn axes_for(ndim: usize) -> Result<Vec<Axis>, ReaderError> {
    match ndim {
        1 => Ok(vec![Axis::X]),
        2 => Ok(vec![Axis::X, Axis::Y]),
        3 => Ok(vec![Axis::X, Axis::Y, Axis::Z]),
        4 => Ok(vec![Axis::X, Axis::Y, Axis::Z, Axis::T]),
        5 => Ok(vec![Axis::X, Axis::Y, Axis::Z, Axis::T, Axis::C]),
        n => Err(Error::TooManyDimensions(n).into()),
    }
}

fn read_one(path: &Path) -> Result<(ArrayD<f32>, NiftiHeader), ReaderError> {
    let object = ReaderOptions::new().read_file(path)?;
    let header = object.header().clone();
    let data = object.into_volume().into_ndarray::<f32>()?;
    Ok((data, header))
}

/// Read one NIfTI file, or a numbered series of 3D files stacked as frames.
pub(crate) fn read_nifti(
    files: &[PathBuf],
    progress: &mut Progress<'_>,
) -> Result<(RawVolume, Geometry), ReaderError> {
    let Some(first) = files.first() else {
        return Err(ReaderError::malformed("empty NIfTI sequence"));
    };
    progress.checkpoint(0.0, "Reading NIfTI")?;
    let (data, header) = read_one(first)?;
    let geometry = lps_geometry(&header);
    let dtype = data_type(&header);
    let name = display_name(first);

    if files.len() == 1 {
        let axes = axes_for(data.ndim())?;
        return Ok((RawVolume::new(data, axes, dtype, name), geometry));
    }

    if data.ndim() != 3 {
        return Err(ReaderError::unsupported(format!(
            "sequence members must be 3D, {} has {} axes",
            first.display(),
            data.ndim()
        )));
    }
    let mut frames = vec![data];
    for (i, path) in files.iter().enumerate().skip(1) {
        progress.checkpoint(i as f32 / files.len() as f32, "Reading NIfTI frames")?;
        let (frame, _) = read_one(path)?;
        if frame.shape() != frames[0].shape() {
            return Err(ReaderError::InconsistentDimensions);
        }
        frames.push(frame);
    }
    let views: Vec<_> = frames.iter().map(|f| f.view()).collect();
    let stacked = ndarray::stack(NdAxis(0), &views)?;
    let axes = vec![Axis::T, Axis::X, Axis::Y, Axis::Z];
    Ok((RawVolume::new(stacked, axes, dtype, name), geometry))
}
