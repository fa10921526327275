//! Fallback reader: DICOM series directories, NIfTI files and plain image
//! files or numbered image sequences.

use std::path::Path;

use super::dicom_io::{load_series, scan_series, select_series};
use super::images::{self, read_images};
use super::nifti_io::{self, read_nifti};
use super::orient::{Geometry, reorient};
use super::{RawVolume, ReadOptions, Source, VolumeReader, directory_of, display_name};
use crate::affine::{Affine, LPS_TO_RAS};
use crate::enums::Axis;
use crate::error::{Error, ReaderError};
use crate::progress::Progress;

const DICOM_EXTENSIONS: &[&str] = &[".dcm", ".dicom", ".ima"];

pub struct GenericReader;

impl GenericReader {
    fn is_dicom(source: &Source) -> bool {
        source.path.is_dir() || source.has_extension(DICOM_EXTENSIONS)
    }

    fn read_dicom(directory: &Path, options: &ReadOptions, progress: &mut Progress<'_>) -> Result<RawVolume, ReaderError> {
        let series = scan_series(directory)?;
        log::debug!("found {} DICOM series in {}", series.len(), directory.display());
        let series = select_series(series, &options.series_id)?;
        let (raw, geometry) = load_series(&series, directory, &mut progress.sub(0.0, 0.9))?;
        Ok(Self::apply_geometry(raw, geometry))
    }

    /// Attach LPS geometry to an oriented source.
    ///
    /// Volumes with three spatial axes and no frame axis are reoriented
    /// and receive the LPS→RAS flip as their base affine. Multi-frame
    /// volumes keep their voxel order and the spatial 3×3 block of the
    /// direction.
    fn apply_geometry(raw: RawVolume, geometry: Geometry) -> RawVolume {
        let spatial = raw
            .axes
            .iter()
            .filter(|a| matches!(a, Axis::X | Axis::Y | Axis::Z))
            .count();
        let has_frames = raw.axes.contains(&Axis::T);

        if spatial == 3 && !has_frames {
            let (data, axes, geometry) = reorient(raw.data, &raw.axes, &geometry);
            return RawVolume {
                data,
                axes,
                spacing: geometry.spacing,
                origin: geometry.origin,
                direction: geometry.direction,
                base_affine: Affine::flip(LPS_TO_RAS),
                is_oriented: true,
                ..raw
            };
        }

        if has_frames {
            log::debug!("multi-frame source keeps native voxel order");
        }
        RawVolume {
            spacing: geometry.spacing,
            origin: geometry.origin,
            direction: geometry.direction,
            ..raw
        }
    }
}

impl VolumeReader for GenericReader {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn can_read(&self, _source: &Source) -> bool {
        true
    }

    fn read(
        &self,
        source: &Source,
        options: &ReadOptions,
        progress: &mut Progress<'_>,
    ) -> Result<RawVolume, ReaderError> {
        let raw = if Self::is_dicom(source) {
            Self::read_dicom(&directory_of(&source.path), options, progress)?
        } else if source.has_extension(nifti_io::EXTENSIONS) {
            let (raw, geometry) = read_nifti(&source.files, progress)?;
            Self::apply_geometry(raw, geometry)
        } else if source.has_extension(images::EXTENSIONS) {
            read_images(&source.files, display_name(&source.path), progress)?
        } else {
            return Err(ReaderError::unsupported(format!(
                "no decoder for {}",
                source.path.display()
            )));
        };

        if raw.data.ndim() > 5 {
            return Err(Error::TooManyDimensions(raw.data.ndim()).into());
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::DataType;
    use nalgebra::{Matrix3, Vector3};
    use ndarray::{ArrayD, IxDyn};

    fn geometry() -> Geometry {
        Geometry {
            spacing: [1.0, 2.0, 3.0],
            origin: [0.0; 3],
            direction: Matrix3::identity(),
        }
    }

    #[test]
    fn oriented_volume_gets_flip() {
        let data = ArrayD::<f32>::zeros(IxDyn(&[2, 2, 2]));
        let raw = RawVolume::new(data, vec![Axis::X, Axis::Y, Axis::Z], DataType::I16, "ct");
        let raw = GenericReader::apply_geometry(raw, geometry());
        assert!(raw.is_oriented);
        assert_eq!(raw.base_affine, Affine::flip(LPS_TO_RAS));
        assert_eq!(raw.direction, Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0)));
    }

    #[test]
    fn multi_frame_volume_is_not_reoriented() {
        let data = ArrayD::<f32>::zeros(IxDyn(&[2, 2, 2, 3]));
        let raw = RawVolume::new(data, vec![Axis::X, Axis::Y, Axis::Z, Axis::T], DataType::F32, "fmri");
        let raw = GenericReader::apply_geometry(raw, geometry());
        assert!(!raw.is_oriented);
        assert_eq!(raw.direction, Matrix3::identity());
        assert_eq!(raw.spacing, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = GenericReader
            .read(&Source::single("volume.xyz"), &ReadOptions::default(), &mut Progress::none())
            .unwrap_err();
        assert!(matches!(err, ReaderError::Unsupported(_)));
    }
}
