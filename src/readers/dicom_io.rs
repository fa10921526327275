use crate::enums::{Axis, DataType};
use crate::error::ReaderError;
use crate::progress::Progress;

use super::RawVolume;
use super::orient::Geometry;

use dicom::{
    object::{DefaultDicomObject, OpenFileOptions, open_file},
    pixeldata::PixelDecoder,
};
use dicom_dictionary_std::tags;
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array3, Array4, s};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// One series found while scanning a directory.
#[derive(Clone, Debug, Default)]
pub struct DicomSeries {
    pub series_instance_uid: String,
    pub series_description: Option<String>,
    pub study_description: Option<String>,
    pub modality: String,
    pub patient_id: String,
    pub file_paths: Vec<PathBuf>,
}

impl DicomSeries {
    /// Layer name: series description, then study description, then the
    /// directory name.
    pub fn display_name(&self, directory: &Path) -> String {
        self.series_description
            .clone()
            .or_else(|| self.study_description.clone())
            .unwrap_or_else(|| {
                directory
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("DICOM")
                    .to_string()
            })
    }

    pub fn description(&self) -> String {
        self.study_description
            .clone()
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

fn get_string(object: &DefaultDicomObject, tag: dicom::core::Tag) -> Option<String> {
    let value = object.element(tag).ok()?.to_str().ok()?;
    let value = value.trim().trim_end_matches('\0').to_string();
    (!value.is_empty()).then_some(value)
}

fn get_floats(object: &DefaultDicomObject, tag: dicom::core::Tag) -> Option<Vec<f64>> {
    object.element(tag).ok()?.to_multi_float64().ok()
}

fn get_position(object: &DefaultDicomObject) -> Option<Vector3<f64>> {
    let position = get_floats(object, tags::IMAGE_POSITION_PATIENT)?;
    (position.len() == 3).then(|| Vector3::new(position[0], position[1], position[2]))
}

/// Group every readable DICOM file in `directory` by SeriesInstanceUID.
/// Headers are read in parallel, up to the pixel data.
pub fn scan_series(directory: &Path) -> Result<Vec<DicomSeries>, ReaderError> {
    let paths: Vec<PathBuf> = fs::read_dir(directory)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();

    let headers: Vec<(PathBuf, DefaultDicomObject)> = paths
        .into_par_iter()
        .filter_map(|path| {
            let object = OpenFileOptions::new()
                .read_until(tags::PIXEL_DATA)
                .open_file(&path)
                .ok()?;
            Some((path, object))
        })
        .collect();

    let mut series: BTreeMap<String, DicomSeries> = BTreeMap::new();
    for (path, object) in headers {
        let Some(uid) = get_string(&object, tags::SERIES_INSTANCE_UID) else {
            continue;
        };
        let entry = series.entry(uid.clone()).or_insert_with(|| DicomSeries {
            series_instance_uid: uid,
            series_description: get_string(&object, tags::SERIES_DESCRIPTION),
            study_description: get_string(&object, tags::STUDY_DESCRIPTION),
            modality: get_string(&object, tags::MODALITY).unwrap_or_default(),
            patient_id: get_string(&object, tags::PATIENT_ID).unwrap_or_default(),
            file_paths: Vec::new(),
        });
        entry.file_paths.push(path);
    }

    let mut series: Vec<DicomSeries> = series.into_values().collect();
    for s in &mut series {
        s.file_paths.sort();
    }
    log::debug!("found {} DICOM series in {}", series.len(), directory.display());
    Ok(series)
}

/// Pick the series with `series_id`, or the first one when the id is empty.
pub(crate) fn select_series(series: Vec<DicomSeries>, series_id: &str) -> Result<DicomSeries, ReaderError> {
    if series_id.is_empty() {
        return series
            .into_iter()
            .next()
            .ok_or_else(|| ReaderError::malformed("No valid DICOM images found"));
    }
    series
        .into_iter()
        .find(|s| s.series_instance_uid == series_id)
        .ok_or_else(|| ReaderError::malformed(format!("series '{series_id}' not found")))
}

struct Slice {
    order: Option<f64>,
    instance: Option<i32>,
    position: Option<Vector3<f64>>,
    pixels: Array3<f32>,
}

fn slice_normal(object: &DefaultDicomObject) -> Option<(Vector3<f64>, Vector3<f64>, Vector3<f64>)> {
    let orientation = get_floats(object, tags::IMAGE_ORIENTATION_PATIENT)?;
    if orientation.len() != 6 {
        return None;
    }
    let row = Vector3::new(orientation[0], orientation[1], orientation[2]).normalize();
    let column = Vector3::new(orientation[3], orientation[4], orientation[5]).normalize();
    let normal = row.cross(&column).normalize();
    Some((row, column, normal))
}

fn decode_slice(object: &DefaultDicomObject) -> Result<Array3<f32>, ReaderError> {
    let pixel_data = object
        .decode_pixel_data()
        .map_err(|e| ReaderError::Dicom(e.to_string()))?;
    let frames = pixel_data
        .to_ndarray::<f32>()
        .map_err(|e| ReaderError::Dicom(e.to_string()))?;
    // Multi-frame objects contribute their first frame only.
    Ok(frames.slice_move(s![0, .., .., ..]))
}

fn data_type(object: &DefaultDicomObject) -> DataType {
    let slope = get_floats(object, tags::RESCALE_SLOPE).and_then(|v| v.first().copied());
    let intercept = get_floats(object, tags::RESCALE_INTERCEPT).and_then(|v| v.first().copied());
    let rescaled = slope.is_some_and(|s| s != 1.0) || intercept.is_some_and(|i| i != 0.0);
    if rescaled {
        let integral = slope.unwrap_or(1.0).fract() == 0.0 && intercept.unwrap_or(0.0).fract() == 0.0;
        return if integral { DataType::I32 } else { DataType::F32 };
    }
    let bits = object
        .element(tags::BITS_ALLOCATED)
        .ok()
        .and_then(|e| e.to_int::<u16>().ok())
        .unwrap_or(16);
    let signed = object
        .element(tags::PIXEL_REPRESENTATION)
        .ok()
        .and_then(|e| e.to_int::<u16>().ok())
        .unwrap_or(0)
        == 1;
    match (bits, signed) {
        (8, false) => DataType::U8,
        (8, true) => DataType::I8,
        (16, false) => DataType::U16,
        (16, true) => DataType::I16,
        (32, false) => DataType::U32,
        (32, true) => DataType::I32,
        _ => DataType::F32,
    }
}

fn sort_slices(slices: &mut [Slice]) {
    if slices.iter().all(|slice| slice.order.is_some()) {
        slices.sort_by(|a, b| a.order.partial_cmp(&b.order).unwrap_or(std::cmp::Ordering::Equal));
    } else if slices.iter().all(|slice| slice.instance.is_some()) {
        slices.sort_by_key(|slice| slice.instance);
    }
}

fn validate_dimensions(slices: &[Slice]) -> Result<(), ReaderError> {
    let first_dim = slices[0].pixels.dim();
    if slices.iter().any(|slice| slice.pixels.dim() != first_dim) {
        return Err(ReaderError::InconsistentDimensions);
    }
    Ok(())
}

/// (Z, Y, X, C) stack in slice order.
fn build_volume_array(slices: &[Slice]) -> Array4<f32> {
    let (height, width, samples) = slices[0].pixels.dim();
    let depth = slices.len();
    let mut volume = Array4::<f32>::zeros((depth, height, width, samples));

    for (i, slice) in slices.iter().enumerate() {
        volume.slice_mut(s![i, .., .., ..]).assign(&slice.pixels);
    }

    volume
}

/// In-plane spacing (x, y) and slice spacing from the sorted positions,
/// falling back to SliceThickness, then 1.
fn get_spacing(
    pixel_spacing: Option<Vec<f64>>,
    slice_thickness: Option<f64>,
    slices: &[Slice],
    normal: Vector3<f64>,
) -> [f64; 3] {
    let (dx, dy) = match pixel_spacing {
        Some(ps) if ps.len() == 2 => (ps[1], ps[0]),
        _ => (1.0, 1.0),
    };
    let positions: Vec<Vector3<f64>> = slices.iter().filter_map(|s| s.position).collect();
    let dz = if positions.len() == slices.len() && positions.len() > 1 {
        let total: f64 = positions
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).dot(&normal).abs())
            .sum();
        total / (positions.len() - 1) as f64
    } else {
        slice_thickness.unwrap_or(1.0)
    };
    let positive = |v: f64| if v.is_finite() && v > 0.0 { v } else { 1.0 };
    [positive(dx), positive(dy), positive(dz)]
}

/// Load one series into a (Z, Y, X, C) volume with LPS geometry.
pub(crate) fn load_series(
    series: &DicomSeries,
    directory: &Path,
    progress: &mut Progress<'_>,
) -> Result<(RawVolume, Geometry), ReaderError> {
    if series.file_paths.is_empty() {
        return Err(ReaderError::malformed("No valid DICOM images found"));
    }
    progress.checkpoint(0.0, "Reading DICOM series")?;
    let objects: Vec<DefaultDicomObject> = series
        .file_paths
        .par_iter()
        .map(|path| open_file(path))
        .collect::<Result<_, _>>()?;

    let first = &objects[0];
    let (row, column, normal) = slice_normal(first).unwrap_or_else(|| {
        log::warn!("ImageOrientationPatient missing, assuming axial slices");
        (Vector3::x(), Vector3::y(), Vector3::z())
    });

    let total = objects.len();
    let mut slices = Vec::with_capacity(total);
    for (i, object) in objects.iter().enumerate() {
        progress.checkpoint(i as f32 / total as f32, "Decoding DICOM slices")?;
        let position = get_position(object);
        slices.push(Slice {
            order: position.map(|p| p.dot(&normal)),
            instance: object
                .element(tags::INSTANCE_NUMBER)
                .ok()
                .and_then(|e| e.to_int::<i32>().ok()),
            position,
            pixels: decode_slice(object)?,
        });
    }
    sort_slices(&mut slices);
    validate_dimensions(&slices)?;

    let spacing = get_spacing(
        get_floats(first, tags::PIXEL_SPACING),
        get_floats(first, tags::SLICE_THICKNESS).and_then(|v| v.first().copied()),
        &slices,
        normal,
    );
    let origin = slices[0].position.unwrap_or_else(Vector3::zeros);
    let geometry = Geometry {
        spacing,
        origin: [origin.x, origin.y, origin.z],
        direction: Matrix3::from_columns(&[row, column, normal]),
    };

    let volume = build_volume_array(&slices);
    log::info!(
        "DICOM series {} ({}): {} slices, spacing {:?}",
        series.series_instance_uid,
        series.modality,
        slices.len(),
        spacing
    );
    let raw = RawVolume::new(
        volume.into_dyn(),
        vec![Axis::Z, Axis::Y, Axis::X, Axis::C],
        data_type(first),
        series.display_name(directory),
    )
    .with_description(series.description());
    Ok((raw, geometry))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(order: Option<f64>, instance: Option<i32>) -> Slice {
        Slice {
            order,
            instance,
            position: order.map(|z| Vector3::new(0.0, 0.0, z)),
            pixels: Array3::zeros((2, 2, 1)),
        }
    }

    #[test]
    fn sorts_by_position_then_instance() {
        let mut slices = vec![slice(Some(3.0), Some(1)), slice(Some(1.0), Some(3)), slice(Some(2.0), Some(2))];
        sort_slices(&mut slices);
        let order: Vec<_> = slices.iter().map(|s| s.order.unwrap()).collect();
        assert_eq!(order, vec![1.0, 2.0, 3.0]);

        let mut slices = vec![slice(None, Some(2)), slice(None, Some(1))];
        sort_slices(&mut slices);
        assert_eq!(slices[0].instance, Some(1));
    }

    #[test]
    fn names_fall_back_to_directory() {
        let series = DicomSeries::default();
        assert_eq!(series.display_name(Path::new("/data/ct_head")), "ct_head");
        assert_eq!(series.description(), "Unknown");

        let described = DicomSeries {
            study_description: Some("Head".into()),
            ..Default::default()
        };
        assert_eq!(described.display_name(Path::new("/x")), "Head");
    }

    #[test]
    fn selects_series_by_uid() {
        let series = vec![
            DicomSeries {
                series_instance_uid: "1.2.3".into(),
                ..Default::default()
            },
            DicomSeries {
                series_instance_uid: "1.2.4".into(),
                ..Default::default()
            },
        ];
        assert_eq!(select_series(series.clone(), "").unwrap().series_instance_uid, "1.2.3");
        assert_eq!(select_series(series.clone(), "1.2.4").unwrap().series_instance_uid, "1.2.4");
        assert!(select_series(series, "9.9").is_err());
    }

    #[test]
    fn slice_spacing_from_positions() {
        let slices = vec![slice(Some(0.0), None), slice(Some(2.5), None), slice(Some(5.0), None)];
        let spacing = get_spacing(Some(vec![0.7, 0.5]), Some(9.0), &slices, Vector3::z());
        assert_eq!(spacing, [0.5, 0.7, 2.5]);

        let lone = vec![slice(None, None)];
        assert_eq!(get_spacing(None, Some(3.0), &lone, Vector3::z()), [1.0, 1.0, 3.0]);
    }
}
