//! Plain 2D raster images and numbered stacks of them.

use image::{ColorType, DynamicImage};
use ndarray::{Array3, Array4, ArrayD, Axis as NdAxis, s};
use std::path::{Path, PathBuf};

use super::RawVolume;
use crate::enums::{Axis, DataType};
use crate::error::ReaderError;
use crate::progress::Progress;

pub(crate) const EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".bmp", ".tif", ".tiff", ".webp", ".gif",
];

fn widen<T: Copy + Into<f32>>(raw: Vec<T>) -> Vec<f32> {
    raw.into_iter().map(Into::into).collect()
}

/// Decode one image into a (Y, X, C) array. Gray images with alpha keep
/// only the gray channel.
pub(crate) fn decode_image(path: &Path) -> Result<(Array3<f32>, DataType), ReaderError> {
    let image = image::open(path)?;
    let (width, height) = (image.width() as usize, image.height() as usize);
    let (values, channels, dtype) = match image.color() {
        ColorType::L8 | ColorType::La8 => (widen(image.to_luma8().into_raw()), 1, DataType::U8),
        ColorType::L16 | ColorType::La16 => (widen(image.to_luma16().into_raw()), 1, DataType::U16),
        ColorType::Rgb8 => (widen(image.to_rgb8().into_raw()), 3, DataType::U8),
        ColorType::Rgba8 => (widen(image.to_rgba8().into_raw()), 4, DataType::U8),
        ColorType::Rgb16 => (widen(image.to_rgb16().into_raw()), 3, DataType::U16),
        ColorType::Rgba16 => (widen(image.to_rgba16().into_raw()), 4, DataType::U16),
        ColorType::Rgb32F => (image.to_rgb32f().into_raw(), 3, DataType::F32),
        _ => (rgba_f32(&image), 4, DataType::F32),
    };
    let array = Array3::from_shape_vec((height, width, channels), values)?;
    Ok((array, dtype))
}

fn rgba_f32(image: &DynamicImage) -> Vec<f32> {
    image.to_rgba32f().into_raw()
}

/// Stack equally-sized slices along Z: the result is (Z, Y, X, C).
pub(crate) fn read_stack(files: &[PathBuf], progress: &mut Progress<'_>) -> Result<(Array4<f32>, DataType), ReaderError> {
    let Some(first) = files.first() else {
        return Err(ReaderError::malformed("empty image sequence"));
    };
    let (first_slice, dtype) = decode_image(first)?;
    let (height, width, channels) = first_slice.dim();
    let mut stack = Array4::<f32>::zeros((files.len(), height, width, channels));
    stack.slice_mut(s![0, .., .., ..]).assign(&first_slice);

    for (z, path) in files.iter().enumerate().skip(1) {
        progress.checkpoint(z as f32 / files.len() as f32, "Reading image slices")?;
        let (slice, _) = decode_image(path)?;
        if slice.dim() != first_slice.dim() {
            log::warn!(
                "{} has shape {:?}, sequence started with {:?}",
                path.display(),
                slice.dim(),
                first_slice.dim()
            );
            return Err(ReaderError::InconsistentDimensions);
        }
        stack.index_axis_mut(NdAxis(0), z).assign(&slice);
    }
    Ok((stack, dtype))
}

pub(crate) fn read_images(
    files: &[PathBuf],
    name: String,
    progress: &mut Progress<'_>,
) -> Result<RawVolume, ReaderError> {
    if files.len() == 1 {
        let (slice, dtype) = decode_image(&files[0])?;
        let data: ArrayD<f32> = slice.into_dyn();
        return Ok(RawVolume::new(data, vec![Axis::Y, Axis::X, Axis::C], dtype, name));
    }
    let (stack, dtype) = read_stack(files, progress)?;
    log::debug!("stacked {} slices into {:?}", files.len(), stack.dim());
    Ok(RawVolume::new(
        stack.into_dyn(),
        vec![Axis::Z, Axis::Y, Axis::X, Axis::C],
        dtype,
        name,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn decodes_gray_and_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let gray_path = dir.path().join("gray.png");
        GrayImage::from_fn(3, 2, |x, y| Luma([(x + 10 * y) as u8]))
            .save(&gray_path)
            .unwrap();
        let (gray, dtype) = decode_image(&gray_path).unwrap();
        assert_eq!(gray.dim(), (2, 3, 1));
        assert_eq!(gray[[1, 2, 0]], 12.0);
        assert_eq!(dtype, DataType::U8);

        let rgb_path = dir.path().join("rgb.png");
        RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])).save(&rgb_path).unwrap();
        let (rgb, _) = decode_image(&rgb_path).unwrap();
        assert_eq!(rgb.dim(), (2, 2, 3));
        assert_eq!(rgb[[0, 1, 2]], 3.0);
    }

    #[test]
    fn stack_rejects_mismatched_slices() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("s_1.png");
        let b = dir.path().join("s_2.png");
        GrayImage::new(4, 4).save(&a).unwrap();
        GrayImage::new(5, 4).save(&b).unwrap();
        assert!(read_stack(&[a, b], &mut Progress::none()).is_err());
    }
}
