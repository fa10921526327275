//! Hand-off of layers to the on-disk render cache.
//!
//! The cache format only stores non-negative values, so scalar layers with
//! negative values are shifted by a recorded offset before writing and
//! shifted back when read.

use ndarray::{Array4, ArrayView4, Axis as NdAxis};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::affine::Affine;
use crate::enums::Kind;
use crate::error::Result;
use crate::layer::Layer;
use crate::progress::Progress;

/// Per-frame (X, Y, Z, Channel) data ready for a [`CacheWriter`].
#[derive(Clone, Debug)]
pub struct CacheVolume {
    pub name: String,
    pub frames: Vec<Array4<f32>>,
    pub affine: Affine,
    pub kind: Kind,
    /// Added to every value before caching.
    pub value_offset: f32,
}

impl CacheVolume {
    pub fn from_layer(layer: &Layer) -> Self {
        let min = layer.min();
        let value_offset = if layer.kind() == Kind::Scalar && min < 0.0 {
            -min
        } else {
            0.0
        };
        let frames = layer
            .data()
            .axis_iter(NdAxis(0))
            .map(|frame| {
                if value_offset == 0.0 {
                    frame.to_owned()
                } else {
                    frame.mapv(|v| v + value_offset)
                }
            })
            .collect();
        Self {
            name: layer.name().to_string(),
            frames,
            affine: *layer.affine(),
            kind: layer.kind(),
            value_offset,
        }
    }

    /// Original values of one cached frame.
    pub fn restore_values(frame: &mut Array4<f32>, value_offset: f32) {
        if value_offset != 0.0 {
            frame.mapv_inplace(|v| v - value_offset);
        }
    }

    /// Write every frame through `writer` into `cache_dir`.
    pub fn write(
        &self,
        writer: &mut dyn CacheWriter,
        cache_dir: &Path,
        progress: &mut Progress<'_>,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(cache_dir)?;
        let total = self.frames.len();
        let mut paths = Vec::with_capacity(total);
        for (index, frame) in self.frames.iter().enumerate() {
            progress.checkpoint(index as f32 / total as f32, "Writing cache")?;
            let path = cache_path(cache_dir, &self.name, index);
            writer.write_frame(&path, frame.view(), &self.affine, self.kind, self.value_offset)?;
            paths.push(path);
        }
        log::info!("cached {} frames of {} in {}", total, self.name, cache_dir.display());
        Ok(paths)
    }
}

/// Consumer of cached frames, implemented by the render cache format.
pub trait CacheWriter {
    fn write_frame(
        &mut self,
        path: &Path,
        frame: ArrayView4<'_, f32>,
        affine: &Affine,
        kind: Kind,
        value_offset: f32,
    ) -> Result<()>;
}

/// File for frame `index` of layer `name` inside `cache_dir`.
pub fn cache_path(cache_dir: &Path, name: &str, index: usize) -> PathBuf {
    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    cache_dir.join(format!("{safe}_{index:04}.raw"))
}

/// Writes frames as headerless little-endian `f32` in (X, Y, Z, C) C order.
#[derive(Debug, Default)]
pub struct RawCacheWriter;

impl CacheWriter for RawCacheWriter {
    fn write_frame(
        &mut self,
        path: &Path,
        frame: ArrayView4<'_, f32>,
        _affine: &Affine,
        _kind: Kind,
        _value_offset: f32,
    ) -> Result<()> {
        let words: Vec<u32> = frame.iter().map(|v| v.to_bits().to_le()).collect();
        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(bytemuck::cast_slice(&words))?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::DataType;
    use ndarray::Array5;

    fn scalar(min: f32) -> Layer {
        let data = Array5::from_shape_fn((2, 2, 2, 2, 1), |(t, x, _, _, _)| min + (t + x) as f32);
        Layer::new(data, Affine::identity(), Kind::Scalar, "ct scan", DataType::I16).unwrap()
    }

    #[test]
    fn negative_scalars_are_shifted() {
        let layer = scalar(-1000.0);
        let volume = CacheVolume::from_layer(&layer);
        assert_eq!(volume.value_offset, 1000.0);
        assert_eq!(volume.frames.len(), 2);
        assert!(volume.frames.iter().all(|f| f.iter().all(|v| *v >= 0.0)));

        let mut frame = volume.frames[1].clone();
        CacheVolume::restore_values(&mut frame, volume.value_offset);
        assert_eq!(frame, layer.data().index_axis(NdAxis(0), 1));
    }

    #[test]
    fn labels_are_never_shifted() {
        let data = Array5::from_elem((1, 2, 2, 2, 1), -1.0f32);
        let layer = Layer::new(data, Affine::identity(), Kind::Label, "seg", DataType::I8).unwrap();
        assert_eq!(CacheVolume::from_layer(&layer).value_offset, 0.0);
        assert_eq!(CacheVolume::from_layer(&scalar(3.0)).value_offset, 0.0);
    }

    #[test]
    fn raw_writer_emits_one_file_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let volume = CacheVolume::from_layer(&scalar(-2.0));
        let paths = volume
            .write(&mut RawCacheWriter, dir.path(), &mut Progress::none())
            .unwrap();
        assert_eq!(paths[0], dir.path().join("ct_scan_0000.raw"));
        let bytes = fs::read(&paths[1]).unwrap();
        assert_eq!(bytes.len(), 8 * 4);
        let first = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(first, 1.0);
    }
}
