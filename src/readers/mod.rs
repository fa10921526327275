//! Format readers and the ordered registry that tries them in turn.
//!
//! Each reader turns a [`Source`] into a [`RawVolume`]: the format-native
//! array, a label naming each of its axes, and whatever geometry the format
//! records. The registry tries readers in priority order; a reader failure
//! is logged and the next reader is tried. Only when every reader fails does
//! the caller see an error, listing all attempts.

mod dicom_io;
mod generic;
mod images;
mod mrc;
mod nifti_io;
mod ome_tiff;
pub(crate) mod orient;

pub use self::dicom_io::{DicomSeries, scan_series};
pub use self::generic::GenericReader;
pub use self::mrc::{MrcClass, MrcHeader, MrcReader};
pub use self::ome_tiff::{OmePixels, OmeTiffReader};

use nalgebra::Matrix3;
use ndarray::ArrayD;
use std::path::{Path, PathBuf};

use crate::affine::Affine;
use crate::enums::{Axis, DataType};
use crate::error::{Error, ReaderError, Result};
use crate::progress::Progress;

/// What the pipeline is asked to read: the path the caller gave and, for
/// numbered series, every member file in index order.
#[derive(Clone, Debug)]
pub struct Source {
    pub path: PathBuf,
    pub files: Vec<PathBuf>,
}

impl Source {
    pub fn single(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            files: vec![path.clone()],
            path,
        }
    }

    pub fn sequence(path: impl Into<PathBuf>, files: Vec<PathBuf>) -> Self {
        Self {
            path: path.into(),
            files,
        }
    }

    pub fn is_sequence(&self) -> bool {
        self.files.len() > 1
    }

    /// Lower-cased file name, used for extension matching.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default()
    }

    pub fn has_extension(&self, extensions: &[&str]) -> bool {
        let name = self.file_name();
        extensions.iter().any(|ext| name.ends_with(ext))
    }

    /// Numbered siblings of slice images and NIfTI files stack into one
    /// volume. MRC, OME-TIFF and DICOM files are complete on their own.
    pub fn is_stackable(&self) -> bool {
        if self.has_extension(ome_tiff::EXTENSIONS) {
            return false;
        }
        self.has_extension(images::EXTENSIONS) || self.has_extension(nifti_io::EXTENSIONS)
    }
}

/// Reader options that come from the caller's configuration.
#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    /// DICOM SeriesInstanceUID to load; empty picks the first series.
    pub series_id: String,
}

/// Format-native result of a single reader attempt.
#[derive(Clone, Debug)]
pub struct RawVolume {
    pub data: ArrayD<f32>,
    /// One label per array axis, e.g. `[Z, Y, X]` for an MRC volume.
    pub axes: Vec<Axis>,
    pub dtype: DataType,
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    pub direction: Matrix3<f64>,
    /// Applied after `compose(origin, direction)`; identity unless the
    /// reader converted the world convention.
    pub base_affine: Affine,
    pub name: String,
    pub description: String,
    pub is_oriented: bool,
}

impl RawVolume {
    /// A volume with unit spacing and identity geometry.
    pub fn new(data: ArrayD<f32>, axes: Vec<Axis>, dtype: DataType, name: impl Into<String>) -> Self {
        Self {
            data,
            axes,
            dtype,
            spacing: [1.0; 3],
            origin: [0.0; 3],
            direction: Matrix3::identity(),
            base_affine: Affine::identity(),
            name: name.into(),
            description: String::new(),
            is_oriented: false,
        }
    }

    pub fn with_spacing(mut self, spacing: [f64; 3]) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A format reader.
pub trait VolumeReader: Send + Sync {
    /// Short identifier used in logs and error reports.
    fn name(&self) -> &'static str;

    /// Cheap check whether this reader should attempt the source.
    fn can_read(&self, source: &Source) -> bool;

    fn read(
        &self,
        source: &Source,
        options: &ReadOptions,
        progress: &mut Progress<'_>,
    ) -> Result<RawVolume, ReaderError>;
}

/// Readers in priority order.
pub struct ReaderRegistry {
    readers: Vec<Box<dyn VolumeReader>>,
}

impl ReaderRegistry {
    /// Registry holding the built-in readers: MRC/MAP, OME-TIFF, then the
    /// generic fallback.
    pub fn new() -> Self {
        let mut registry = Self {
            readers: Vec::new(),
        };
        registry.register(Box::new(MrcReader));
        registry.register(Box::new(OmeTiffReader));
        registry.register(Box::new(GenericReader));
        registry
    }

    /// Append a reader with the lowest priority so far.
    pub fn register(&mut self, reader: Box<dyn VolumeReader>) {
        self.readers.push(reader);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.readers.iter().map(|r| r.name()).collect()
    }

    /// Try every reader that accepts the source until one succeeds.
    ///
    /// Cancellation and fatal shape errors raised inside a reader stop the
    /// search immediately.
    pub fn read(
        &self,
        source: &Source,
        options: &ReadOptions,
        progress: &mut Progress<'_>,
    ) -> Result<RawVolume> {
        let mut attempts = Vec::new();
        for reader in &self.readers {
            if !reader.can_read(source) {
                continue;
            }
            log::debug!("trying {} reader on {}", reader.name(), source.path.display());
            match reader.read(source, options, progress) {
                Ok(volume) => {
                    log::info!(
                        "{} reader parsed {} (shape {:?}, axes {:?})",
                        reader.name(),
                        source.path.display(),
                        volume.data.shape(),
                        volume.axes
                    );
                    return Ok(volume);
                }
                Err(ReaderError::Fatal(err)) => return Err(err),
                Err(err) => {
                    log::warn!("{} reader failed: {err}", reader.name());
                    attempts.push((reader.name(), err.to_string()));
                }
            }
        }
        Err(Error::Format {
            path: source.path.clone(),
            attempts,
        })
    }
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory containing `path`, or `path` itself when it is a directory.
pub(crate) fn directory_of(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.to_path_buf()
    } else {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// File name without any extension, used as a fallback layer name.
pub(crate) fn display_name(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("volume");
    name.split('.').next().unwrap_or(name).to_string()
}
