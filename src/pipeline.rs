//! The `parse` entry point and its configuration.

use ndarray::Array5;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use web_time::Instant;

use crate::cache::{CacheVolume, CacheWriter};
use crate::canonical::{ParsedMetadata, canonicalize};
use crate::enums::Kind;
use crate::error::{Error, Result};
use crate::layer::Layer;
use crate::progress::{CancellationToken, Progress, ProgressCallback};
use crate::readers::{ReadOptions, ReaderRegistry, Source, VolumeReader};
use crate::sequence::collect_sequence;

/// Everything a parse needs besides the path.
#[derive(Default)]
pub struct PipelineConfig {
    /// DICOM SeriesInstanceUID; empty selects the first series.
    pub series_id: String,
    /// Where [`cache_layer`] writes frames.
    pub cache_dir: Option<PathBuf>,
    progress: Option<ProgressCallback>,
    cancel: Option<CancellationToken>,
    registry: ReaderRegistry,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("series_id", &self.series_id)
            .field("cache_dir", &self.cache_dir)
            .field("has_progress", &self.progress.is_some())
            .field("cancel", &self.cancel)
            .field("readers", &self.registry.names())
            .finish()
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn series_id(mut self, series_id: impl Into<String>) -> Self {
        self.series_id = series_id.into();
        self
    }

    pub fn cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    /// Callback receiving `(fraction, message)`; returning `false` cancels.
    pub fn progress(mut self, callback: impl FnMut(f32, &str) -> bool + Send + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Add a reader after the built-in ones.
    pub fn reader(mut self, reader: Box<dyn VolumeReader>) -> Self {
        self.registry.register(reader);
        self
    }

    /// Progress sink bound to this configuration's callback and token.
    pub fn progress_sink(&mut self) -> Progress<'_> {
        sink(&mut self.progress, self.cancel.as_ref())
    }
}

fn sink<'a>(callback: &'a mut Option<ProgressCallback>, cancel: Option<&CancellationToken>) -> Progress<'a> {
    let progress = match callback.as_deref_mut() {
        Some(callback) => Progress::new(callback),
        None => Progress::none(),
    };
    match cancel {
        Some(token) => progress.with_cancellation(token.clone()),
        None => progress,
    }
}

/// Read any supported source into a (Frame, X, Y, Z, Channel) tensor.
///
/// A slice image or NIfTI file whose name ends in a number pulls in the
/// rest of its numbered sequence; a directory is read as a DICOM series.
pub fn parse(path: impl AsRef<Path>, config: &mut PipelineConfig) -> Result<(Array5<f32>, ParsedMetadata)> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    }
    let start = Instant::now();
    let single = Source::single(path);
    let files = if path.is_dir() || !single.is_stackable() {
        Vec::new()
    } else {
        collect_sequence(path)
    };
    let source = if files.len() > 1 {
        log::info!("reading {} as a sequence of {} files", path.display(), files.len());
        Source::sequence(path, files)
    } else {
        single
    };

    let options = ReadOptions {
        series_id: config.series_id.clone(),
    };
    let mut progress = sink(&mut config.progress, config.cancel.as_ref());
    let raw = config.registry.read(&source, &options, &mut progress.sub(0.0, 0.9))?;
    progress.checkpoint(0.9, "Building canonical volume")?;
    let (tensor, metadata) = canonicalize(raw)?;
    progress.checkpoint(1.0, "Done")?;

    log::info!(
        "parsed {} into {:?} in {:.2?}",
        metadata.name,
        tensor.shape(),
        start.elapsed()
    );
    Ok((tensor, metadata))
}

/// [`parse`] and wrap the result in a layer of `kind`.
pub fn load_layer(path: impl AsRef<Path>, kind: Kind, config: &mut PipelineConfig) -> Result<Layer> {
    let (tensor, metadata) = parse(path, config)?;
    Layer::from_parsed(tensor, metadata, kind)
}

/// Hand `layer` to `writer` under the configured cache directory.
pub fn cache_layer(layer: &Layer, writer: &mut dyn CacheWriter, config: &mut PipelineConfig) -> Result<Vec<PathBuf>> {
    let Some(cache_dir) = config.cache_dir.clone() else {
        return Err(Error::InvalidArgument("no cache directory configured".to_string()));
    };
    CacheVolume::from_layer(layer).write(writer, &cache_dir, &mut config.progress_sink())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RawCacheWriter;
    use crate::readers::RawVolume;
    use crate::enums::{Axis, DataType};
    use crate::error::ReaderError;
    use ndarray::ArrayD;
    use std::sync::{Arc, Mutex};

    struct Planar;

    impl VolumeReader for Planar {
        fn name(&self) -> &'static str {
            "planar"
        }

        fn can_read(&self, source: &Source) -> bool {
            source.has_extension(&[".planar"])
        }

        fn read(&self, _: &Source, _: &ReadOptions, _: &mut Progress<'_>) -> Result<RawVolume, ReaderError> {
            let data = ArrayD::from_elem(vec![3, 2], 7.0);
            Ok(RawVolume::new(data, vec![Axis::Y, Axis::X], DataType::U8, "planar"))
        }
    }

    #[test]
    fn missing_path_is_io_error() {
        let mut config = PipelineConfig::new();
        assert!(matches!(parse("/no/such/volume.mrc", &mut config), Err(Error::Io(_))));
    }

    #[test]
    fn custom_reader_and_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slice.planar");
        std::fs::write(&path, b"").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut config = PipelineConfig::new()
            .reader(Box::new(Planar))
            .progress(move |fraction, _| {
                sink.lock().unwrap().push(fraction);
                true
            });
        let (tensor, metadata) = parse(&path, &mut config).unwrap();
        assert_eq!(tensor.shape(), &[1, 2, 3, 1, 1]);
        assert_eq!(metadata.xyz_shape, [2, 3, 1]);
        assert_eq!(seen.lock().unwrap().last().copied(), Some(1.0));
    }

    #[test]
    fn cancelled_parse_reports_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slice.planar");
        std::fs::write(&path, b"").unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let mut config = PipelineConfig::new().reader(Box::new(Planar)).cancellation(token);
        assert!(parse(&path, &mut config).unwrap_err().is_cancelled());
    }

    #[test]
    fn cache_needs_a_directory() {
        let data = Array5::<f32>::zeros((1, 2, 2, 2, 1));
        let layer = Layer::new(data, crate::affine::Affine::identity(), Kind::Scalar, "a", DataType::F32).unwrap();
        let mut config = PipelineConfig::new();
        assert!(cache_layer(&layer, &mut RawCacheWriter, &mut config).is_err());

        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::new().cache_dir(dir.path());
        let paths = cache_layer(&layer, &mut RawCacheWriter, &mut config).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].exists());
    }
}
