use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No reader could parse {path:?}: {}", format_attempts(attempts))]
    Format {
        path: PathBuf,
        attempts: Vec<(&'static str, String)>,
    },

    #[error("Unsupported dimensionality: {0} axes (at most 5)")]
    TooManyDimensions(usize),

    #[error("Dimension error: {0}")]
    Dimension(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Cancelled by user")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Project archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Project manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl Error {
    pub fn dimension(message: impl Into<String>) -> Self {
        Error::Dimension(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

fn format_attempts(attempts: &[(&'static str, String)]) -> String {
    if attempts.is_empty() {
        return "no reader accepts this source".to_string();
    }
    attempts
        .iter()
        .map(|(reader, reason)| format!("[{reader}] {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of a single reader attempt. The registry swallows these and
/// moves on to the next reader.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(String),

    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::NiftiError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("OME-XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Malformed: {0}")]
    Malformed(String),

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error(transparent)]
    Fatal(#[from] Error),
}

impl ReaderError {
    pub fn malformed(message: impl Into<String>) -> Self {
        ReaderError::Malformed(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        ReaderError::Unsupported(message.into())
    }
}

impl From<dicom::object::ReadError> for ReaderError {
    fn from(err: dicom::object::ReadError) -> Self {
        ReaderError::Dicom(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ReaderError {
    fn from(err: ndarray::ShapeError) -> Self {
        ReaderError::Malformed(err.to_string())
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
        Error::Dimension(err.to_string())
    }
}
