//! # Bioxel volume library
//!
//! This crate turns scientific and medical image sources into one canonical
//! in-memory representation: a 5D `f32` tensor ordered
//! (Frame, X, Y, Z, Channel) plus the metadata needed to place it in world
//! space.
//!
//! Supported sources:
//!  - MRC / CCP4 maps (`.mrc`, `.map`, `.mrcs`, `.rec`, `.st`, `.ali`)
//!  - OME-TIFF stacks (`.ome.tif`, `.ome.tiff`)
//!  - DICOM series, either a directory or any file inside one
//!  - NIfTI-1 (`.nii`, `.nii.gz`)
//!  - Numbered image sequences (`slice_000.png`, `slice_001.png`, ...)
//!
//! Every source goes through the same pipeline: an ordered list of readers
//! is tried until one succeeds, the result is permuted into canonical axis
//! order and oriented sources are converted from LPS to RAS world space.
//! The [`Layer`] type then offers anti-aliased resizing, masked filling and
//! label splitting; layers can be handed to a render cache or bundled into
//! a project archive.
//!
//! Long operations accept a [`Progress`] sink and stop with
//! [`Error::Cancelled`] when the caller asks them to.
//!
//! # Examples
//!
//! ## Loading a volume and resampling it to isotropic voxels
//!
//! ```no_run
//! # use bioxel_volume::{PipelineConfig, Progress, enums::Kind, load_layer};
//! let mut config = PipelineConfig::new();
//! let mut layer = load_layer("scan/IM_0001.dcm", Kind::Scalar, &mut config)
//!     .expect("should have parsed the series");
//! layer
//!     .resize_to_bioxel_size([1.0, 1.0, 1.0], &mut Progress::none())
//!     .expect("should have resampled the layer");
//! println!("{:?} at {:?}", layer.shape(), layer.bioxel_size());
//! ```
//!
//! ## Resizing a plain array
//!
//! ```
//! # use bioxel_volume::{ResizeOptions, enums::DataType, resize};
//! # use ndarray::ArrayD;
//! let image = ArrayD::<f32>::from_elem(vec![8, 8], 1.0);
//! let small = resize(image.view(), DataType::F32, &[4, 4], &ResizeOptions::default())
//!     .expect("should have resized");
//! assert_eq!(small.shape(), &[4, 4]);
//! ```

pub mod affine;
pub mod cache;
pub mod canonical;
pub mod config;
pub mod enums;
pub mod error;
pub mod layer;
pub mod pipeline;
pub mod progress;
pub mod project;
pub mod readers;
pub mod resample;
pub mod sequence;

pub use canonical::ParsedMetadata;
pub use error::{Error, Result};
pub use layer::{Layer, LayerMetadata};
pub use pipeline::{PipelineConfig, cache_layer, load_layer, parse};
pub use progress::{CancellationToken, Progress};
pub use project::{Project, load_project, save_project};
pub use resample::{ResizeOptions, resize};
