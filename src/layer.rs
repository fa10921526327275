use ndarray::{Array3, Array4, Array5, ArrayView3, ArrayViewD, Axis as NdAxis, Ix3, Ix4, Zip, s};
use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::affine::{Affine, direction_array};
use crate::canonical::ParsedMetadata;
use crate::enums::{DataType, Kind};
use crate::error::{Error, Result};
use crate::progress::Progress;
use crate::resample::{ResizeOptions, bioxel_shape, resize};

/// Descriptive metadata of a layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerMetadata {
    pub name: String,
    pub description: String,
    pub kind: Kind,
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    /// Row-major rotation block of the affine.
    pub direction: [f64; 9],
    pub frame_count: usize,
    pub channel_count: usize,
    pub is_oriented: bool,
}

/// A canonical (Frame, X, Y, Z, Channel) volume with its placement in world
/// space. The affine includes the bioxel size as its scale.
#[derive(Clone, Debug)]
pub struct Layer {
    data: Array5<f32>,
    affine: Affine,
    kind: Kind,
    name: String,
    description: String,
    dtype: DataType,
    is_oriented: bool,
}

impl Layer {
    pub fn new(data: Array5<f32>, affine: Affine, kind: Kind, name: impl Into<String>, dtype: DataType) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::dimension(format!("layer tensor {:?} is empty", data.shape())));
        }
        affine.decompose()?;
        if affine.linear().determinant().abs() < 1e-12 {
            return Err(Error::dimension("layer affine is not invertible"));
        }
        Ok(Self {
            data,
            affine,
            kind,
            name: name.into(),
            description: String::new(),
            dtype,
            is_oriented: false,
        })
    }

    /// Build a layer from [`crate::parse`] output. The parsed affine is
    /// scaled by the voxel spacing so the bioxel size equals the spacing.
    pub fn from_parsed(data: Array5<f32>, metadata: ParsedMetadata, kind: Kind) -> Result<Self> {
        let scale = Affine::compose([0.0; 3], &nalgebra::Matrix3::identity(), metadata.spacing);
        let affine = scale.then(&metadata.affine);
        let mut layer = Self::new(data, affine, kind, metadata.name, metadata.dtype)?;
        layer.description = metadata.description;
        layer.is_oriented = metadata.is_oriented;
        Ok(layer)
    }

    pub fn data(&self) -> &Array5<f32> {
        &self.data
    }

    pub fn affine(&self) -> &Affine {
        &self.affine
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn is_oriented(&self) -> bool {
        self.is_oriented
    }

    pub fn shape(&self) -> [usize; 5] {
        let (t, x, y, z, c) = self.data.dim();
        [t, x, y, z, c]
    }

    pub fn xyz_shape(&self) -> [usize; 3] {
        let [_, x, y, z, _] = self.shape();
        [x, y, z]
    }

    pub fn frame_count(&self) -> usize {
        self.data.dim().0
    }

    pub fn channel_count(&self) -> usize {
        self.data.dim().4
    }

    pub fn bioxel_size(&self) -> [f64; 3] {
        self.affine.scale()
    }

    pub fn origin(&self) -> [f64; 3] {
        self.affine.translation()
    }

    /// Static XYZ Euler angles of the rotation, in radians.
    pub fn euler(&self) -> [f64; 3] {
        self.affine.euler()
    }

    pub fn min(&self) -> f32 {
        self.range().0
    }

    pub fn max(&self) -> f32 {
        self.range().1
    }

    /// NaN-ignoring value range, `(0, 0)` when no value is a number.
    fn range(&self) -> (f32, f32) {
        self.data
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |range: Option<(f32, f32)>, &v| match range {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .unwrap_or((0.0, 0.0))
    }

    pub fn metadata(&self) -> LayerMetadata {
        LayerMetadata {
            name: self.name.clone(),
            description: self.description.clone(),
            kind: self.kind,
            spacing: self.bioxel_size(),
            origin: self.origin(),
            direction: direction_array(&self.affine.rotation()),
            frame_count: self.frame_count(),
            channel_count: self.channel_count(),
            is_oriented: self.is_oriented,
        }
    }

    /// Deep copy.
    pub fn copy(&self) -> Layer {
        self.clone()
    }

    /// Blend `value` into the voxels selected by `mask`.
    ///
    /// `mask` is (X, Y, Z), applied to every frame, or (Frame, X, Y, Z).
    /// Each frame's mask is eroded by a 3×3×3 minimum filter first.
    pub fn fill(&mut self, value: f32, mask: ArrayViewD<'_, f32>, progress: &mut Progress<'_>) -> Result<()> {
        let xyz = self.xyz_shape();
        let frames = self.frame_count();
        let mask: Array4<f32> = match mask.ndim() {
            3 => mask
                .into_dimensionality::<Ix3>()?
                .insert_axis(NdAxis(0))
                .broadcast((frames, xyz[0], xyz[1], xyz[2]))
                .ok_or_else(|| Error::dimension(format!("fill mask does not match layer shape {xyz:?}")))?
                .to_owned(),
            4 => mask.into_dimensionality::<Ix4>()?.to_owned(),
            n => {
                return Err(Error::dimension(format!(
                    "fill mask must have 3 or 4 axes, got {n}"
                )));
            }
        };
        if mask.dim() != (frames, xyz[0], xyz[1], xyz[2]) {
            return Err(Error::dimension(format!(
                "fill mask {:?} does not match layer shape {:?}",
                mask.shape(),
                self.shape()
            )));
        }

        let channels = self.channel_count();
        let mut filled = self.data.clone();
        for (f, mut frame) in filled.outer_iter_mut().enumerate() {
            progress.checkpoint(f as f32 / frames as f32, "Filling frame")?;
            let eroded = minimum_filter(mask.index_axis(NdAxis(0), f));
            let eroded = eroded.insert_axis(NdAxis(3));
            let eroded = eroded
                .broadcast((xyz[0], xyz[1], xyz[2], channels))
                .ok_or_else(|| Error::dimension("fill mask cannot broadcast over channels"))?;
            Zip::from(&mut frame).and(&eroded).par_for_each(|voxel, &m| {
                *voxel = m.mul_add(value, (1.0 - m) * *voxel);
            });
        }
        self.data = filled;
        Ok(())
    }

    /// Resample to `new_shape`, given as (X, Y, Z) or (Frame, X, Y, Z).
    /// The frame count never changes.
    pub fn resize(&mut self, new_shape: &[usize], progress: &mut Progress<'_>) -> Result<()> {
        let frames = self.frame_count();
        let xyz: [usize; 3] = match *new_shape {
            [x, y, z] => [x, y, z],
            [t, x, y, z] if t == frames => [x, y, z],
            [t, ..] if new_shape.len() == 4 => {
                return Err(Error::dimension(format!(
                    "cannot resample frames: layer has {frames}, {t} requested"
                )));
            }
            _ => {
                return Err(Error::dimension(format!(
                    "resize shape must be (X, Y, Z) or (Frame, X, Y, Z), got {new_shape:?}"
                )));
            }
        };
        let old = self.xyz_shape();
        if xyz == old {
            return Ok(());
        }

        let start = Instant::now();
        let channels = self.channel_count();
        let options = ResizeOptions::new();
        let mut resized = Array5::<f32>::zeros((frames, xyz[0], xyz[1], xyz[2], channels));
        for (f, frame) in self.data.outer_iter().enumerate() {
            progress.checkpoint(f as f32 / frames as f32, "Resampling frame")?;
            let mut target = resized.slice_mut(s![f, .., .., .., ..]);
            if self.kind == Kind::Color {
                let out = resize(frame.into_dyn(), self.dtype, &xyz, &options)?;
                target.assign(&out.into_dimensionality::<Ix4>()?);
            } else {
                let projected = frame.map_axis(NdAxis(3), |lane| {
                    lane.iter().copied().fold(f32::NEG_INFINITY, f32::max)
                });
                let out = resize(projected.view().into_dyn(), self.dtype, &xyz, &options)?
                    .into_dimensionality::<Ix3>()?;
                let expanded = out.insert_axis(NdAxis(3));
                let expanded = expanded
                    .broadcast((xyz[0], xyz[1], xyz[2], channels))
                    .ok_or_else(|| Error::dimension("cannot re-expand channels"))?;
                target.assign(&expanded);
            }
        }
        if self.dtype.is_bool() || self.dtype.is_integer() {
            let dtype = self.dtype;
            resized.par_mapv_inplace(|v| dtype.quantize(v));
        }

        let ratio = [0, 1, 2].map(|a| old[a] as f64 / xyz[a] as f64);
        self.affine = Affine::compose([0.0; 3], &nalgebra::Matrix3::identity(), ratio).then(&self.affine);
        self.data = resized;
        log::info!(
            "resized {} from {old:?} to {xyz:?} ({frames} frames) in {:.2?}",
            self.name,
            start.elapsed()
        );
        Ok(())
    }

    /// Resampled deep copy.
    pub fn resized(&self, new_shape: &[usize], progress: &mut Progress<'_>) -> Result<Layer> {
        let mut copy = self.copy();
        copy.resize(new_shape, progress)?;
        Ok(copy)
    }

    /// Resample so the bioxel size becomes `size`, keeping the physical
    /// extent.
    pub fn resize_to_bioxel_size(&mut self, size: [f64; 3], progress: &mut Progress<'_>) -> Result<()> {
        let shape = bioxel_shape(self.xyz_shape(), self.bioxel_size(), size)?;
        self.resize(&shape, progress)
    }

    /// One binary mask layer per distinct non-zero label value, named
    /// `{name}_{label}`.
    pub fn split_labels(&self, progress: &mut Progress<'_>) -> Result<Vec<Layer>> {
        if self.kind != Kind::Label {
            return Err(Error::InvalidArgument(format!(
                "only label layers can be split, {} is {}",
                self.name, self.kind
            )));
        }
        let mut labels: Vec<f32> = self
            .data
            .iter()
            .copied()
            .filter(|v| *v != 0.0 && !v.is_nan())
            .collect();
        labels.sort_by(f32::total_cmp);
        labels.dedup();

        let total = labels.len();
        let mut layers = Vec::with_capacity(total);
        for (i, label) in labels.into_iter().enumerate() {
            progress.checkpoint(i as f32 / total as f32, &format!("Extracting label {label}"))?;
            let mask = self.data.mapv(|v| if v == label { 1.0 } else { 0.0 });
            layers.push(Layer {
                data: mask,
                affine: self.affine,
                kind: Kind::Scalar,
                name: format!("{}_{label}", self.name),
                description: self.description.clone(),
                dtype: DataType::Bool,
                is_oriented: self.is_oriented,
            });
        }
        log::debug!("split {} into {} label masks", self.name, layers.len());
        Ok(layers)
    }
}

/// 3×3×3 minimum filter with nearest-edge boundary.
fn minimum_filter(mask: ArrayView3<'_, f32>) -> Array3<f32> {
    let (nx, ny, nz) = mask.dim();
    let mut out = Array3::<f32>::zeros((nx, ny, nz));
    Zip::indexed(&mut out).par_for_each(|(x, y, z), value| {
        let window = mask.slice(s![
            x.saturating_sub(1)..(x + 2).min(nx),
            y.saturating_sub(1)..(y + 2).min(ny),
            z.saturating_sub(1)..(z + 2).min(nz)
        ]);
        *value = window.iter().copied().fold(f32::INFINITY, f32::min);
    });
    out
}
