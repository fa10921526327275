//! Project archives: a named collection of layers in one zip file.
//!
//! `manifest.json` lists every layer's name, kind, affine, shape and source
//! element type; `layers/<n>.bin` holds the tensor as little-endian `f32`
//! in (Frame, X, Y, Z, Channel) C order.

use ndarray::Array5;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::affine::Affine;
use crate::enums::{DataType, Kind};
use crate::error::{Error, Result};
use crate::layer::Layer;

const MANIFEST: &str = "manifest.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerEntry {
    pub name: String,
    pub kind: Kind,
    pub affine: Affine,
    pub shape: [usize; 5],
    #[serde(default)]
    pub dtype: DataType,
    #[serde(default)]
    pub description: String,
    /// Archive entry holding the tensor bytes.
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub version: String,
    pub name: String,
    pub layers: Vec<LayerEntry>,
}

impl ProjectManifest {
    pub const CURRENT_VERSION: &'static str = "0.1.0";
}

/// A named collection of layers.
#[derive(Clone, Debug)]
pub struct Project {
    pub name: String,
    pub layers: Vec<Layer>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layers: Vec::new(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut zip = ZipWriter::new(BufWriter::new(File::create(path)?));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut entries = Vec::with_capacity(self.layers.len());
        for (index, layer) in self.layers.iter().enumerate() {
            let data = format!("layers/{index}.bin");
            let words: Vec<u32> = layer.data().iter().map(|v| v.to_bits().to_le()).collect();
            zip.start_file(data.as_str(), options)?;
            zip.write_all(bytemuck::cast_slice(&words))?;
            entries.push(LayerEntry {
                name: layer.name().to_string(),
                kind: layer.kind(),
                affine: *layer.affine(),
                shape: layer.shape(),
                dtype: layer.dtype(),
                description: layer.description().to_string(),
                data,
            });
        }

        let manifest = ProjectManifest {
            version: ProjectManifest::CURRENT_VERSION.to_string(),
            name: self.name.clone(),
            layers: entries,
        };
        zip.start_file(MANIFEST, options)?;
        serde_json::to_writer_pretty(&mut zip, &manifest)?;
        zip.finish()?;
        log::info!("saved project '{}' ({} layers) to {}", self.name, self.layers.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
        let manifest: ProjectManifest = serde_json::from_reader(archive.by_name(MANIFEST)?)?;
        if manifest.version.split('.').next() != ProjectManifest::CURRENT_VERSION.split('.').next() {
            log::warn!(
                "project version {} differs from supported {}",
                manifest.version,
                ProjectManifest::CURRENT_VERSION
            );
        }

        let mut layers = Vec::with_capacity(manifest.layers.len());
        for entry in manifest.layers {
            let mut bytes = Vec::new();
            archive.by_name(&entry.data)?.read_to_end(&mut bytes)?;
            let expected: usize = entry.shape.iter().product::<usize>() * 4;
            if bytes.len() != expected {
                return Err(Error::dimension(format!(
                    "layer '{}' holds {} bytes, shape {:?} needs {expected}",
                    entry.name,
                    bytes.len(),
                    entry.shape
                )));
            }
            let words: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes);
            let values: Vec<f32> = words.into_iter().map(|w| f32::from_bits(u32::from_le(w))).collect();
            let data = Array5::from_shape_vec(entry.shape, values)?;
            let mut layer = Layer::new(data, entry.affine, entry.kind, entry.name, entry.dtype)?;
            layer.set_description(entry.description);
            layers.push(layer);
        }
        log::info!("loaded project '{}' ({} layers)", manifest.name, layers.len());
        Ok(Self {
            name: manifest.name,
            layers,
        })
    }
}

/// Write `layers` as project `name` to `path`.
pub fn save_project(path: &Path, name: &str, layers: &[Layer]) -> Result<()> {
    Project {
        name: name.to_string(),
        layers: layers.to_vec(),
    }
    .save(path)
}

pub fn load_project(path: &Path) -> Result<Project> {
    Project::load(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_survive_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.zip");
        let data = Array5::from_shape_fn((2, 3, 4, 5, 1), |(t, x, y, z, _)| (t * 1000 + x * 100 + y * 10 + z) as f32 - 50.5);
        let affine = Affine::compose([1.0, -2.0, 3.5], &nalgebra::Matrix3::identity(), [0.5, 0.5, 2.0]);
        let ct = Layer::new(data.clone(), affine, Kind::Scalar, "ct", DataType::F32).unwrap();
        let seg = Layer::new(data.mapv(|v| (v > 0.0) as u8 as f32), affine, Kind::Label, "seg", DataType::U8).unwrap();
        save_project(&path, "scene", &[ct, seg]).unwrap();

        let project = load_project(&path).unwrap();
        assert_eq!(project.name, "scene");
        assert_eq!(project.layers.len(), 2);
        assert_eq!(project.layers[0].data(), &data);
        assert_eq!(project.layers[0].affine(), &affine);
        assert_eq!(project.layers[1].kind(), Kind::Label);
        assert_eq!(project.layers[1].name(), "seg");
        assert_eq!(project.layers[1].dtype(), DataType::U8);
    }

    #[test]
    fn truncated_layer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        let options = SimpleFileOptions::default();
        zip.start_file("layers/0.bin", options).unwrap();
        zip.write_all(&[0u8; 12]).unwrap();
        let manifest = ProjectManifest {
            version: ProjectManifest::CURRENT_VERSION.to_string(),
            name: "broken".to_string(),
            layers: vec![LayerEntry {
                name: "a".to_string(),
                kind: Kind::Scalar,
                affine: Affine::identity(),
                shape: [1, 2, 2, 1, 1],
                dtype: DataType::F32,
                description: String::new(),
                data: "layers/0.bin".to_string(),
            }],
        };
        zip.start_file(MANIFEST, options).unwrap();
        serde_json::to_writer(&mut zip, &manifest).unwrap();
        zip.finish().unwrap();

        assert!(matches!(load_project(&path), Err(Error::Dimension(_))));
    }
}
