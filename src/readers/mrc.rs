//! MRC/MAP reader for cryo-EM maps, tomograms and particle stacks.
//!
//! The 1024-byte header is followed by an optional extended header of
//! `nsymbt` bytes and then the voxel block stored with x fastest. The
//! space group number tells single images, image stacks, volumes and
//! volume stacks apart; map/row/section axis remapping is not applied.

use half::f16;
use ndarray::{ArrayD, IxDyn};
use std::fs;

use super::{RawVolume, ReadOptions, Source, VolumeReader, display_name};
use crate::enums::{Axis, DataType};
use crate::error::ReaderError;
use crate::progress::Progress;

pub const HEADER_SIZE: usize = 1024;

const EXTENSIONS: &[&str] = &[".mrc", ".map", ".mrcs", ".rec", ".st", ".ali"];

/// Storage layout of an MRC file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MrcClass {
    SingleImage,
    ImageStack,
    Volume,
    VolumeStack,
}

impl MrcClass {
    /// Axis labels of the stored array, slowest axis first.
    pub fn axes(self) -> Vec<Axis> {
        match self {
            MrcClass::SingleImage => vec![Axis::Y, Axis::X],
            MrcClass::ImageStack => vec![Axis::T, Axis::Y, Axis::X],
            MrcClass::Volume => vec![Axis::Z, Axis::Y, Axis::X],
            MrcClass::VolumeStack => vec![Axis::T, Axis::Z, Axis::Y, Axis::X],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MrcHeader {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub mode: i32,
    pub mx: usize,
    pub my: usize,
    pub mz: usize,
    pub cell: [f32; 3],
    pub ispg: i32,
    pub nsymbt: usize,
    pub little_endian: bool,
    pub labels: Vec<String>,
}

impl MrcHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, ReaderError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ReaderError::malformed(format!(
                "MRC header needs {HEADER_SIZE} bytes, file has {}",
                bytes.len()
            )));
        }
        let little_endian = Self::detect_little_endian(bytes);
        let word = |index: usize| -> [u8; 4] {
            let start = index * 4;
            [bytes[start], bytes[start + 1], bytes[start + 2], bytes[start + 3]]
        };
        let int = |index: usize| {
            if little_endian {
                i32::from_le_bytes(word(index))
            } else {
                i32::from_be_bytes(word(index))
            }
        };
        let float = |index: usize| {
            if little_endian {
                f32::from_le_bytes(word(index))
            } else {
                f32::from_be_bytes(word(index))
            }
        };
        let size = |index: usize, field: &str| -> Result<usize, ReaderError> {
            usize::try_from(int(index))
                .map_err(|_| ReaderError::malformed(format!("negative {field} in MRC header")))
        };

        let label_count = int(55).clamp(0, 10) as usize;
        let labels = (0..label_count)
            .map(|i| {
                let start = 224 + i * 80;
                String::from_utf8_lossy(&bytes[start..start + 80])
                    .trim_end_matches(['\0', ' '])
                    .to_string()
            })
            .filter(|label| !label.is_empty())
            .collect();

        let header = Self {
            nx: size(0, "nx")?,
            ny: size(1, "ny")?,
            nz: size(2, "nz")?,
            mode: int(3),
            mx: size(7, "mx")?,
            my: size(8, "my")?,
            mz: size(9, "mz")?,
            cell: [float(10), float(11), float(12)],
            ispg: int(22),
            nsymbt: size(23, "nsymbt")?,
            little_endian,
            labels,
        };
        if header.nx == 0 || header.ny == 0 || header.nz == 0 {
            return Err(ReaderError::malformed(format!(
                "MRC dimensions must be positive, got {}x{}x{}",
                header.nx, header.ny, header.nz
            )));
        }
        Ok(header)
    }

    /// Machine stamp at byte 212: `0x44 0x4?` little endian, `0x11 0x11`
    /// big endian. Files with a blank stamp are read as little endian unless
    /// `nx` only makes sense big endian.
    fn detect_little_endian(bytes: &[u8]) -> bool {
        match bytes[212] {
            0x44 => true,
            0x11 => false,
            _ => {
                let le = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                let be = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                !(le <= 0 || le > 1 << 20) || (be <= 0 || be > 1 << 20)
            }
        }
    }

    pub fn data_type(&self) -> Result<DataType, ReaderError> {
        match self.mode {
            0 => Ok(DataType::I8),
            1 => Ok(DataType::I16),
            2 => Ok(DataType::F32),
            6 => Ok(DataType::U16),
            12 => Ok(DataType::F16),
            other => Err(ReaderError::unsupported(format!("MRC mode {other}"))),
        }
    }

    pub fn is_volume_stack_group(&self) -> bool {
        (401..=630).contains(&self.ispg)
    }

    pub fn class(&self) -> MrcClass {
        if self.is_volume_stack_group() && self.mz > 0 && self.nz / self.mz >= 1 {
            MrcClass::VolumeStack
        } else if self.nz == 1 {
            MrcClass::SingleImage
        } else if self.ispg == 0 {
            MrcClass::ImageStack
        } else {
            MrcClass::Volume
        }
    }

    /// Array shape matching [`MrcClass::axes`].
    pub fn shape(&self) -> Vec<usize> {
        match self.class() {
            MrcClass::SingleImage => vec![self.ny, self.nx],
            MrcClass::ImageStack | MrcClass::Volume => vec![self.nz, self.ny, self.nx],
            MrcClass::VolumeStack => vec![self.nz / self.mz, self.mz, self.ny, self.nx],
        }
    }

    /// Voxel size from the cell dimensions and sampling; axes with no
    /// usable record fall back to 1.
    pub fn voxel_size(&self) -> [f64; 3] {
        let sampling = [self.mx, self.my, self.mz];
        let mut size = [1.0; 3];
        for axis in 0..3 {
            let cell = self.cell[axis] as f64;
            if sampling[axis] > 0 && cell.is_finite() && cell > 0.0 {
                size[axis] = cell / sampling[axis] as f64;
            }
        }
        size
    }
}

fn decode_voxels(header: &MrcHeader, block: &[u8], count: usize) -> Result<Vec<f32>, ReaderError> {
    let dtype = header.data_type()?;
    let width = match dtype {
        DataType::I8 => 1,
        DataType::I16 | DataType::U16 | DataType::F16 => 2,
        _ => 4,
    };
    let needed = count * width;
    if block.len() < needed {
        return Err(ReaderError::malformed(format!(
            "MRC data block holds {} bytes, expected {needed}",
            block.len()
        )));
    }
    let le = header.little_endian;
    let values = block[..needed].chunks_exact(width).map(|c| match dtype {
        DataType::I8 => c[0] as i8 as f32,
        DataType::I16 => {
            let raw = [c[0], c[1]];
            (if le { i16::from_le_bytes(raw) } else { i16::from_be_bytes(raw) }) as f32
        }
        DataType::U16 => {
            let raw = [c[0], c[1]];
            (if le { u16::from_le_bytes(raw) } else { u16::from_be_bytes(raw) }) as f32
        }
        DataType::F16 => {
            let raw = [c[0], c[1]];
            let bits = if le { u16::from_le_bytes(raw) } else { u16::from_be_bytes(raw) };
            f16::from_bits(bits).to_f32()
        }
        _ => {
            let raw = [c[0], c[1], c[2], c[3]];
            if le { f32::from_le_bytes(raw) } else { f32::from_be_bytes(raw) }
        }
    });
    Ok(values.collect())
}

pub struct MrcReader;

impl VolumeReader for MrcReader {
    fn name(&self) -> &'static str {
        "mrc"
    }

    fn can_read(&self, source: &Source) -> bool {
        !source.is_sequence() && source.has_extension(EXTENSIONS)
    }

    fn read(
        &self,
        source: &Source,
        _options: &ReadOptions,
        progress: &mut Progress<'_>,
    ) -> Result<RawVolume, ReaderError> {
        progress.checkpoint(0.0, "Reading MRC header")?;
        let bytes = fs::read(&source.path)?;
        let header = MrcHeader::parse(&bytes)?;
        let class = header.class();
        let shape = header.shape();
        let count: usize = shape.iter().product();
        log::debug!(
            "MRC {}: {class:?}, shape {shape:?}, mode {}, voxel size {:?}",
            source.path.display(),
            header.mode,
            header.voxel_size()
        );

        let offset = HEADER_SIZE + header.nsymbt;
        let block = bytes
            .get(offset..)
            .ok_or_else(|| ReaderError::malformed("extended header runs past end of file"))?;
        progress.checkpoint(0.3, "Decoding MRC voxels")?;
        let voxels = decode_voxels(&header, block, count)?;
        let data = ArrayD::from_shape_vec(IxDyn(&shape), voxels)?;

        let description = header.labels.first().cloned().unwrap_or_default();
        Ok(RawVolume::new(data, class.axes(), header.data_type()?, display_name(&source.path))
            .with_spacing(header.voxel_size())
            .with_description(description))
    }
}
