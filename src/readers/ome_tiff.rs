//! OME-TIFF reader.
//!
//! Planes are stored one per IFD in the order given by the OME
//! `DimensionOrder` attribute (`XYZCT` means z varies fastest, then c,
//! then t). Samples of RGB pages become the channel axis.

use ndarray::{ArrayD, IxDyn};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs::File;
use std::io::BufReader;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use super::{RawVolume, ReadOptions, Source, VolumeReader, display_name};
use crate::enums::{Axis, DataType};
use crate::error::ReaderError;
use crate::progress::Progress;

pub(crate) const EXTENSIONS: &[&str] = &[".ome.tif", ".ome.tiff", ".ome.tf2", ".ome.tf8", ".ome.btf"];

/// Attributes of the OME `Pixels` element that drive the array layout.
#[derive(Clone, Debug, PartialEq)]
pub struct OmePixels {
    pub dimension_order: String,
    pub size_x: usize,
    pub size_y: usize,
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,
    /// `None` when the attribute is absent or unreadable.
    pub physical_size: [Option<f64>; 3],
    pub image_name: Option<String>,
}

impl OmePixels {
    /// Parse the first `Image`/`Pixels` pair of an OME-XML document.
    pub fn from_xml(xml: &str) -> Result<Self, ReaderError> {
        let mut reader = Reader::from_str(xml);
        let mut image_name = None;
        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Image" => {
                    for attr in e.attributes() {
                        let attr = attr.map_err(quick_xml::Error::from)?;
                        if attr.key.local_name().as_ref() == b"Name" {
                            image_name = Some(attr.unescape_value()?.into_owned());
                        }
                    }
                }
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Pixels" => {
                    let mut pixels = OmePixels {
                        dimension_order: String::new(),
                        size_x: 0,
                        size_y: 0,
                        size_z: 1,
                        size_c: 1,
                        size_t: 1,
                        physical_size: [None; 3],
                        image_name: image_name.take().filter(|n| !n.is_empty()),
                    };
                    let mut physical: [Option<String>; 3] = Default::default();
                    for attr in e.attributes() {
                        let attr = attr.map_err(quick_xml::Error::from)?;
                        let value = attr.unescape_value()?.into_owned();
                        match attr.key.local_name().as_ref() {
                            b"DimensionOrder" => pixels.dimension_order = value.to_ascii_uppercase(),
                            b"SizeX" => pixels.size_x = parse_size("SizeX", &value)?,
                            b"SizeY" => pixels.size_y = parse_size("SizeY", &value)?,
                            b"SizeZ" => pixels.size_z = parse_size("SizeZ", &value)?,
                            b"SizeC" => pixels.size_c = parse_size("SizeC", &value)?,
                            b"SizeT" => pixels.size_t = parse_size("SizeT", &value)?,
                            b"PhysicalSizeX" => physical[0] = Some(value),
                            b"PhysicalSizeY" => physical[1] = Some(value),
                            b"PhysicalSizeZ" => physical[2] = Some(value),
                            _ => {}
                        }
                    }
                    for (axis, raw) in physical.iter().enumerate() {
                        pixels.physical_size[axis] = physical_size(axis, raw.as_deref());
                    }
                    pixels.validate()?;
                    return Ok(pixels);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Err(ReaderError::malformed("OME-XML has no Pixels element"))
    }

    fn validate(&self) -> Result<(), ReaderError> {
        let order = &self.dimension_order;
        let valid = order.len() == 5
            && order.starts_with("XY")
            && ['Z', 'C', 'T'].iter().all(|c| order[2..].contains(*c));
        if !valid {
            return Err(ReaderError::malformed(format!("bad DimensionOrder '{order}'")));
        }
        if self.size_x == 0 || self.size_y == 0 {
            return Err(ReaderError::malformed("OME Pixels lacks SizeX/SizeY"));
        }
        Ok(())
    }

    /// Spacing in X, Y, Z; missing sizes default to 1.
    pub fn spacing(&self) -> [f64; 3] {
        self.physical_size.map(|size| size.unwrap_or(1.0))
    }

    /// Plane axes from slowest to fastest with their sizes, e.g.
    /// `XYZCT` → `[(T, t), (C, c), (Z, z)]`.
    fn plane_axes(&self, channel_planes: usize) -> Vec<(Axis, usize)> {
        self.dimension_order[2..]
            .chars()
            .rev()
            .filter_map(|c| {
                let axis = Axis::from_char(c)?;
                let size = match axis {
                    Axis::Z => self.size_z,
                    Axis::C => channel_planes,
                    Axis::T => self.size_t,
                    _ => return None,
                };
                Some((axis, size))
            })
            .collect()
    }
}

fn parse_size(field: &str, value: &str) -> Result<usize, ReaderError> {
    value
        .trim()
        .parse()
        .map_err(|_| ReaderError::malformed(format!("{field}='{value}' is not a size")))
}

/// Absent physical sizes default silently; malformed ones default with a
/// warning so a broken header is visible in the logs.
fn physical_size(axis: usize, raw: Option<&str>) -> Option<f64> {
    let name = ["X", "Y", "Z"][axis];
    let Some(raw) = raw else {
        log::debug!("PhysicalSize{name} absent, using unit spacing");
        return None;
    };
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => Some(value),
        _ => {
            log::warn!("PhysicalSize{name}='{raw}' is malformed, using unit spacing");
            None
        }
    }
}

fn page_to_f32(result: DecodingResult) -> Result<(Vec<f32>, DataType), ReaderError> {
    Ok(match result {
        DecodingResult::U8(v) => (v.into_iter().map(f32::from).collect(), DataType::U8),
        DecodingResult::I8(v) => (v.into_iter().map(f32::from).collect(), DataType::I8),
        DecodingResult::U16(v) => (v.into_iter().map(f32::from).collect(), DataType::U16),
        DecodingResult::I16(v) => (v.into_iter().map(f32::from).collect(), DataType::I16),
        DecodingResult::U32(v) => (v.into_iter().map(|x| x as f32).collect(), DataType::U32),
        DecodingResult::I32(v) => (v.into_iter().map(|x| x as f32).collect(), DataType::I32),
        DecodingResult::F32(v) => (v, DataType::F32),
        DecodingResult::F64(v) => (v.into_iter().map(|x| x as f32).collect(), DataType::F64),
        _ => return Err(ReaderError::unsupported("64-bit integer TIFF samples")),
    })
}

pub struct OmeTiffReader;

impl OmeTiffReader {
    fn read_planes(
        decoder: &mut Decoder<BufReader<File>>,
        pixels: &OmePixels,
        plane_count: usize,
        progress: &mut Progress<'_>,
    ) -> Result<(Vec<f32>, DataType, usize), ReaderError> {
        let mut values = Vec::new();
        let mut dtype = DataType::F32;
        let mut samples = 1;
        for plane in 0..plane_count {
            if plane > 0 {
                if !decoder.more_images() {
                    return Err(ReaderError::malformed(format!(
                        "OME metadata describes {plane_count} planes, file has {plane}"
                    )));
                }
                decoder.next_image()?;
            }
            progress.checkpoint(plane as f32 / plane_count as f32, "Reading OME-TIFF planes")?;
            let (width, height) = decoder.dimensions()?;
            if (width as usize, height as usize) != (pixels.size_x, pixels.size_y) {
                return Err(ReaderError::InconsistentDimensions);
            }
            let (page, page_type) = page_to_f32(decoder.read_image()?)?;
            let page_samples = page.len() / (pixels.size_x * pixels.size_y);
            if plane == 0 {
                dtype = page_type;
                samples = page_samples.max(1);
                values.reserve(page.len() * plane_count);
            } else if page_samples != samples {
                return Err(ReaderError::InconsistentDimensions);
            }
            values.extend(page);
        }
        Ok((values, dtype, samples))
    }
}

impl VolumeReader for OmeTiffReader {
    fn name(&self) -> &'static str {
        "ome-tiff"
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
        let file = BufReader::new(File::open(&source.path)?);
        let mut decoder = Decoder::new(file)?.with_limits(Limits::unlimited());
        let xml = decoder.get_tag_ascii_string(Tag::ImageDescription)?;
        let pixels = OmePixels::from_xml(&xml)?;
        log::debug!("OME pixels: {pixels:?}");

        // RGB pages carry their channels as samples; the plane C axis then
        // only counts interleaved groups.
        let first_samples = match decoder.colortype()? {
            tiff::ColorType::RGB(_) => 3,
            tiff::ColorType::RGBA(_) => 4,
            tiff::ColorType::GrayA(_) => 2,
            _ => 1,
        };
        let channel_planes = (pixels.size_c / first_samples).max(1);
        let plane_axes = pixels.plane_axes(channel_planes);
        let plane_count: usize = plane_axes.iter().map(|(_, size)| size).product();

        let (values, dtype, samples) = Self::read_planes(&mut decoder, &pixels, plane_count, progress)?;

        let mut axes: Vec<(Axis, usize)> = plane_axes;
        axes.push((Axis::Y, pixels.size_y));
        axes.push((Axis::X, pixels.size_x));
        if samples > 1 {
            if channel_planes > 1 {
                return Err(ReaderError::unsupported(
                    "multi-sample pages combined with separate channel planes",
                ));
            }
            axes.push((Axis::C, samples));
        }
        let shape: Vec<usize> = axes.iter().map(|(_, size)| *size).collect();
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;

        // Drop axes the data does not actually have; X and Y always stay.
        let mut data = data;
        let mut labels = Vec::new();
        let mut axis_index = 0;
        for (axis, size) in axes {
            if size == 1 && !matches!(axis, Axis::X | Axis::Y) {
                data = data.index_axis_move(ndarray::Axis(axis_index), 0);
            } else {
                labels.push(axis);
                axis_index += 1;
            }
        }

        let name = pixels
            .image_name
            .clone()
            .unwrap_or_else(|| display_name(&source.path));
        Ok(RawVolume::new(data, labels, dtype, name)
            .with_spacing(pixels.spacing())
            .with_description(format!("OME-TIFF {}", pixels.dimension_order)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06">
  <Image ID="Image:0" Name="cells">
    <Pixels ID="Pixels:0" DimensionOrder="XYZCT" Type="uint16"
            SizeX="4" SizeY="3" SizeZ="2" SizeC="1" SizeT="1"
            PhysicalSizeX="0.5" PhysicalSizeY="bogus">
      <TiffData/>
    </Pixels>
  </Image>
</OME>"#;

    #[test]
    fn parses_pixels_element() {
        let pixels = OmePixels::from_xml(XML).unwrap();
        assert_eq!(pixels.dimension_order, "XYZCT");
        assert_eq!((pixels.size_x, pixels.size_y, pixels.size_z), (4, 3, 2));
        assert_eq!(pixels.image_name.as_deref(), Some("cells"));
        // Malformed and absent sizes both fall back to unit spacing.
        assert_eq!(pixels.spacing(), [0.5, 1.0, 1.0]);
    }

    #[test]
    fn plane_axes_run_slowest_first() {
        let pixels = OmePixels::from_xml(XML).unwrap();
        let axes = pixels.plane_axes(1);
        assert_eq!(axes, vec![(Axis::T, 1), (Axis::C, 1), (Axis::Z, 2)]);
    }

    #[test]
    fn rejects_missing_pixels() {
        assert!(OmePixels::from_xml("<OME><Image/></OME>").is_err());
        let bad = XML.replace("XYZCT", "ZYXCT");
        assert!(OmePixels::from_xml(&bad).is_err());
    }
}
