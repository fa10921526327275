use std::fs::File;
use std::path::Path;

use bioxel_volume::enums::{DataType, Kind};
use bioxel_volume::{Error, PipelineConfig, Progress, load_layer, load_project, parse, save_project};
use image::{GrayImage, Luma};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

/// Little-endian float32 MRC volume with voxel value `x + 10 y + 100 z`.
fn write_mrc(path: &Path, n: [i32; 3], cell: [f32; 3]) {
    let mut bytes = vec![0u8; 1024];
    let mut put = |index: usize, value: [u8; 4]| bytes[index * 4..index * 4 + 4].copy_from_slice(&value);
    put(0, n[0].to_le_bytes());
    put(1, n[1].to_le_bytes());
    put(2, n[2].to_le_bytes());
    put(3, 2i32.to_le_bytes());
    put(7, n[0].to_le_bytes());
    put(8, n[1].to_le_bytes());
    put(9, n[2].to_le_bytes());
    put(10, cell[0].to_le_bytes());
    put(11, cell[1].to_le_bytes());
    put(12, cell[2].to_le_bytes());
    put(22, 1i32.to_le_bytes());
    bytes[208..212].copy_from_slice(b"MAP ");
    bytes[212] = 0x44;
    bytes[213] = 0x44;
    for z in 0..n[2] {
        for y in 0..n[1] {
            for x in 0..n[0] {
                bytes.extend_from_slice(&((x + 10 * y + 100 * z) as f32).to_le_bytes());
            }
        }
    }
    std::fs::write(path, bytes).unwrap();
}

#[test]
fn mrc_volume_lands_in_canonical_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map.mrc");
    write_mrc(&path, [8, 6, 4], [4.0, 6.0, 8.0]);

    let (tensor, metadata) = parse(&path, &mut PipelineConfig::new()).unwrap();
    assert_eq!(tensor.shape(), &[1, 8, 6, 4, 1]);
    assert_eq!(tensor[[0, 3, 2, 1, 0]], 123.0);
    assert_eq!(metadata.spacing, [0.5, 1.0, 2.0]);
    assert_eq!(metadata.xyz_shape, [8, 6, 4]);
    assert_eq!(metadata.dtype, DataType::F32);
    assert!(!metadata.is_oriented);
}

#[test]
fn numbered_mrc_maps_are_read_one_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    write_mrc(&dir.path().join("emd_1234.map"), [4, 3, 2], [4.0, 3.0, 2.0]);
    write_mrc(&dir.path().join("emd_1235.map"), [5, 3, 2], [5.0, 3.0, 2.0]);

    let (tensor, metadata) = parse(dir.path().join("emd_1234.map"), &mut PipelineConfig::new()).unwrap();
    assert_eq!(tensor.shape(), &[1, 4, 3, 2, 1]);
    assert_eq!(metadata.name, "emd_1234");
}

#[test]
fn ome_tiff_planes_follow_dimension_order() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06">
  <Image ID="Image:0" Name="cells">
    <Pixels ID="Pixels:0" DimensionOrder="XYZCT" Type="uint16"
            SizeX="4" SizeY="3" SizeZ="2" SizeC="2" SizeT="1"
            PhysicalSizeX="0.25" PhysicalSizeY="0.25" PhysicalSizeZ="1.5"/>
  </Image>
</OME>"#;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cells.ome.tif");
    let mut encoder = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
    for plane in 0..4u16 {
        let data: Vec<u16> = (0..12u16).map(|i| plane * 100 + i).collect();
        let mut image = encoder.new_image::<colortype::Gray16>(4, 3).unwrap();
        if plane == 0 {
            image.encoder().write_tag(Tag::ImageDescription, xml).unwrap();
        }
        image.write_data(&data).unwrap();
    }

    let (tensor, metadata) = parse(&path, &mut PipelineConfig::new()).unwrap();
    assert_eq!(tensor.shape(), &[1, 4, 3, 2, 2]);
    // plane = c * SizeZ + z, pixel = y * SizeX + x
    assert_eq!(tensor[[0, 1, 2, 1, 1]], (3 * 100 + 2 * 4 + 1) as f32);
    assert_eq!(tensor[[0, 3, 0, 0, 1]], 203.0);
    assert_eq!(metadata.name, "cells");
    assert_eq!(metadata.spacing, [0.25, 0.25, 1.5]);
    assert_eq!(metadata.dtype, DataType::U16);
}

#[test]
fn numbered_png_sequence_skips_strays() {
    let dir = tempfile::tempdir().unwrap();
    for z in 0..3u32 {
        GrayImage::from_fn(4, 3, |x, y| Luma([(x + 4 * y + 20 * z) as u8]))
            .save(dir.path().join(format!("slice_{z:03}.png")))
            .unwrap();
    }
    GrayImage::new(4, 3).save(dir.path().join("slice_009.png")).unwrap();

    let (tensor, metadata) = parse(dir.path().join("slice_001.png"), &mut PipelineConfig::new()).unwrap();
    assert_eq!(tensor.shape(), &[1, 4, 3, 3, 1]);
    assert_eq!(tensor[[0, 2, 1, 2, 0]], (2 + 4 + 40) as f32);
    assert_eq!(metadata.dtype, DataType::U8);
}

#[test]
fn nifti_volume_is_oriented() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brain.nii");
    let array = ndarray::Array3::from_shape_fn((3, 4, 5), |(x, y, z)| (x + 10 * y + 100 * z) as f32);
    nifti::writer::WriterOptions::new(&path).write_nifti(&array).unwrap();

    let (tensor, metadata) = parse(&path, &mut PipelineConfig::new()).unwrap();
    assert_eq!(tensor.shape(), &[1, 3, 4, 5, 1]);
    assert!(metadata.is_oriented);
    assert_eq!(tensor.sum(), array.sum());
}

#[test]
fn unknown_format_lists_reader_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.xyz");
    std::fs::write(&path, b"not a volume").unwrap();
    match parse(&path, &mut PipelineConfig::new()) {
        Err(Error::Format { attempts, .. }) => assert!(!attempts.is_empty()),
        other => panic!("expected a format error, got {other:?}"),
    }
}

#[test]
fn resampled_layer_survives_a_project_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map.mrc");
    write_mrc(&path, [8, 6, 4], [8.0, 6.0, 4.0]);

    let mut layer = load_layer(&path, Kind::Scalar, &mut PipelineConfig::new()).unwrap();
    assert_eq!(layer.bioxel_size(), [1.0, 1.0, 1.0]);
    layer.resize_to_bioxel_size([2.0, 2.0, 2.0], &mut Progress::none()).unwrap();
    assert_eq!(layer.xyz_shape(), [4, 3, 2]);
    assert_eq!(layer.bioxel_size(), [2.0, 2.0, 2.0]);
    assert!(layer.min() >= 0.0);
    assert!(layer.max() <= 357.0);

    let archive = dir.path().join("scene.zip");
    save_project(&archive, "scene", std::slice::from_ref(&layer)).unwrap();
    let project = load_project(&archive).unwrap();
    assert_eq!(project.layers.len(), 1);
    assert_eq!(project.layers[0].data(), layer.data());
    assert_eq!(project.layers[0].bioxel_size(), [2.0, 2.0, 2.0]);
}
