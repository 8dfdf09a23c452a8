//! 2D image encoding and decoding for tiff slices

use crate::block::Plane;
use crate::error::{DatasetError, Result};
use crate::types::{DataType, VoxelType};
use bytes::Bytes;
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb, Rgba};
use ndarray::Array3;
use std::io::Cursor;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::ColorType;
use tiff::encoder::TiffValue;
use tiff::tags::{PhotometricInterpretation, SampleFormat};

/// Trait for turning a plane into an encoded image file
pub trait ImageEncoder: Send + Sync {
    /// Encode the plane
    fn encode(&self, plane: &Plane) -> Result<Bytes>;

    /// File extension of the encoded images
    fn extension(&self) -> &'static str;
}

/// TIFF encoder backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffEncoder;

impl ImageEncoder for TiffEncoder {
    fn encode(&self, plane: &Plane) -> Result<Bytes> {
        encode_tiff(plane)
    }

    fn extension(&self) -> &'static str {
        "tiff"
    }
}

fn unsupported(voxel_type: VoxelType) -> String {
    format!(
        "voxel type {} has no image representation (uint8 or uint16 with 1-4 channels)",
        voxel_type
    )
}

fn buffer_error(plane: &Plane) -> DatasetError {
    DatasetError::Encode(format!(
        "{}x{} buffer does not match voxel type {}",
        plane.width(),
        plane.height(),
        plane.voxel_type
    ))
}

fn le_u16(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

fn le_bytes(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Encode a `uint8`/`uint16` plane with 1-4 channels as TIFF
pub fn encode_tiff(plane: &Plane) -> Result<Bytes> {
    let width = u32::try_from(plane.width()).map_err(|_| buffer_error(plane))?;
    let height = u32::try_from(plane.height()).map_err(|_| buffer_error(plane))?;
    let raw = plane.to_bytes();
    let voxel_type = plane.voxel_type;

    let image = match (voxel_type.dtype, voxel_type.num_channels) {
        (DataType::U8, 1) => ImageBuffer::<Luma<u8>, _>::from_raw(width, height, raw)
            .map(DynamicImage::ImageLuma8),
        (DataType::U8, 2) => {
            return encode_two_samples::<TwoSamples8>(width, height, &raw).map(Bytes::from)
        }
        (DataType::U8, 3) => ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, raw)
            .map(DynamicImage::ImageRgb8),
        (DataType::U8, 4) => ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, raw)
            .map(DynamicImage::ImageRgba8),
        (DataType::U16, 1) => ImageBuffer::<Luma<u16>, _>::from_raw(width, height, le_u16(&raw))
            .map(DynamicImage::ImageLuma16),
        (DataType::U16, 2) => {
            return encode_two_samples::<TwoSamples16>(width, height, &le_u16(&raw))
                .map(Bytes::from)
        }
        (DataType::U16, 3) => ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, le_u16(&raw))
            .map(DynamicImage::ImageRgb16),
        (DataType::U16, 4) => ImageBuffer::<Rgba<u16>, _>::from_raw(width, height, le_u16(&raw))
            .map(DynamicImage::ImageRgba16),
        _ => return Err(DatasetError::Encode(unsupported(voxel_type))),
    }
    .ok_or_else(|| buffer_error(plane))?;

    let mut output = Cursor::new(Vec::new());
    image
        .write_to(&mut output, ImageFormat::Tiff)
        .map_err(|e| DatasetError::Encode(e.to_string()))?;
    Ok(Bytes::from(output.into_inner()))
}

/// Decode a TIFF image into a plane of the given voxel type
pub fn decode_tiff(data: &[u8], voxel_type: VoxelType) -> Result<Plane> {
    let (width, height, raw) = match voxel_type.num_channels {
        2 => decode_two_samples(data, voxel_type)?,
        _ => decode_image(data, voxel_type)?,
    };
    let data = Array3::from_shape_vec((height, width, voxel_type.bytes_per_voxel()), raw)?;
    Ok(Plane { voxel_type, data })
}

fn decode_image(data: &[u8], voxel_type: VoxelType) -> Result<(usize, usize, Vec<u8>)> {
    let image = image::load_from_memory_with_format(data, ImageFormat::Tiff)
        .map_err(|e| DatasetError::Decode(e.to_string()))?;
    let (width, height) = (image.width() as usize, image.height() as usize);

    let raw = match (voxel_type.dtype, voxel_type.num_channels) {
        (DataType::U8, 1) => image.into_luma8().into_raw(),
        (DataType::U8, 3) => image.into_rgb8().into_raw(),
        (DataType::U8, 4) => image.into_rgba8().into_raw(),
        (DataType::U16, 1) => le_bytes(&image.into_luma16().into_raw()),
        (DataType::U16, 3) => le_bytes(&image.into_rgb16().into_raw()),
        (DataType::U16, 4) => le_bytes(&image.into_rgba16().into_raw()),
        _ => return Err(DatasetError::Decode(unsupported(voxel_type))),
    };
    Ok((width, height, raw))
}

// Two samples per pixel have no `image` color type that TIFF supports, so
// those images go through the `tiff` crate directly.

struct TwoSamples8;

impl ColorType for TwoSamples8 {
    type Inner = u8;
    const TIFF_VALUE: PhotometricInterpretation = PhotometricInterpretation::BlackIsZero;
    const BITS_PER_SAMPLE: &'static [u16] = &[8, 8];
    const SAMPLE_FORMAT: &'static [SampleFormat] = &[SampleFormat::Uint; 2];

    fn horizontal_predict(row: &[u8], result: &mut Vec<u8>) {
        let (start, rest) = row.split_at(row.len().min(2));
        result.extend_from_slice(start);
        result.extend(row.iter().zip(rest).map(|(prev, current)| current.wrapping_sub(*prev)));
    }
}

struct TwoSamples16;

impl ColorType for TwoSamples16 {
    type Inner = u16;
    const TIFF_VALUE: PhotometricInterpretation = PhotometricInterpretation::BlackIsZero;
    const BITS_PER_SAMPLE: &'static [u16] = &[16, 16];
    const SAMPLE_FORMAT: &'static [SampleFormat] = &[SampleFormat::Uint; 2];

    fn horizontal_predict(row: &[u16], result: &mut Vec<u16>) {
        let (start, rest) = row.split_at(row.len().min(2));
        result.extend_from_slice(start);
        result.extend(row.iter().zip(rest).map(|(prev, current)| current.wrapping_sub(*prev)));
    }
}

fn encode_two_samples<C>(width: u32, height: u32, samples: &[C::Inner]) -> Result<Vec<u8>>
where
    C: ColorType,
    [C::Inner]: TiffValue,
{
    let mut output = Cursor::new(Vec::new());
    tiff::encoder::TiffEncoder::new(&mut output)
        .and_then(|mut encoder| encoder.write_image::<C>(width, height, samples))
        .map_err(|e| DatasetError::Encode(e.to_string()))?;
    Ok(output.into_inner())
}

fn decode_two_samples(data: &[u8], voxel_type: VoxelType) -> Result<(usize, usize, Vec<u8>)> {
    let decode_error = |e: tiff::TiffError| DatasetError::Decode(e.to_string());
    let mut decoder = Decoder::new(Cursor::new(data)).map_err(decode_error)?;
    let (width, height) = decoder.dimensions().map_err(decode_error)?;
    let raw = match (voxel_type.dtype, decoder.read_image().map_err(decode_error)?) {
        (DataType::U8, DecodingResult::U8(samples)) => samples,
        (DataType::U16, DecodingResult::U16(samples)) => le_bytes(&samples),
        (DataType::U8 | DataType::U16, _) => {
            return Err(DatasetError::Decode(format!(
                "sample width of the image does not match voxel type {}",
                voxel_type
            )))
        }
        _ => return Err(DatasetError::Decode(unsupported(voxel_type))),
    };
    Ok((width as usize, height as usize, raw))
}
