//! Face crop preprocessing shared by enrollment and recognition.
//!
//! Every embedding in the system, stored or matched, goes through
//! [`prepare_face`]. Distances are only meaningful between embeddings of
//! identically prepared crops.

use crate::types::PixelRect;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::Path;

/// Side length of the square crop fed to the embedder.
pub const FACE_INPUT_SIZE: u32 = 160;

/// Channel order a model expects its u8 input in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Decode a JPEG/PNG file from disk into 8-bit RGB.
pub fn load_image(path: &Path) -> Result<RgbImage, image::ImageError> {
    Ok(image::open(path)?.to_rgb8())
}

/// Copy the `rect` sub-region out of `image`.
pub fn crop(image: &RgbImage, rect: &PixelRect) -> RgbImage {
    imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image()
}

/// Reorder channels to `order`, resize to 160×160 with bilinear filtering, u8 per channel.
pub fn prepare_face(face: &RgbImage, order: ChannelOrder) -> RgbImage {
    let mut resized = imageops::resize(face, FACE_INPUT_SIZE, FACE_INPUT_SIZE, FilterType::Triangle);
    if order == ChannelOrder::Bgr {
        for pixel in resized.pixels_mut() {
            pixel.0.swap(0, 2);
        }
    }
    resized
}
