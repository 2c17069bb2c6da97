use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, GrayImage, ImageEncoder, RgbImage};

/// Pixels of one rendered picture.
#[derive(Debug, Clone, PartialEq)]
pub enum PictureImage {
    Gray(GrayImage),
    Rgb(RgbImage),
}

impl PictureImage {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Gray(image) => image.dimensions(),
            Self::Rgb(image) => image.dimensions(),
        }
    }

    /// JPEG bytes at `quality`. Identical pixels give identical bytes.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, image::ImageError> {
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        let (width, height) = self.dimensions();
        match self {
            Self::Gray(image) => encoder.write_image(image.as_raw(), width, height, ExtendedColorType::L8)?,
            Self::Rgb(image) => encoder.write_image(image.as_raw(), width, height, ExtendedColorType::Rgb8)?,
        }
        Ok(buffer)
    }
}
