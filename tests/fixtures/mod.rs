//! In-memory test images, encoded on the fly so no binary fixtures are needed.

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// A described test image with the properties the pipeline should report.
#[derive(Debug, Clone)]
pub struct TestImageFixture {
    pub url: &'static str,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub sharp: bool,
    pub description: &'static str,
}

pub const SHARP_PNG: TestImageFixture = TestImageFixture {
    url: "https://cdn.example.com/artworks/u1/original/sharp.png",
    format: ImageFormat::Png,
    width: 64,
    height: 48,
    sharp: true,
    description: "1px black/white checkerboard, maximal Laplacian response",
};

pub const SHARP_JPEG: TestImageFixture = TestImageFixture {
    url: "https://cdn.example.com/frames/s1/original/oak.jpg",
    format: ImageFormat::Jpeg,
    width: 40,
    height: 40,
    sharp: true,
    description: "8px block checkerboard as baseline JPEG",
};

pub const FLAT_PNG: TestImageFixture = TestImageFixture {
    url: "https://cdn.example.com/artworks/u1/original/flat.png",
    format: ImageFormat::Png,
    width: 32,
    height: 32,
    sharp: false,
    description: "Single colour, zero Laplacian variance",
};

pub const CORRUPT_URL: &str = "https://cdn.example.com/artworks/u1/original/corrupt.png";
pub const MISSING_URL: &str = "https://cdn.example.com/artworks/u1/original/missing.png";

impl TestImageFixture {
    pub fn image(&self) -> DynamicImage {
        let block = if self.format == ImageFormat::Jpeg { 8 } else { 1 };
        let img: RgbImage = ImageBuffer::from_fn(self.width, self.height, |x, y| {
            if !self.sharp {
                Rgb([90, 140, 200])
            } else if (x / block + y / block) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        self.image()
            .write_to(&mut buf, self.format)
            .expect("encode test image");
        buf.into_inner()
    }
}

pub const ALL_IMAGES: &[TestImageFixture] = &[SHARP_PNG, SHARP_JPEG, FLAT_PNG];
