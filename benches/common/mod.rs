//! Fixture generators shared by bgrelay benchmarks.

#![allow(dead_code)]

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

/// Square sizes used across benchmark groups.
pub const SIDES: [u32; 4] = [64, 256, 1024, 2048];

/// A gradient image, so encoders can't collapse it to nothing.
pub fn gradient(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    DynamicImage::ImageRgb8(img)
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), format)
        .expect("fixture encoding");
    buf
}

pub fn png_square(side: u32) -> Vec<u8> {
    encode(&gradient(side, side), ImageFormat::Png)
}

pub fn jpeg_square(side: u32) -> Vec<u8> {
    encode(&gradient(side, side), ImageFormat::Jpeg)
}
