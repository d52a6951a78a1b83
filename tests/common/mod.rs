//! Shared helpers for router tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request},
};
use bgremove_server::{BgRemovalError, Result, Segmenter};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, Rgba};
use std::io::Cursor;

pub const BOUNDARY: &str = "----bgremove-test-boundary";

/// Segmenter that clears the left half of the image, or always fails
pub enum MockSegmenter {
    HalfTransparent,
    Failing(String),
}

impl Segmenter for MockSegmenter {
    fn segment(&self, image: &DynamicImage) -> Result<DynamicImage> {
        match self {
            Self::HalfTransparent => {
                let mut rgba = image.to_rgba8();
                let half = rgba.width() / 2;
                for (x, _, pixel) in rgba.enumerate_pixels_mut() {
                    if x < half {
                        *pixel = Rgba([0, 0, 0, 0]);
                    }
                }
                Ok(DynamicImage::ImageRgba8(rgba))
            },
            Self::Failing(message) => Err(BgRemovalError::inference(message.clone())),
        }
    }
}

pub fn solid_image(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(color)))
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, format).unwrap();
    buffer.into_inner()
}

/// Hand-assembled `multipart/form-data` body
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn into_request(mut self, uri: &str) -> Request<Body> {
        self.body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}
