#![allow(dead_code)]

use face_emotion_server::error::{EmotionDetectorError, Result};
use face_emotion_server::{Detection, FaceBox, FaceEmotionDetector};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::json;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Always returns the same detections
pub struct FixedDetector {
    pub detections: Vec<Detection>,
    pub calls: AtomicUsize,
}

impl FixedDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FaceEmotionDetector for FixedDetector {
    fn detect_emotions(&self, _image: &DynamicImage) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.detections.clone())
    }
}

/// Fails every call with an internal-looking message
pub struct FailingDetector;

pub const SECRET_DETAIL: &str = "tensor shape mismatch in layer conv_17";

impl FaceEmotionDetector for FailingDetector {
    fn detect_emotions(&self, _image: &DynamicImage) -> Result<Vec<Detection>> {
        Err(EmotionDetectorError::FaceDetection(SECRET_DETAIL.to_string()))
    }
}

/// Panics on every call
pub struct PanickingDetector;

impl FaceEmotionDetector for PanickingDetector {
    fn detect_emotions(&self, _image: &DynamicImage) -> Result<Vec<Detection>> {
        panic!("detector crashed");
    }
}

/// One smiling face at (10, 10, 50, 50)
pub fn smiling_face() -> Detection {
    Detection::new(
        FaceBox::new(10, 10, 50, 50),
        Some(json!({"happy": 0.95, "neutral": 0.05})),
    )
}

/// Encodes a mid-gray test picture in `format`
pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([128, 128, 128]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("encode test image");
    bytes
}

pub fn jpeg_bytes() -> Vec<u8> {
    encoded_image(120, 100, ImageFormat::Jpeg)
}

/// Sorted names of the files in `dir`
pub fn files_in(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("read upload dir")
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
