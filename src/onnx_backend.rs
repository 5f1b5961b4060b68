// ONNX Runtime face detection + emotion classification backend

use crate::config::DetectorConfig;
use crate::emotion::FaceEmotionDetector;
use crate::error::{EmotionDetectorError, Result};
use crate::models::{Detection, EmotionState, FaceBox};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// UltraFace-style detector input size
const LOCATOR_INPUT_WIDTH: u32 = 320;
const LOCATOR_INPUT_HEIGHT: u32 = 240;
/// HSEmotion-style classifier input size
const CLASSIFIER_INPUT_SIZE: u32 = 260;

fn load_session(model_path: &Path) -> Result<Session> {
    Session::builder()
        .map_err(|e| {
            EmotionDetectorError::ModelLoad(format!("Failed to create session builder: {e}"))
        })?
        .commit_from_file(model_path)
        .map_err(|e| {
            error!("Failed to load ONNX model {}: {}", model_path.display(), e);
            EmotionDetectorError::ModelLoad(format!(
                "ONNX model load failed for {}: {e}",
                model_path.display()
            ))
        })
}

/// Scored face candidate, corners normalized to 0..1
#[derive(Clone, Copy, Debug, PartialEq)]
struct Candidate {
    score: f32,
    bbox: [f32; 4],
}

/// Face detector using an UltraFace ONNX model
///
/// The model emits `scores` [1, N, 2] and `boxes` [1, N, 4] with normalized
/// corner coordinates.
pub struct FaceLocator {
    session: Mutex<Session>,
    score_threshold: f32,
    iou_threshold: f32,
}

impl FaceLocator {
    pub fn new(model_path: &Path, score_threshold: f32, iou_threshold: f32) -> Result<Self> {
        Ok(Self {
            session: Mutex::new(load_session(model_path)?),
            score_threshold,
            iou_threshold,
        })
    }

    /// Finds faces in `image`, highest score first
    pub fn locate(&self, image: &RgbImage) -> Result<Vec<FaceBox>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let resized = imageops::resize(
            image,
            LOCATOR_INPUT_WIDTH,
            LOCATOR_INPUT_HEIGHT,
            FilterType::Triangle,
        );
        let input = Array4::from_shape_vec(
            (
                1,
                3,
                LOCATOR_INPUT_HEIGHT as usize,
                LOCATOR_INPUT_WIDTH as usize,
            ),
            to_chw(&resized, |p| (p as f32 - 127.0) / 128.0),
        )
        .map_err(|e| EmotionDetectorError::FaceDetection(format!("Bad input shape: {e}")))?;
        let input_tensor = Tensor::from_array(input)?;

        let (scores, boxes) = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| EmotionDetectorError::LockPoisoned)?;
            let outputs = session.run(ort::inputs![input_tensor]).map_err(|e| {
                error!("Face detection inference failed: {}", e);
                EmotionDetectorError::FaceDetection(format!("Inference failed: {e}"))
            })?;
            if outputs.len() < 2 {
                return Err(EmotionDetectorError::FaceDetection(format!(
                    "Expected scores and boxes outputs, got {}",
                    outputs.len()
                )));
            }
            let (_, scores) = outputs[0].try_extract_tensor::<f32>()?;
            let (_, boxes) = outputs[1].try_extract_tensor::<f32>()?;
            (scores.to_vec(), boxes.to_vec())
        };

        let candidates = decode_candidates(&scores, &boxes, self.score_threshold)?;
        let kept = nms(candidates, self.iou_threshold);
        debug!("Face locator kept {} candidates", kept.len());

        Ok(kept
            .iter()
            .filter_map(|c| to_face_box(c, width, height))
            .collect())
    }
}

fn decode_candidates(scores: &[f32], boxes: &[f32], threshold: f32) -> Result<Vec<Candidate>> {
    let count = scores.len() / 2;
    if boxes.len() < count * 4 {
        return Err(EmotionDetectorError::FaceDetection(format!(
            "Mismatched outputs: {} scores, {} box values",
            count,
            boxes.len()
        )));
    }

    Ok((0..count)
        .filter_map(|i| {
            let score = scores[i * 2 + 1];
            (score > threshold).then(|| Candidate {
                score,
                bbox: [
                    boxes[i * 4],
                    boxes[i * 4 + 1],
                    boxes[i * 4 + 2],
                    boxes[i * 4 + 3],
                ],
            })
        })
        .collect())
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;

    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if keep
            .iter()
            .all(|k| iou(&k.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

/// Scales a normalized candidate to pixel space, clamped to the image
fn to_face_box(candidate: &Candidate, width: u32, height: u32) -> Option<FaceBox> {
    let (w, h) = (width as f32, height as f32);
    let x1 = (candidate.bbox[0] * w).clamp(0.0, w);
    let y1 = (candidate.bbox[1] * h).clamp(0.0, h);
    let x2 = (candidate.bbox[2] * w).clamp(0.0, w);
    let y2 = (candidate.bbox[3] * h).clamp(0.0, h);

    let (box_w, box_h) = ((x2 - x1).round(), (y2 - y1).round());
    if box_w < 1.0 || box_h < 1.0 {
        return None;
    }
    Some(FaceBox::new(
        x1.round() as i32,
        y1.round() as i32,
        box_w as i32,
        box_h as i32,
    ))
}

/// Converts HWC RGB pixels to a CHW float buffer
fn to_chw(image: &RgbImage, normalize: impl Fn(u8) -> f32) -> Vec<f32> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let channels = 3;
    let raw = image.as_raw();

    let mut chw_data = vec![0.0f32; channels * height * width];
    for h in 0..height {
        for w in 0..width {
            for c in 0..channels {
                let hwc_idx = (h * width + w) * channels + c;
                let chw_idx = c * (height * width) + h * width + w;
                chw_data[chw_idx] = normalize(raw[hwc_idx]);
            }
        }
    }
    chw_data
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();
    logits
        .iter()
        .map(|&x| (x - max_logit).exp() / exp_sum)
        .collect()
}

/// Emotion classifier using ONNX Runtime
pub struct EmotionClassifier {
    session: Mutex<Session>,
}

impl EmotionClassifier {
    pub fn new(model_path: &Path) -> Result<Self> {
        Ok(Self {
            session: Mutex::new(load_session(model_path)?),
        })
    }

    /// Returns class probabilities for a cropped face, in [`EmotionState::ALL`] order
    pub fn classify(&self, face: &RgbImage) -> Result<Vec<f32>> {
        let size = CLASSIFIER_INPUT_SIZE;
        let resized = imageops::resize(face, size, size, FilterType::Triangle);

        // [1, 3, 260, 260] in CHW, scaled to [0, 1]
        let input_array = Array4::from_shape_vec(
            (1, 3, size as usize, size as usize),
            to_chw(&resized, |p| p as f32 / 255.0),
        )
        .map_err(|e| {
            EmotionDetectorError::Classification(format!("Failed to create input array: {e}"))
        })?;
        let input_tensor = Tensor::from_array(input_array)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmotionDetectorError::LockPoisoned)?;
        let outputs = session.run(ort::inputs![input_tensor]).map_err(|e| {
            error!("Emotion inference failed: {}", e);
            EmotionDetectorError::Classification(format!("Inference failed: {e}"))
        })?;

        let (_, output_value) = outputs.iter().next().ok_or_else(|| {
            EmotionDetectorError::Classification("No output from model".to_string())
        })?;
        let (_, logits) = output_value.try_extract_tensor::<f32>()?;

        Ok(softmax(logits))
    }
}

/// Builds the label -> probability mapping for one face
fn emotion_scores(probabilities: &[f32]) -> Value {
    if probabilities.len() != EmotionState::ALL.len() {
        warn!(
            "Classifier returned {} classes, expected {}",
            probabilities.len(),
            EmotionState::ALL.len()
        );
    }
    let map: Map<String, Value> = EmotionState::ALL
        .iter()
        .zip(probabilities)
        .map(|(state, &p)| (state.label().to_string(), Value::from(f64::from(p))))
        .collect();
    Value::Object(map)
}

fn crop_face(image: &RgbImage, bbox: &FaceBox) -> Option<RgbImage> {
    let x = bbox.x.max(0) as u32;
    let y = bbox.y.max(0) as u32;
    let x2 = (bbox.x + bbox.width).max(0) as u32;
    let y2 = (bbox.y + bbox.height).max(0) as u32;
    let x2 = x2.min(image.width());
    let y2 = y2.min(image.height());
    if x2 <= x || y2 <= y {
        return None;
    }
    Some(imageops::crop_imm(image, x, y, x2 - x, y2 - y).to_image())
}

/// Face + emotion detector combining [`FaceLocator`] and [`EmotionClassifier`]
///
/// Both sessions are behind their own lock, so concurrent requests serialize
/// on inference but never on decoding or drawing.
pub struct OnnxEmotionDetector {
    locator: FaceLocator,
    classifier: EmotionClassifier,
}

impl OnnxEmotionDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let locator = FaceLocator::new(
            &config.face_model,
            config.face_score_threshold,
            config.face_iou_threshold,
        )?;
        let classifier = EmotionClassifier::new(&config.emotion_model)?;
        info!(
            "Loaded face model {} and emotion model {}",
            config.face_model.display(),
            config.emotion_model.display()
        );
        Ok(Self {
            locator,
            classifier,
        })
    }
}

impl FaceEmotionDetector for OnnxEmotionDetector {
    fn detect_emotions(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let rgb = image.to_rgb8();
        let boxes = self.locator.locate(&rgb)?;

        let mut detections = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let emotions = match crop_face(&rgb, &bbox) {
                Some(face) => Some(emotion_scores(&self.classifier.classify(&face)?)),
                None => {
                    warn!("Empty face crop at {:?}, skipping classification", bbox);
                    None
                }
            };
            detections.push(Detection::new(bbox, emotions));
        }
        Ok(detections)
    }
}
