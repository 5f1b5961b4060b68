// Core data models for the face emotion server

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Axis-aligned face bounding box in pixel coordinates.
///
/// Serialized as `[x, y, width, height]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl From<[i32; 4]> for FaceBox {
    fn from([x, y, width, height]: [i32; 4]) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<FaceBox> for [i32; 4] {
    fn from(b: FaceBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

/// One face found by a detector.
///
/// `emotions` is the raw emotion-score mapping as the detector reported it. It
/// is normally an object of label to number, but detectors may return nothing,
/// non-numeric values or something that is not a mapping at all.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: FaceBox,
    pub emotions: Option<Value>,
}

impl Detection {
    pub fn new(bbox: FaceBox, emotions: Option<Value>) -> Self {
        Self { bbox, emotions }
    }
}

/// Per-face result: dominant emotion label plus the detector's box.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceResult {
    pub emotion: String,
    #[serde(rename = "box")]
    pub bbox: FaceBox,
}

/// Emotion classes produced by the bundled classifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EmotionState {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
    Contempt,
}

impl EmotionState {
    /// Classifier output order: 0=Angry, 1=Disgust, 2=Fear, 3=Happy, 4=Sad,
    /// 5=Surprise, 6=Neutral, 7=Contempt
    pub const ALL: [EmotionState; 8] = [
        EmotionState::Angry,
        EmotionState::Disgust,
        EmotionState::Fear,
        EmotionState::Happy,
        EmotionState::Sad,
        EmotionState::Surprise,
        EmotionState::Neutral,
        EmotionState::Contempt,
    ];

    /// Lowercase label used as the key in emotion-score mappings
    pub fn label(self) -> &'static str {
        match self {
            EmotionState::Angry => "angry",
            EmotionState::Disgust => "disgust",
            EmotionState::Fear => "fear",
            EmotionState::Happy => "happy",
            EmotionState::Sad => "sad",
            EmotionState::Surprise => "surprise",
            EmotionState::Neutral => "neutral",
            EmotionState::Contempt => "contempt",
        }
    }
}

impl std::fmt::Display for EmotionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A file as received from the client, before validation.
#[derive(Clone, Debug)]
pub struct FileUpload {
    /// Client-supplied filename, unsanitized
    pub filename: String,
    pub data: Vec<u8>,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
        }
    }
}

/// An accepted upload that has been written to the upload directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedImage {
    /// Sanitized filename, also the name on disk
    pub filename: String,
    pub path: PathBuf,
    pub byte_size: usize,
    /// Lowercased extension, one of the allowed ones
    pub extension: String,
}

/// Successful analysis of one upload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub original_image: String,
    pub processed_image: Option<String>,
    pub results: Vec<FaceResult>,
    pub message: Option<String>,
}

/// Terminal artifact of one request: a report or a caller-facing error.
pub type PipelineOutcome = std::result::Result<AnalysisReport, crate::error::UploadError>;
