// Emotion capability boundary and dominant-emotion selection

use crate::error::Result;
use crate::models::Detection;
use image::DynamicImage;
use serde_json::Value;

/// Label used when the detector returned no emotion data for a face
pub const NO_DATA_LABEL: &str = "no data returned";
/// Label used when the emotion mapping had no numeric scores
pub const INVALID_DATA_LABEL: &str = "invalid data";
/// Label used when the emotion data was not a mapping at all
pub const UNRECOGNIZED_LABEL: &str = "unrecognized";

/// Pluggable face detection + emotion classification backend.
///
/// Implementations are constructed once per process and shared between
/// request workers, so they must be safe to call concurrently. A backend whose
/// model cannot run concurrently has to serialize calls internally.
pub trait FaceEmotionDetector: Send + Sync {
    /// Returns one [`Detection`] per face, in the backend's own order.
    fn detect_emotions(&self, image: &DynamicImage) -> Result<Vec<Detection>>;
}

/// Outcome of dominant-emotion selection for one face.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DominantEmotion {
    /// Key with the highest numeric score
    Label(String),
    /// Emotion data was absent
    NoData,
    /// Mapping present but without any numeric score
    InvalidData,
    /// Emotion data was not a mapping
    Unrecognized,
}

impl DominantEmotion {
    pub fn as_str(&self) -> &str {
        match self {
            DominantEmotion::Label(label) => label,
            DominantEmotion::NoData => NO_DATA_LABEL,
            DominantEmotion::InvalidData => INVALID_DATA_LABEL,
            DominantEmotion::Unrecognized => UNRECOGNIZED_LABEL,
        }
    }

    pub fn into_label(self) -> String {
        match self {
            DominantEmotion::Label(label) => label,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for DominantEmotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the dominant emotion out of a raw emotion-score mapping.
///
/// Non-numeric entries are ignored. Ties go to the key seen first in the
/// mapping's insertion order. `None` and JSON `null` both count as absent.
/// Booleans are not scores.
pub fn dominant_emotion(emotions: Option<&Value>) -> DominantEmotion {
    let map = match emotions {
        None | Some(Value::Null) => return DominantEmotion::NoData,
        Some(Value::Object(map)) => map,
        Some(_) => return DominantEmotion::Unrecognized,
    };

    let mut best: Option<(&String, f64)> = None;
    for (label, score) in map {
        let Some(score) = score.as_f64() else {
            continue;
        };
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((label, score)),
        }
    }

    match best {
        Some((label, _)) => DominantEmotion::Label(label.clone()),
        None => DominantEmotion::InvalidData,
    }
}
