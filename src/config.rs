// Process configuration: command line flags with environment fallbacks

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

/// Largest accepted request body
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Parser, Debug, Clone)]
#[command(name = "face-emotion-server")]
#[command(author, version, about = "Upload a photo and get its faces annotated with emotions", long_about = None)]
pub struct AppConfig {
    /// Interface to bind
    #[arg(long, env = "EMOTION_SERVER_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "EMOTION_SERVER_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Directory where originals and annotated images are stored
    #[arg(long, env = "EMOTION_SERVER_UPLOAD_DIR", default_value = "static/uploads")]
    pub upload_dir: PathBuf,

    /// Maximum request body size in bytes
    #[arg(long, env = "EMOTION_SERVER_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Number of request worker threads
    #[arg(long, env = "EMOTION_SERVER_THREADS", default_value_t = 8)]
    pub threads: usize,

    /// Write logs to this file instead of stdout
    #[arg(long, env = "EMOTION_SERVER_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[command(flatten)]
    pub detector: DetectorConfig,
}

impl AppConfig {
    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig::new(self.upload_dir.clone())
    }
}

/// Model locations and thresholds for the ONNX backend
#[derive(clap::Args, Debug, Clone)]
pub struct DetectorConfig {
    /// UltraFace ONNX face detection model
    #[arg(
        long,
        env = "EMOTION_SERVER_FACE_MODEL",
        default_value = "assets/models/version-RFB-320.onnx"
    )]
    pub face_model: PathBuf,

    /// Emotion classification ONNX model
    #[arg(
        long,
        env = "EMOTION_SERVER_EMOTION_MODEL",
        default_value = "assets/models/emotion.onnx"
    )]
    pub emotion_model: PathBuf,

    /// Minimum face score to keep a detection
    #[arg(long, env = "EMOTION_SERVER_FACE_SCORE_THRESHOLD", default_value_t = 0.7)]
    pub face_score_threshold: f32,

    /// Overlap above which weaker face detections are suppressed
    #[arg(long, env = "EMOTION_SERVER_FACE_IOU_THRESHOLD", default_value_t = 0.3)]
    pub face_iou_threshold: f32,
}

/// Immutable settings handed to the upload pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    pub upload_dir: PathBuf,
}

impl UploadConfig {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = AppConfig::parse_from(["face-emotion-server"]);
        assert_eq!(config.port, 5000);
        assert_eq!(config.host.to_string(), "0.0.0.0");
        assert_eq!(config.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(config.threads, 8);
        assert_eq!(config.upload_config().upload_dir, PathBuf::from("static/uploads"));
        assert!(config.log_file.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let config = AppConfig::parse_from([
            "face-emotion-server",
            "--port",
            "8080",
            "--upload-dir",
            "/tmp/uploads",
            "--threads",
            "2",
            "--face-score-threshold",
            "0.5",
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/uploads"));
        assert_eq!(config.threads, 2);
        assert_eq!(config.detector.face_score_threshold, 0.5);
    }

    #[test]
    fn thresholds_fall_back_to_environment() {
        std::env::set_var("EMOTION_SERVER_FACE_SCORE_THRESHOLD", "0.55");
        std::env::set_var("EMOTION_SERVER_FACE_IOU_THRESHOLD", "0.45");
        let config = AppConfig::parse_from(["face-emotion-server"]);
        std::env::remove_var("EMOTION_SERVER_FACE_SCORE_THRESHOLD");
        std::env::remove_var("EMOTION_SERVER_FACE_IOU_THRESHOLD");

        assert_eq!(config.detector.face_score_threshold, 0.55);
        assert_eq!(config.detector.face_iou_threshold, 0.45);
    }
}
