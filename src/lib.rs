// Library exports for the face emotion server

pub mod annotate;
pub mod config;
pub mod emotion;
pub mod error;
pub mod filename;
pub mod models;
#[cfg(feature = "onnx")]
pub mod onnx_backend;
pub mod pipeline;
pub mod server;
pub mod ui;

pub use annotate::Annotator;
pub use config::{AppConfig, DetectorConfig, UploadConfig};
pub use emotion::{dominant_emotion, DominantEmotion, FaceEmotionDetector};
pub use error::{EmotionDetectorError, ErrorKind, UploadError};
pub use models::{
    AnalysisReport, Detection, FaceBox, FaceResult, FileUpload, PipelineOutcome, UploadedImage,
};
pub use pipeline::UploadPipeline;
