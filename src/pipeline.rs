// Upload-to-annotated-result pipeline

use crate::annotate::Annotator;
use crate::config::UploadConfig;
use crate::emotion::{dominant_emotion, FaceEmotionDetector};
use crate::error::{EmotionDetectorError, Result, UploadError};
use crate::filename::{allowed_file, extension_of, sanitize_filename};
use crate::models::{
    AnalysisReport, Detection, FaceResult, FileUpload, PipelineOutcome, UploadedImage,
};
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shown when the detector found no face
pub const NO_FACE_MESSAGE: &str = "No face was detected in this image.";

/// Prefix of the annotated copy's filename
pub const PROCESSED_PREFIX: &str = "processed_";

/// Files written during one request, removed on drop unless released.
struct ArtifactGuard {
    paths: Vec<PathBuf>,
}

impl ArtifactGuard {
    fn new() -> Self {
        Self { paths: Vec::new() }
    }

    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Keeps every tracked file.
    fn release(mut self) {
        self.paths.clear();
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if !path.exists() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => info!("Removed {}", path.display()),
                Err(e) => error!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

/// Validates, stores and analyses uploaded photos.
///
/// Holds no mutable state, so one instance is shared by every request worker.
/// The detector is `None` when it failed to initialize at startup.
pub struct UploadPipeline {
    config: UploadConfig,
    detector: Option<Arc<dyn FaceEmotionDetector>>,
    annotator: Annotator,
}

impl UploadPipeline {
    pub fn new(config: UploadConfig, detector: Option<Arc<dyn FaceEmotionDetector>>) -> Self {
        Self {
            config,
            detector,
            annotator: Annotator::default(),
        }
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn detector_ready(&self) -> bool {
        self.detector.is_some()
    }

    /// Runs the whole pipeline for one request.
    ///
    /// `upload` is `None` when the request carried no file field.
    pub fn process(&self, upload: Option<FileUpload>) -> PipelineOutcome {
        let upload = upload.ok_or(UploadError::MissingFile)?;
        let image = self.accept(&upload)?;
        self.analyze(&image)
    }

    /// Validates the filename and writes the raw bytes to the upload directory.
    pub fn accept(&self, upload: &FileUpload) -> std::result::Result<UploadedImage, UploadError> {
        if upload.filename.is_empty() {
            return Err(UploadError::EmptyFilename);
        }
        if !allowed_file(&upload.filename) {
            warn!("Rejected upload with disallowed type: {:?}", upload.filename);
            return Err(UploadError::UnsupportedType);
        }

        let filename = sanitize_filename(&upload.filename);
        let Some(extension) = extension_of(&filename).filter(|_| allowed_file(&filename)) else {
            warn!(
                "Upload name {:?} sanitized to unusable {:?}",
                upload.filename, filename
            );
            return Err(UploadError::InvalidFilename);
        };

        let path = self.config.upload_dir.join(&filename);
        let mut guard = ArtifactGuard::new();
        guard.track(path.clone());
        if let Err(e) = fs::write(&path, &upload.data) {
            error!("Failed to save {}: {}", path.display(), e);
            return Err(UploadError::Storage);
        }
        guard.release();

        info!("Saved upload {} ({} bytes)", path.display(), upload.data.len());
        Ok(UploadedImage {
            filename,
            path,
            byte_size: upload.data.len(),
            extension,
        })
    }

    /// Decodes a stored upload, detects faces and writes the annotated copy.
    ///
    /// On any failure after storage, every file this call is responsible for
    /// is removed, except when the detector is unavailable (the upload itself
    /// was fine) or when no face was found.
    pub fn analyze(&self, image: &UploadedImage) -> PipelineOutcome {
        let mut guard = ArtifactGuard::new();
        guard.track(image.path.clone());

        info!("Processing image {}", image.path.display());
        let decoded = match decode_image(&image.path) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Could not load image {}: {}", image.path.display(), e);
                return Err(UploadError::Decode);
            }
        };

        let Some(detector) = &self.detector else {
            error!("Emotion detector is not initialized");
            guard.release();
            return Err(UploadError::DetectorUnavailable);
        };

        let detections = detector
            .detect_emotions(&decoded)
            .map_err(|e| processing_fault(&image.filename, e))?;

        if detections.is_empty() {
            info!("{} File: {}", NO_FACE_MESSAGE, image.filename);
            guard.release();
            return Ok(AnalysisReport {
                original_image: image.filename.clone(),
                processed_image: None,
                results: Vec::new(),
                message: Some(NO_FACE_MESSAGE.to_string()),
            });
        }

        info!(
            "Detected {} face(s) in {}",
            detections.len(),
            image.filename
        );
        let results = resolve_faces(&detections);
        let annotated = self.annotator.annotate(&decoded, &results);

        let processed_filename = format!("{PROCESSED_PREFIX}{}", image.filename);
        let processed_path = self.config.upload_dir.join(&processed_filename);
        let encoded = encode_annotated(annotated, &processed_path)
            .map_err(|e| processing_fault(&image.filename, e))?;
        // only a file this call writes is ours to remove
        guard.track(processed_path.clone());
        fs::write(&processed_path, encoded)
            .map_err(|e| processing_fault(&image.filename, e.into()))?;
        guard.release();

        info!("Saved processed image {}", processed_path.display());
        Ok(AnalysisReport {
            original_image: image.filename.clone(),
            processed_image: Some(processed_filename),
            results,
            message: None,
        })
    }
}

/// One [`FaceResult`] per detection, same order.
pub fn resolve_faces(detections: &[Detection]) -> Vec<FaceResult> {
    detections
        .iter()
        .enumerate()
        .map(|(i, detection)| {
            debug!(
                "Face {} @ {:?}: raw emotions {:?}",
                i + 1,
                detection.bbox,
                detection.emotions
            );
            let emotion = dominant_emotion(detection.emotions.as_ref()).into_label();
            info!("Face {}: dominant emotion {}", i + 1, emotion);
            FaceResult {
                emotion,
                bbox: detection.bbox,
            }
        })
        .collect()
}

fn processing_fault(filename: &str, err: EmotionDetectorError) -> UploadError {
    error!("Processing {} failed: {}", filename, err);
    UploadError::Processing
}

fn decode_image(path: &Path) -> Result<DynamicImage> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

/// Encodes in the format named by the output path's extension.
fn encode_annotated(annotated: RgbImage, path: &Path) -> Result<Vec<u8>> {
    let format = ImageFormat::from_path(path)?;
    let mut encoded = Vec::new();
    DynamicImage::ImageRgb8(annotated).write_to(&mut Cursor::new(&mut encoded), format)?;
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FaceBox;
    use serde_json::json;

    #[test]
    fn guard_removes_tracked_files_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept.txt");
        let dropped = dir.path().join("dropped.txt");
        fs::write(&kept, b"k").unwrap();
        fs::write(&dropped, b"d").unwrap();

        let mut guard = ArtifactGuard::new();
        guard.track(kept.clone());
        guard.release();

        let mut guard = ArtifactGuard::new();
        guard.track(dropped.clone());
        guard.track(dir.path().join("never-written.txt"));
        drop(guard);

        assert!(kept.exists());
        assert!(!dropped.exists());
    }

    #[test]
    fn resolve_preserves_order_and_boxes() {
        let detections = vec![
            Detection::new(FaceBox::new(1, 1, 5, 5), Some(json!({"sad": 0.6, "happy": 0.4}))),
            Detection::new(FaceBox::new(9, 9, 5, 5), None),
        ];
        let results = resolve_faces(&detections);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].emotion, "sad");
        assert_eq!(results[0].bbox, FaceBox::new(1, 1, 5, 5));
        assert_eq!(results[1].emotion, "no data returned");
        assert_eq!(results[1].bbox, FaceBox::new(9, 9, 5, 5));
    }

    #[test]
    fn encode_rejects_unknown_extension() {
        let path = Path::new("processed_face.unknown");
        assert!(encode_annotated(RgbImage::new(4, 4), path).is_err());
        assert!(encode_annotated(RgbImage::new(4, 4), Path::new("processed_face.png")).is_ok());
    }
}
