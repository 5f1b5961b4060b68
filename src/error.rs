// Error types for the face emotion server

use thiserror::Error;

/// Internal fault raised by the detector, the codec or storage.
///
/// These carry full diagnostic detail and are only ever logged. Callers of the
/// upload pipeline see an [`UploadError`] instead.
#[derive(Debug, Error)]
pub enum EmotionDetectorError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Face detection failed: {0}")]
    FaceDetection(String),

    #[error("Emotion classification failed: {0}")]
    Classification(String),

    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(String),

    #[error("Detector lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),
}

/// Result type alias for internal operations
pub type Result<T> = std::result::Result<T, EmotionDetectorError>;

// Conversion from ONNX Runtime errors
#[cfg(feature = "onnx")]
impl From<ort::Error> for EmotionDetectorError {
    fn from(err: ort::Error) -> Self {
        EmotionDetectorError::OnnxRuntime(err.to_string())
    }
}

/// Class of an upload failure, used to pick side effects and status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing file, disallowed type.
    UserInput,
    /// The upload could not be written to storage.
    Storage,
    /// The stored bytes are not a decodable image.
    Decode,
    /// The detection capability is not available.
    Configuration,
    /// Any other fault during detection, annotation or encoding.
    Processing,
}

/// Failure reported back to the uploader.
///
/// The `Display` text is the user-facing message. It never contains internal
/// error detail.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("No file selected.")]
    MissingFile,

    #[error("Filename is empty.")]
    EmptyFilename,

    #[error("Unsupported file type. Please upload a 'png', 'jpg', 'jpeg' or 'gif' image.")]
    UnsupportedType,

    #[error("The filename contains no usable characters. Please rename the file and try again.")]
    InvalidFilename,

    #[error("Failed to save the uploaded file.")]
    Storage,

    #[error("Could not load the image. Please make sure it is a valid image file.")]
    Decode,

    #[error("The emotion detector failed to initialize. Please check the server logs.")]
    DetectorUnavailable,

    #[error("An internal error occurred while processing the image. See the server logs for details.")]
    Processing,
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::MissingFile
            | UploadError::EmptyFilename
            | UploadError::UnsupportedType
            | UploadError::InvalidFilename => ErrorKind::UserInput,
            UploadError::Storage => ErrorKind::Storage,
            UploadError::Decode => ErrorKind::Decode,
            UploadError::DetectorUnavailable => ErrorKind::Configuration,
            UploadError::Processing => ErrorKind::Processing,
        }
    }
}
