use clap::Parser;
use face_emotion_server::config::{AppConfig, DetectorConfig};
use face_emotion_server::emotion::FaceEmotionDetector;
use face_emotion_server::error::{EmotionDetectorError, Result};
use face_emotion_server::pipeline::UploadPipeline;
use face_emotion_server::server;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes logging: file only when a log file is configured, stdout otherwise
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let log_file = std::fs::File::create(path).map_err(EmotionDetectorError::Io)?;
            let file_layer = fmt::layer()
                .with_writer(Arc::new(log_file))
                .with_ansi(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }

    Ok(())
}

/// Builds the process-wide detector. `None` leaves the server running but
/// every analysis reports a configuration error.
#[cfg(feature = "onnx")]
fn load_detector(config: &DetectorConfig) -> Option<Arc<dyn FaceEmotionDetector>> {
    use face_emotion_server::onnx_backend::OnnxEmotionDetector;
    use tracing::error;

    info!("Initializing ONNX emotion detector");
    match OnnxEmotionDetector::new(config) {
        Ok(detector) => {
            info!("Emotion detector initialized");
            Some(Arc::new(detector))
        }
        Err(e) => {
            error!("Failed to initialize emotion detector: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "onnx"))]
fn load_detector(config: &DetectorConfig) -> Option<Arc<dyn FaceEmotionDetector>> {
    warn!(
        "Built without the `onnx` feature, ignoring models {} and {}",
        config.face_model.display(),
        config.emotion_model.display()
    );
    None
}

fn main() -> Result<()> {
    let config = AppConfig::parse();
    init_logging(config.log_file.as_deref())?;

    std::fs::create_dir_all(&config.upload_dir)?;

    let detector = load_detector(&config.detector);
    if detector.is_none() {
        warn!("Emotion detector unavailable; uploads will report a configuration error");
    }
    let pipeline = UploadPipeline::new(config.upload_config(), detector);

    let threads = config.threads.max(1);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .max_blocking_threads(threads)
        .enable_all()
        .build()?;

    info!(
        "Starting server on {}:{} with {} worker threads, uploads in {}",
        config.host,
        config.port,
        threads,
        config.upload_dir.display()
    );
    runtime.block_on(server::serve(&config, pipeline))
}
