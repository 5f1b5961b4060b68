mod common;

use common::*;
use face_emotion_server::pipeline::NO_FACE_MESSAGE;
use face_emotion_server::{
    Annotator, Detection, ErrorKind, FaceBox, FaceEmotionDetector, FaceResult, FileUpload,
    UploadConfig, UploadError, UploadPipeline, UploadedImage,
};
use image::{ImageFormat, Rgb};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

fn pipeline_with(dir: &Path, detector: impl FaceEmotionDetector + 'static) -> UploadPipeline {
    UploadPipeline::new(UploadConfig::new(dir), Some(Arc::new(detector)))
}

fn upload(name: &str, data: Vec<u8>) -> Option<FileUpload> {
    Some(FileUpload::new(name, data))
}

#[test]
fn single_smiling_face_is_annotated() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), FixedDetector::new(vec![smiling_face()]));

    let report = pipeline.process(upload("face.jpg", jpeg_bytes())).unwrap();

    assert_eq!(report.original_image, "face.jpg");
    assert_eq!(report.processed_image.as_deref(), Some("processed_face.jpg"));
    assert_eq!(
        report.results,
        vec![FaceResult {
            emotion: "happy".to_string(),
            bbox: FaceBox::new(10, 10, 50, 50),
        }]
    );
    assert!(report.message.is_none());
    assert_eq!(files_in(dir.path()), ["face.jpg", "processed_face.jpg"]);

    let processed = image::open(dir.path().join("processed_face.jpg")).unwrap();
    assert_eq!((processed.width(), processed.height()), (120, 100));
}

#[test]
fn no_face_keeps_original_without_processed_image() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), FixedDetector::new(Vec::new()));

    let report = pipeline.process(upload("blank.jpg", jpeg_bytes())).unwrap();

    assert_eq!(report.original_image, "blank.jpg");
    assert!(report.processed_image.is_none());
    assert!(report.results.is_empty());
    assert_eq!(report.message.as_deref(), Some(NO_FACE_MESSAGE));
    assert_eq!(files_in(dir.path()), ["blank.jpg"]);
}

#[test]
fn corrupt_image_is_a_decode_error_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let detector = Arc::new(FixedDetector::new(vec![smiling_face()]));
    let pipeline = UploadPipeline::new(UploadConfig::new(dir.path()), Some(detector.clone()));

    let err = pipeline
        .process(upload("notanimage.jpg", b"definitely not an image".to_vec()))
        .unwrap_err();

    assert_eq!(err, UploadError::Decode);
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(files_in(dir.path()).is_empty());
    assert_eq!(detector.calls(), 0);
}

#[test]
fn disallowed_type_is_rejected_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), FixedDetector::new(vec![smiling_face()]));

    let err = pipeline
        .process(upload("document.pdf", b"%PDF-1.4".to_vec()))
        .unwrap_err();

    assert_eq!(err, UploadError::UnsupportedType);
    assert_eq!(err.kind(), ErrorKind::UserInput);
    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn missing_and_empty_files_are_user_errors() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), FixedDetector::new(Vec::new()));

    assert_eq!(pipeline.process(None).unwrap_err(), UploadError::MissingFile);
    assert_eq!(
        pipeline.process(upload("", jpeg_bytes())).unwrap_err(),
        UploadError::EmptyFilename
    );
    assert_eq!(
        pipeline.process(upload("照片.jpg", jpeg_bytes())).unwrap_err(),
        UploadError::InvalidFilename
    );
    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn stored_name_is_sanitized() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), FixedDetector::new(vec![smiling_face()]));

    let data = encoded_image(80, 80, ImageFormat::Png);
    let report = pipeline
        .process(upload("../my summer face.PNG", data))
        .unwrap();

    assert_eq!(report.original_image, "my_summer_face.PNG");
    assert_eq!(
        report.processed_image.as_deref(),
        Some("processed_my_summer_face.PNG")
    );
    assert_eq!(
        files_in(dir.path()),
        ["my_summer_face.PNG", "processed_my_summer_face.PNG"]
    );
}

#[test]
fn uninitialized_detector_keeps_the_upload() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = UploadPipeline::new(UploadConfig::new(dir.path()), None);
    assert!(!pipeline.detector_ready());

    let err = pipeline.process(upload("face.jpg", jpeg_bytes())).unwrap_err();

    assert_eq!(err, UploadError::DetectorUnavailable);
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(files_in(dir.path()), ["face.jpg"]);
}

#[test]
fn detector_failure_cleans_up_and_hides_detail() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), FailingDetector);

    let err = pipeline.process(upload("face.jpg", jpeg_bytes())).unwrap_err();

    assert_eq!(err, UploadError::Processing);
    assert!(!err.to_string().contains(SECRET_DETAIL));
    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn detector_panic_still_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), PanickingDetector);

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pipeline.process(upload("face.jpg", jpeg_bytes()))
    }));

    assert!(outcome.is_err());
    assert!(files_in(dir.path()).is_empty());
}

#[test]
fn processed_write_failure_removes_original() {
    let dir = tempfile::tempdir().unwrap();
    // a directory squatting on the output name makes the write fail
    std::fs::create_dir(dir.path().join("processed_face.jpg")).unwrap();
    let pipeline = pipeline_with(dir.path(), FixedDetector::new(vec![smiling_face()]));

    let err = pipeline.process(upload("face.jpg", jpeg_bytes())).unwrap_err();

    assert_eq!(err, UploadError::Processing);
    assert!(!dir.path().join("face.jpg").exists());
}

#[test]
fn missing_upload_dir_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");
    let pipeline = pipeline_with(&missing, FixedDetector::new(vec![smiling_face()]));

    let err = pipeline.process(upload("face.jpg", jpeg_bytes())).unwrap_err();

    assert_eq!(err, UploadError::Storage);
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(!missing.exists());
}

#[test]
fn results_follow_detector_order_with_sentinels() {
    let dir = tempfile::tempdir().unwrap();
    let detections = vec![
        Detection::new(FaceBox::new(5, 30, 20, 20), Some(json!({"sad": 0.7, "happy": 0.3}))),
        Detection::new(FaceBox::new(30, 30, 20, 20), None),
        Detection::new(FaceBox::new(55, 30, 20, 20), Some(json!("smiling"))),
        Detection::new(FaceBox::new(80, 30, 20, 20), Some(json!({}))),
        Detection::new(FaceBox::new(5, 60, 20, 20), Some(json!({"angry": "high"}))),
    ];
    let expected_boxes: Vec<_> = detections.iter().map(|d| d.bbox).collect();
    let pipeline = pipeline_with(dir.path(), FixedDetector::new(detections));

    let report = pipeline.process(upload("group.jpg", jpeg_bytes())).unwrap();

    let labels: Vec<_> = report.results.iter().map(|r| r.emotion.as_str()).collect();
    assert_eq!(
        labels,
        [
            "sad",
            "no data returned",
            "unrecognized",
            "invalid data",
            "invalid data"
        ]
    );
    let boxes: Vec<_> = report.results.iter().map(|r| r.bbox).collect();
    assert_eq!(boxes, expected_boxes);
    assert!(dir.path().join("processed_group.jpg").exists());
}

#[test]
fn annotation_is_drawn_on_the_processed_copy_only() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), FixedDetector::new(vec![smiling_face()]));

    pipeline
        .process(upload("face.png", encoded_image(100, 100, ImageFormat::Png)))
        .unwrap();

    let original = image::open(dir.path().join("face.png")).unwrap().to_rgb8();
    let processed = image::open(dir.path().join("processed_face.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(*original.get_pixel(10, 10), Rgb([128, 128, 128]));
    assert_eq!(*processed.get_pixel(10, 10), Rgb([255, 0, 0]));
    assert_eq!(*processed.get_pixel(59, 59), Rgb([255, 0, 0]));
    assert_eq!(*processed.get_pixel(35, 35), Rgb([128, 128, 128]));
}

#[test]
fn custom_annotator_style_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let annotator = Annotator {
        color: Rgb([0, 0, 255]),
        thickness: 4,
        ..Annotator::default()
    };
    let pipeline = pipeline_with(dir.path(), FixedDetector::new(vec![smiling_face()]))
        .with_annotator(annotator);

    pipeline
        .process(upload("face.png", encoded_image(100, 100, ImageFormat::Png)))
        .unwrap();

    let processed = image::open(dir.path().join("processed_face.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(*processed.get_pixel(10, 10), Rgb([0, 0, 255]));
    assert_eq!(*processed.get_pixel(13, 13), Rgb([0, 0, 255]));
    assert_eq!(*processed.get_pixel(14, 14), Rgb([128, 128, 128]));
}

#[test]
fn encode_failure_leaves_earlier_processed_image_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("face.unknown");
    std::fs::write(&path, jpeg_bytes()).unwrap();
    let earlier = dir.path().join("processed_face.unknown");
    std::fs::write(&earlier, b"from an earlier request").unwrap();
    let pipeline = pipeline_with(dir.path(), FixedDetector::new(vec![smiling_face()]));

    let stored = UploadedImage {
        filename: "face.unknown".to_string(),
        byte_size: std::fs::metadata(&path).unwrap().len() as usize,
        path: path.clone(),
        extension: "unknown".to_string(),
    };
    let err = pipeline.analyze(&stored).unwrap_err();

    assert_eq!(err, UploadError::Processing);
    assert!(!path.exists());
    assert_eq!(std::fs::read(&earlier).unwrap(), b"from an earlier request");
}

#[test]
fn gif_uploads_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), FixedDetector::new(vec![smiling_face()]));

    let report = pipeline
        .process(upload("anim.gif", encoded_image(90, 90, ImageFormat::Gif)))
        .unwrap();

    assert_eq!(report.processed_image.as_deref(), Some("processed_anim.gif"));
    let processed = image::open(dir.path().join("processed_anim.gif")).unwrap();
    assert_eq!((processed.width(), processed.height()), (90, 90));
}

#[test]
fn reanalyzing_a_stored_upload_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let detections = vec![
        smiling_face(),
        Detection::new(FaceBox::new(70, 20, 30, 30), Some(json!({"fear": 0.6, "sad": 0.4}))),
    ];
    let pipeline = pipeline_with(dir.path(), FixedDetector::new(detections));

    let stored = pipeline
        .accept(&FileUpload::new("face.jpg", jpeg_bytes()))
        .unwrap();
    assert_eq!(stored.filename, "face.jpg");
    assert_eq!(stored.extension, "jpg");
    assert!(stored.path.exists());

    let first = pipeline.analyze(&stored).unwrap();
    let second = pipeline.analyze(&stored).unwrap();
    assert_eq!(first.results, second.results);
    assert_eq!(first.processed_image, second.processed_image);
}

#[test]
fn concurrent_uploads_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let detector = Arc::new(FixedDetector::new(vec![smiling_face()]));
    let pipeline = Arc::new(UploadPipeline::new(
        UploadConfig::new(dir.path()),
        Some(detector.clone()),
    ));

    std::thread::scope(|scope| {
        for i in 0..4 {
            let pipeline = pipeline.clone();
            scope.spawn(move || {
                let report = pipeline
                    .process(upload(&format!("face{i}.jpg"), jpeg_bytes()))
                    .unwrap();
                assert_eq!(report.results.len(), 1);
            });
        }
    });

    assert_eq!(detector.calls(), 4);
    assert_eq!(files_in(dir.path()).len(), 8);
}
