use std::io::Cursor;
use std::sync::Arc;

use bgrelay::{ErrorKind, IngestError, Pipeline, PipelineError, RelayConfig, Upload};
use image::{DynamicImage, ImageFormat, RgbaImage};
use remover::StubRemover;
use store::InMemoryArtifactStore;

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::new(width, height))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn pipeline() -> Pipeline {
    Pipeline::new(
        RelayConfig::default(),
        Arc::new(InMemoryArtifactStore::new()),
        Arc::new(StubRemover::identity()),
    )
}

fn reject(filename: &str, bytes: Vec<u8>) -> PipelineError {
    pipeline()
        .process_single(&Upload::new(filename, bytes))
        .expect_err("upload should be rejected")
}

#[test]
fn valid_png_named_txt_fails_on_extension() {
    let err = reject("picture.txt", png_bytes(4, 4));
    assert!(matches!(
        err,
        PipelineError::Input(IngestError::UnsupportedExtension { .. })
    ));
    assert_eq!(err.kind(), ErrorKind::Input);
}

#[test]
fn text_named_png_fails_content_sniff() {
    let err = reject("picture.png", b"I am definitely not a PNG".to_vec());
    assert_eq!(err.reason_code(), "not_an_image");
    assert_eq!(err.kind(), ErrorKind::Input);
}

#[test]
fn truncated_png_fails_content_sniff() {
    let mut bytes = png_bytes(16, 16);
    bytes.truncate(bytes.len() / 2);
    let err = reject("cut.png", bytes);
    assert_eq!(err.reason_code(), "not_an_image");
}

#[test]
fn empty_inputs_are_input_errors() {
    assert_eq!(reject("a.png", Vec::new()).reason_code(), "empty_upload");
    assert_eq!(reject("", png_bytes(2, 2)).reason_code(), "missing_filename");
    assert_eq!(reject("../", png_bytes(2, 2)).reason_code(), "invalid_filename");
}

#[test]
fn path_components_in_filename_are_stripped() {
    let processed = pipeline()
        .process_single(&Upload::new("../../etc/cat.png", png_bytes(2, 2)))
        .unwrap();
    assert_eq!(processed.filename, "cat.png");
}

#[test]
fn oversized_image_names_dimensions() {
    let mut config = RelayConfig::default();
    config.ingest.max_dimension = 10;
    let pipeline = Pipeline::new(
        config,
        Arc::new(InMemoryArtifactStore::new()),
        Arc::new(StubRemover::identity()),
    );
    let err = pipeline
        .process_single(&Upload::new("tall.png", png_bytes(5, 11)))
        .unwrap_err();
    assert!(err.to_string().contains("5x11"));
}

#[test]
fn adapter_failure_is_processing_kind() {
    let pipeline = Pipeline::new(
        RelayConfig::default(),
        Arc::new(InMemoryArtifactStore::new()),
        Arc::new(StubRemover::failing("cuda out of memory")),
    );
    let err = pipeline
        .process_single(&Upload::new("a.png", png_bytes(2, 2)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Processing);
    assert!(err.to_string().contains("cuda out of memory"));
}

#[test]
fn malformed_ids_never_reach_storage() {
    let pipeline = pipeline();
    let too_long = "a".repeat(65);
    for raw in ["..", "../x", "a%2Fb", "id.png", too_long.as_str()] {
        let err = pipeline.fetch(raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input, "{raw}");
        assert_eq!(err.reason_code(), "invalid_id");
    }
}

#[test]
fn unknown_id_is_not_found() {
    let err = pipeline()
        .fetch("5f1c0a9e-1111-4c2b-9a0e-000000000000")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
