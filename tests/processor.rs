mod common;

use common::builder::MlvBuilder;
use mlv_dng_rs::mlv_pipeline::{ConversionConfig, ErrorKind, FrameOptions, MlvProcessor};
use tempfile::TempDir;
use tiff::decoder::{Decoder, DecodingResult};

#[test]
fn open_read_close_lifecycle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("A001C002.MLV");
    let mut builder = MlvBuilder::new(16, 16, 14);
    builder.video_frame(0, 3000).video_frame(1, 15500);
    builder.write(&path).unwrap();

    let processor = MlvProcessor::new(ConversionConfig::default()).unwrap();
    let (id, attributes) = processor.open(&path).unwrap();
    assert_eq!(attributes.camera.as_deref(), Some("Canon EOS 5D Mark III"));
    assert_eq!(attributes.manufacturer.as_deref(), Some("Canon"));
    assert_eq!(attributes.video_chunks, 2);

    let output = processor
        .read_frame(id, 1, FrameOptions::PRODUCE_HIGHLIGHT_MAP)
        .unwrap();
    assert_eq!(&output.dng[..4], b"II*\0");
    assert_eq!(output.attributes, attributes);

    // every sample of the second frame is clipped
    let map = output.highlight_map.unwrap();
    let mut decoder = Decoder::new(std::io::Cursor::new(map)).unwrap();
    assert_eq!(decoder.dimensions().unwrap(), (16, 16));
    match decoder.read_image().unwrap() {
        DecodingResult::U8(data) => assert!(data.iter().all(|&v| v == 255)),
        _ => panic!("expected 8-bit highlight map"),
    }

    let plain = processor.read_frame(id, 0, FrameOptions::NONE).unwrap();
    assert!(plain.highlight_map.is_none());

    processor.close(id).unwrap();
    let err = processor.read_frame(id, 0, FrameOptions::NONE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn archived_recording_reopens_under_new_handle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.MLV");
    let mut builder = MlvBuilder::new(16, 8, 14);
    builder.video_frame(0, 3000);
    builder.write(&path).unwrap();

    let processor = MlvProcessor::new(ConversionConfig::default()).unwrap();
    let (id, attributes) = processor.open(&path).unwrap();
    let archive = processor.produce_archive(id).unwrap();
    processor.close(id).unwrap();

    let (restored, restored_attributes) = processor.open_archive(&archive).unwrap();
    assert_ne!(restored, id);
    assert_eq!(restored_attributes, attributes);
    assert!(processor.read_frame(restored, 0, FrameOptions::NONE).is_ok());
}

#[test]
fn missing_file_fails_to_open() {
    let processor = MlvProcessor::new(ConversionConfig::default()).unwrap();
    let err = processor.open("/nonexistent/clip.MLV").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileError);
    assert_eq!(processor.open_count(), 0);
}
