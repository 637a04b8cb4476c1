//! Pipeline driver tests
//!
//! These run whole pipelines over in-memory and channel sources and check the
//! frame, scene and failure accounting.

use super::*;
use crate::codec::FORMAT_SCAN_SIZE;
use crate::sources::{ChannelSource, MemorySource};
use crate::test_utils::{Chroma, chunk_bytes, synthetic_y4m, unrecognized_bytes};
use std::time::Duration;

fn config(target_frames: usize) -> PipelineConfig {
    PipelineConfig { target_frames, ..PipelineConfig::default() }
}

#[tokio::test]
async fn decodes_target_frames_with_consecutive_scene_ids() {
    let _ = tracing_subscriber::fmt::try_init();
    let data = synthetic_y4m(64, 64, 12, Chroma::C420Jpeg);
    let total = data.len() as u64;
    let source = MemorySource::from_chunks("clip.y4m", chunk_bytes(&data, 1000));

    let pipeline = Pipeline::new(config(10)).unwrap();
    let mut counter = SceneCounter::new();
    let report = pipeline.run(source, &mut counter).await.unwrap();

    assert_eq!(report.source_name, "clip.y4m");
    assert_eq!(report.total_bytes, total);
    assert_eq!(report.acknowledged_bytes, total);
    assert_eq!(report.scene_ids, (0..10).collect::<Vec<_>>());
    assert!(report.reached_target());
    assert_eq!(counter.scene_ids(), report.scene_ids.as_slice());
    assert_eq!(counter.bytes(), 10 * 64 * 64 * 4);

    let metadata = report.metadata.unwrap();
    assert_eq!((metadata.frame_width, metadata.frame_height), (64, 64));
}

#[tokio::test]
async fn short_stream_stops_early() {
    let data = synthetic_y4m(16, 16, 3, Chroma::C420Jpeg);
    let pipeline = Pipeline::new(config(10)).unwrap();
    let mut counter = SceneCounter::new();
    let report = pipeline.run(MemorySource::new("short", data, 7), &mut counter).await.unwrap();

    assert_eq!(report.frames_processed(), 3);
    assert!(!report.reached_target());
}

#[tokio::test]
async fn unmet_target_is_an_error_when_required() {
    let data = synthetic_y4m(16, 16, 2, Chroma::C420Jpeg);
    let pipeline = Pipeline::new(PipelineConfig {
        require_target_frames: true,
        ..config(5)
    })
    .unwrap();
    let err = pipeline.run(MemorySource::new("short", data, 0), &mut SceneCounter::new()).await;
    assert!(matches!(err, Err(DecoderError::FrameTarget { expected: 5, actual: 2 })));
}

#[tokio::test]
async fn empty_source_finishes_without_metadata() {
    let pipeline = Pipeline::new(config(10)).unwrap();
    let source = MemorySource::from_chunks("empty", Vec::<Vec<u8>>::new());
    let report = pipeline.run(source, &mut SceneCounter::new()).await.unwrap();

    assert_eq!(report.chunk_count, 0);
    assert!(report.metadata.is_none());
    assert_eq!(report.frames_processed(), 0);
}

#[tokio::test]
async fn downscales_large_sources() {
    let data = synthetic_y4m(640, 480, 2, Chroma::C420Jpeg);
    let pipeline = Pipeline::new(config(2)).unwrap();
    let mut counter = SceneCounter::new();
    let report = pipeline.run(MemorySource::new("vga", data, 4096), &mut counter).await.unwrap();

    let metadata = report.metadata.unwrap();
    assert_eq!((metadata.frame_width, metadata.frame_height), (160, 120));
    assert_eq!(counter.bytes(), 2 * 160 * 120 * 4);
}

#[tokio::test]
async fn consumer_error_aborts_with_scene_id() {
    let data = synthetic_y4m(8, 8, 4, Chroma::C420Jpeg);
    let pipeline = Pipeline::new(config(4)).unwrap();
    let mut consumer = |scene_id: u64, _: &DecodedFrame| -> anyhow::Result<()> {
        anyhow::ensure!(scene_id < 2, "storage full");
        Ok(())
    };
    let err = pipeline.run(MemorySource::new("clip", data, 0), &mut consumer).await.unwrap_err();
    assert!(matches!(err, DecoderError::Consumer { scene_id: 2, .. }));
}

#[tokio::test]
async fn malformed_source_is_fatal() {
    let pipeline = Pipeline::new(config(4)).unwrap();
    let source = MemorySource::new("junk", unrecognized_bytes(FORMAT_SCAN_SIZE as usize + 1), 0);
    let err = pipeline.run(source, &mut SceneCounter::new()).await.unwrap_err();
    assert!(matches!(err, DecoderError::Container { .. }));
}

#[tokio::test]
async fn short_unrecognized_source_finishes_without_metadata() {
    let pipeline = Pipeline::new(config(4)).unwrap();
    let source = MemorySource::new("stub", b"not a video stream\n".to_vec(), 0);
    let report = pipeline.run(source, &mut SceneCounter::new()).await.unwrap();
    assert!(report.metadata.is_none());
    assert_eq!(report.acknowledged_bytes, 19);
}

#[tokio::test]
async fn buffer_cap_smaller_than_source_aborts_and_stops_worker() {
    let data = synthetic_y4m(32, 32, 4, Chroma::C420Jpeg);
    let mut config = config(4);
    config.decoder.max_buffered_bytes = data.len() / 2;
    let pipeline = Pipeline::new(config).unwrap();

    let mut worker = Worker::spawn(&pipeline.config().decoder);
    let mut frames = worker.on_frame_available();
    let source = MemorySource::from_chunks("capped", chunk_bytes(&data, 512));
    let err = pipeline.run_on(&mut worker, source, &mut SceneCounter::new()).await.unwrap_err();

    assert!(matches!(err, DecoderError::ResourceExhausted { .. }), "{err:?}");
    assert!(worker.is_terminated());
    assert!(frames.next().await.is_none());
    assert!(matches!(worker.status().await, Err(DecoderError::WorkerTerminated)));
}

#[tokio::test]
async fn source_error_is_fatal() {
    let (source, sender) = ChannelSource::new("net", 2);
    sender.send(Ok(synthetic_y4m(8, 8, 1, Chroma::C420Jpeg))).await.unwrap();
    sender.send(Err(DecoderError::source_failed("HTTP 503"))).await.unwrap();

    let pipeline = Pipeline::new(config(1)).unwrap();
    let err = pipeline.run(source, &mut SceneCounter::new()).await.unwrap_err();
    assert!(matches!(err, DecoderError::Source { .. }));
}

#[tokio::test]
async fn stream_timeout_keeps_collected_chunks() {
    let (source, sender) = ChannelSource::new("stalled", 2);
    sender.send(Ok(synthetic_y4m(8, 8, 2, Chroma::C420Jpeg))).await.unwrap();

    let pipeline = Pipeline::new(PipelineConfig {
        stream_timeout_ms: Duration::from_millis(100).as_millis() as u64,
        ..config(2)
    })
    .unwrap();
    let report = pipeline.run(source, &mut SceneCounter::new()).await.unwrap();

    assert_eq!(report.chunk_count, 1);
    assert_eq!(report.frames_processed(), 2);
    drop(sender);
}

#[tokio::test]
async fn configured_source_name_overrides_source() {
    let mut config = config(1);
    config.decoder.source_name = Some("camera-7".to_string());
    let pipeline = Pipeline::new(config).unwrap();
    let data = synthetic_y4m(8, 8, 1, Chroma::Mono);
    let report = pipeline.run(MemorySource::new("raw", data, 0), &mut SceneCounter::new()).await.unwrap();
    assert_eq!(report.source_name, "camera-7");
}

#[test]
fn invalid_config_is_rejected() {
    let config = PipelineConfig { frame_timeout_ms: 0, ..PipelineConfig::default() };
    assert!(matches!(Pipeline::new(config), Err(DecoderError::Config { .. })));
}
