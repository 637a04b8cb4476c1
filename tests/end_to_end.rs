//! End-to-end decoding through the public worker and pipeline APIs

use futures::StreamExt;
use proptest::prelude::*;
use std::time::Duration;
use streamdec::{
    DecoderConfig, DecoderError, MemorySource, PipelineConfig, SceneCounter, StreamDecoder,
};
use tokio::time::timeout;

const WIDTH: u32 = 64;
const HEIGHT: u32 = 64;

/// 4:2:0 stream with `frames` mid-grey frames.
fn y4m_stream(width: u32, height: u32, frames: usize) -> Vec<u8> {
    let luma = (width * height) as usize;
    let chroma = (width.div_ceil(2) * height.div_ceil(2)) as usize;
    let mut data = format!("YUV4MPEG2 W{width} H{height} F30:1 Ip A1:1 C420jpeg\n").into_bytes();
    for index in 0..frames {
        data.extend_from_slice(b"FRAME\n");
        data.extend(std::iter::repeat_n(16 + (index as u8 * 10), luma));
        data.extend(std::iter::repeat_n(128, 2 * chroma));
    }
    data
}

#[tokio::test]
async fn twelve_frames_ten_decodes() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut worker = StreamDecoder::spawn(&DecoderConfig::default());
    let mut metadata_events = worker.on_metadata_available();
    let mut frame_events = worker.on_frame_available();

    let data = y4m_stream(WIDTH, HEIGHT, 12);
    worker.initialize("synthetic.y4m", 4096, 256).await.unwrap();

    let mut acknowledged = 0;
    for chunk in data.chunks(4096) {
        acknowledged += worker.submit(chunk.into()).await.unwrap();
    }
    assert_eq!(acknowledged, data.len());

    assert!(worker.open_video().await.unwrap());
    let metadata = metadata_events.next().await.unwrap();
    assert_eq!((metadata.frame_width, metadata.frame_height), (WIDTH, HEIGHT));
    assert_eq!(metadata.frame_size, (WIDTH * HEIGHT * 4) as usize);

    for scene_id in 0..10u64 {
        assert!(worker.decode().await.unwrap());
        let frame = frame_events.next().await.unwrap();
        assert_eq!(frame.index, scene_id);
        assert_eq!(frame.data.len(), (WIDTH * HEIGHT * 4) as usize);
        // grey luma decodes to (nearly) equal RGB channels
        let [r, g, b, a] = frame.pixel(0, 0).unwrap();
        assert!(r.abs_diff(g) <= 1 && g.abs_diff(b) <= 1, "{r} {g} {b}");
        assert_eq!(a, 255);
    }

    let status = worker.status().await.unwrap();
    assert_eq!(status.decoded_frame_count, 10);
    assert!(status.buffered_bytes > 0, "frames 11 and 12 stay buffered");

    worker.close_video().await.unwrap();
    worker.terminate().await;

    assert!(metadata_events.next().await.is_none(), "exactly one metadata event");
    assert!(frame_events.next().await.is_none(), "exactly ten frame events");
}

#[tokio::test]
async fn pipeline_reports_ten_scenes() {
    let data = y4m_stream(WIDTH, HEIGHT, 12);
    let source = MemorySource::new("synthetic.y4m", data, 16 * 1024);
    let mut scenes = SceneCounter::new();

    let report = StreamDecoder::decode_source(source, PipelineConfig::default(), &mut scenes)
        .await
        .unwrap();

    assert_eq!(report.scene_ids, (0..10).collect::<Vec<u64>>());
    assert_eq!(scenes.bytes(), 10 * (WIDTH * HEIGHT * 4) as u64);
    assert_eq!(report.acknowledged_bytes, report.total_bytes);
}

#[tokio::test]
async fn zero_packets_cannot_open() {
    let mut worker = StreamDecoder::spawn(&DecoderConfig::default());
    let mut metadata_events = worker.on_metadata_available();
    worker.initialize("nothing", 0, 256).await.unwrap();

    assert!(!worker.open_video().await.unwrap());
    assert!(timeout(Duration::from_millis(50), metadata_events.next()).await.is_err());
    worker.terminate().await;
}

#[tokio::test]
async fn decode_past_end_returns_false() {
    let mut worker = StreamDecoder::spawn(&DecoderConfig::default());
    let mut frame_events = worker.on_frame_available();
    worker.initialize("two", 0, 256).await.unwrap();
    worker.submit(y4m_stream(16, 16, 2).into()).await.unwrap();
    assert!(worker.open_video().await.unwrap());

    assert!(worker.decode().await.unwrap());
    assert!(worker.decode().await.unwrap());
    assert!(!worker.decode().await.unwrap());

    assert_eq!(frame_events.next().await.unwrap().index, 0);
    assert_eq!(frame_events.next().await.unwrap().index, 1);
    assert!(timeout(Duration::from_millis(50), frame_events.next()).await.is_err());
    worker.terminate().await;
}

#[tokio::test]
async fn close_then_decode_fails_without_event() {
    let mut worker = StreamDecoder::spawn(&DecoderConfig::default());
    let mut frame_events = worker.on_frame_available();
    worker.initialize("closed", 0, 256).await.unwrap();
    worker.submit(y4m_stream(16, 16, 2).into()).await.unwrap();
    assert!(worker.open_video().await.unwrap());
    worker.close_video().await.unwrap();

    let err = worker.decode().await.unwrap_err();
    assert!(matches!(err, DecoderError::Protocol { operation: "decode", .. }));
    worker.terminate().await;
    assert!(frame_events.next().await.is_none());
}

fn decode_with_chunking(data: &[u8], chunk_size: usize) -> Vec<u64> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    runtime.block_on(async {
        let mut worker = StreamDecoder::spawn(&DecoderConfig::default());
        let mut frame_events = worker.on_frame_available();
        worker.initialize("chunked", 0, 256).await.unwrap();
        for chunk in data.chunks(chunk_size) {
            worker.submit(chunk.into()).await.unwrap();
        }
        assert!(worker.open_video().await.unwrap());

        let mut indices = Vec::new();
        while worker.decode().await.unwrap() {
            indices.push(frame_events.next().await.unwrap().index);
        }
        worker.terminate().await;
        indices
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn chunking_does_not_change_output(chunk_size in 1usize..700, frames in 1usize..4) {
        let data = y4m_stream(16, 8, frames);
        let indices = decode_with_chunking(&data, chunk_size);
        prop_assert_eq!(indices, (0..frames as u64).collect::<Vec<_>>());
    }
}
