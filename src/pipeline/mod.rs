//! Pipeline driver: byte source to decoded scenes
//!
//! A run drains a [`ByteSource`], feeds every chunk to a fresh decode worker in
//! order, opens the video and then decodes up to `target_frames` frames, handing each
//! to a [`FrameConsumer`] with a consecutive scene id.
//!
//! ## Failure policy
//!
//! Running out of data is normal: an unopenable stream or an early end of frames
//! finishes the run with whatever was decoded. Source failures, rejected packets,
//! container errors, missing or mismatched events and consumer errors abort it.

mod consumer;

pub use consumer::{FrameConsumer, SceneCounter};

use futures::StreamExt;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::source::ByteSource;
use crate::stream::EventStream;
use crate::types::{DecodedFrame, StreamMetadata};
use crate::worker::{Worker, WorkerHandle};
use crate::{DecoderError, Result};

/// Mutable state threaded through the pipeline stages.
#[derive(Debug, Default)]
pub struct PipelineContext {
    pub source_name: String,
    /// Chunks drained from the source, not yet submitted
    pub pending: Vec<Vec<u8>>,
    pub chunk_count: usize,
    pub total_bytes: u64,
    pub acknowledged_bytes: u64,
    pub metadata: Option<StreamMetadata>,
    pub scene_ids: Vec<u64>,
    next_scene_id: u64,
}

impl PipelineContext {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self { source_name: source_name.into(), ..Self::default() }
    }

    fn record_chunk(&mut self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        self.chunk_count += 1;
        self.total_bytes += chunk.len() as u64;
        self.pending.push(chunk);
    }

    fn next_scene_id(&mut self) -> u64 {
        let id = self.next_scene_id;
        self.next_scene_id += 1;
        id
    }

    /// Check a frame event against the opened stream.
    fn verify_frame(&self, frame: &DecodedFrame) -> Result<()> {
        let Some(metadata) = &self.metadata else {
            return Err(DecoderError::FrameMismatch {
                details: format!("frame {} arrived before metadata", frame.index),
            });
        };
        if frame.width != metadata.frame_width || frame.height != metadata.frame_height {
            return Err(DecoderError::FrameMismatch {
                details: format!(
                    "frame {} is {}x{}, stream is {}x{}",
                    frame.index,
                    frame.width,
                    frame.height,
                    metadata.frame_width,
                    metadata.frame_height
                ),
            });
        }
        if frame.data.len() != metadata.frame_size {
            return Err(DecoderError::FrameMismatch {
                details: format!(
                    "frame {} has {} bytes, expected {}",
                    frame.index,
                    frame.data.len(),
                    metadata.frame_size
                ),
            });
        }
        let expected_index = self.scene_ids.len() as u64;
        if frame.index != expected_index {
            return Err(DecoderError::FrameMismatch {
                details: format!("frame index {} where {} was expected", frame.index, expected_index),
            });
        }
        Ok(())
    }

    fn into_report(self, target_frames: usize) -> PipelineReport {
        PipelineReport {
            source_name: self.source_name,
            chunk_count: self.chunk_count,
            total_bytes: self.total_bytes,
            acknowledged_bytes: self.acknowledged_bytes,
            metadata: self.metadata,
            scene_ids: self.scene_ids,
            target_frames,
        }
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub source_name: String,
    pub chunk_count: usize,
    pub total_bytes: u64,
    pub acknowledged_bytes: u64,
    /// `None` when the stream could not be opened
    pub metadata: Option<StreamMetadata>,
    pub scene_ids: Vec<u64>,
    pub target_frames: usize,
}

impl PipelineReport {
    pub fn frames_processed(&self) -> usize {
        self.scene_ids.len()
    }

    pub fn reached_target(&self) -> bool {
        self.scene_ids.len() >= self.target_frames
    }
}

/// Drives one byte source through a decode worker.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run `source` to completion, feeding decoded frames to `consumer`.
    ///
    /// The worker is terminated and the source destroyed whether or not the run
    /// succeeds.
    pub async fn run<S, C>(&self, source: S, consumer: &mut C) -> Result<PipelineReport>
    where
        S: ByteSource,
        C: FrameConsumer,
    {
        let mut worker = Worker::spawn(&self.config.decoder);
        self.run_on(&mut worker, source, consumer).await
    }

    /// Like [`run`](Self::run), on a worker the caller spawned and may have
    /// subscribed to. The worker is terminated before this returns.
    pub async fn run_on<S, C>(
        &self,
        worker: &mut WorkerHandle,
        mut source: S,
        consumer: &mut C,
    ) -> Result<PipelineReport>
    where
        S: ByteSource,
        C: FrameConsumer,
    {
        let result = self.drive(worker, &mut source, consumer).await;
        source.destroy();
        worker.terminate().await;

        match &result {
            Ok(report) => info!(
                "Pipeline for {} finished: {} chunks, {} bytes, {} frames",
                report.source_name,
                report.chunk_count,
                report.total_bytes,
                report.frames_processed()
            ),
            Err(e) => warn!("Pipeline failed: {}", e),
        }
        result
    }

    async fn drive<S, C>(
        &self,
        worker: &WorkerHandle,
        source: &mut S,
        consumer: &mut C,
    ) -> Result<PipelineReport>
    where
        S: ByteSource,
        C: FrameConsumer,
    {
        let mut metadata_events = worker.on_metadata_available();
        let mut frame_events = worker.on_frame_available();

        let source_name =
            self.config.decoder.source_name.clone().unwrap_or_else(|| source.name().to_string());
        let mut ctx = PipelineContext::new(source_name);

        self.collect(source, &mut ctx).await?;

        let block_size = source.block_size().unwrap_or(self.config.decoder.block_size);
        worker
            .initialize(ctx.source_name.clone(), block_size, self.config.decoder.max_decoded_dimension)
            .await?;

        self.feed(worker, &mut ctx).await?;

        if !worker.open_video().await? {
            info!("{}: not enough data to open video", ctx.source_name);
            worker.close_video().await?;
            return Ok(ctx.into_report(self.config.target_frames));
        }
        self.await_metadata(&mut metadata_events, &mut ctx).await?;

        self.decode_frames(worker, &mut frame_events, consumer, &mut ctx).await?;
        worker.close_video().await?;

        let report = ctx.into_report(self.config.target_frames);
        if self.config.require_target_frames && !report.reached_target() {
            return Err(DecoderError::FrameTarget {
                expected: report.target_frames,
                actual: report.frames_processed(),
            });
        }
        Ok(report)
    }

    /// Drain the source until it ends or the stream timeout fires.
    async fn collect<S: ByteSource>(&self, source: &mut S, ctx: &mut PipelineContext) -> Result<()> {
        let deadline = tokio::time::sleep(self.config.stream_timeout());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(
                        "{}: stream timeout after {:?}, continuing with {} chunks",
                        ctx.source_name,
                        self.config.stream_timeout(),
                        ctx.chunk_count
                    );
                    break;
                }
                chunk = source.next_chunk() => match chunk? {
                    Some(chunk) => ctx.record_chunk(chunk),
                    None => break,
                },
            }
        }

        source.destroy();
        if ctx.chunk_count == 0 {
            warn!("{}: source produced no data", ctx.source_name);
        }
        debug!("{}: collected {} chunks ({} bytes)", ctx.source_name, ctx.chunk_count, ctx.total_bytes);
        Ok(())
    }

    /// Submit collected chunks in order, one acknowledgment at a time.
    async fn feed(&self, worker: &WorkerHandle, ctx: &mut PipelineContext) -> Result<()> {
        for chunk in std::mem::take(&mut ctx.pending) {
            let acknowledged = worker.submit(chunk.into()).await?;
            ctx.acknowledged_bytes += acknowledged as u64;
        }
        debug_assert_eq!(ctx.acknowledged_bytes, ctx.total_bytes);
        Ok(())
    }

    async fn await_metadata(
        &self,
        events: &mut EventStream<StreamMetadata>,
        ctx: &mut PipelineContext,
    ) -> Result<()> {
        let metadata = self.next_event(events, "metadata event").await?;
        if metadata.frame_width == 0 || metadata.frame_height == 0 {
            return Err(DecoderError::Dimensions {
                width: metadata.frame_width,
                height: metadata.frame_height,
                max: self.config.decoder.max_decoded_dimension,
            });
        }
        info!(
            "{}: {}x{} frames ({} bytes each)",
            ctx.source_name, metadata.frame_width, metadata.frame_height, metadata.frame_size
        );
        ctx.metadata = Some(metadata);
        Ok(())
    }

    async fn decode_frames<C: FrameConsumer>(
        &self,
        worker: &WorkerHandle,
        events: &mut EventStream<DecodedFrame>,
        consumer: &mut C,
        ctx: &mut PipelineContext,
    ) -> Result<()> {
        for _ in 0..self.config.target_frames {
            if !worker.decode().await? {
                info!("{}: no more frames after {}", ctx.source_name, ctx.scene_ids.len());
                break;
            }

            let frame = self.next_event(events, "frame event").await?;
            ctx.verify_frame(&frame)?;

            let scene_id = ctx.next_scene_id();
            consumer.consume(scene_id, &frame).map_err(|e| DecoderError::consumer(scene_id, e))?;
            ctx.scene_ids.push(scene_id);
        }
        Ok(())
    }

    async fn next_event<T: Clone + Send + 'static>(
        &self,
        events: &mut EventStream<T>,
        operation: &'static str,
    ) -> Result<T> {
        let duration = self.config.frame_timeout();
        timeout(duration, events.next())
            .await
            .map_err(|_| DecoderError::Timeout { operation, duration })?
            .ok_or(DecoderError::WorkerTerminated)
    }
}

#[cfg(test)]
mod tests;
