//! Downstream frame consumers

use anyhow::{Result, ensure};

use crate::types::DecodedFrame;

/// Receives decoded frames tagged with their scene id.
///
/// Scene ids are assigned by the pipeline, consecutive from zero per run.
pub trait FrameConsumer: Send {
    fn consume(&mut self, scene_id: u64, frame: &DecodedFrame) -> Result<()>;
}

impl<F> FrameConsumer for F
where
    F: FnMut(u64, &DecodedFrame) -> Result<()> + Send,
{
    fn consume(&mut self, scene_id: u64, frame: &DecodedFrame) -> Result<()> {
        self(scene_id, frame)
    }
}

/// Consumer that records scene ids and checks each frame's pixel buffer size.
#[derive(Debug, Default, Clone)]
pub struct SceneCounter {
    scene_ids: Vec<u64>,
    bytes: u64,
}

impl SceneCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scene_ids(&self) -> &[u64] {
        &self.scene_ids
    }

    pub fn frames(&self) -> usize {
        self.scene_ids.len()
    }

    /// Pixel bytes seen across all frames.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl FrameConsumer for SceneCounter {
    fn consume(&mut self, scene_id: u64, frame: &DecodedFrame) -> Result<()> {
        ensure!(
            frame.is_complete(),
            "frame {} has {} bytes, which is not {}x{} RGBA",
            frame.index,
            frame.data.len(),
            frame.width,
            frame.height
        );
        self.scene_ids.push(scene_id);
        self.bytes += frame.data.len() as u64;
        Ok(())
    }
}
