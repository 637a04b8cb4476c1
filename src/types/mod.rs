//! Core value types shared by the worker, the event channel and the pipeline.
//!
//! - [`Packet`] is a window over a caller buffer that moves into the worker
//! - [`StreamMetadata`] describes the decoded geometry, emitted once per video
//! - [`DecodedFrame`] carries one RGBA8 frame
//! - [`LifecycleState`] and [`SessionStatus`] describe the worker session

mod frame;
mod metadata;
mod packet;
mod state;

pub use frame::{BYTES_PER_PIXEL, DecodedFrame, frame_len};
pub use metadata::{FrameRate, StreamMetadata};
pub use packet::Packet;
pub use state::{LifecycleState, SessionStatus};
