//! Stream adapters for worker events

mod events;

pub use events::EventStream;
