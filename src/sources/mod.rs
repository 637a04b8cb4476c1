//! Byte source implementations

mod channel;
mod file;
mod memory;

pub use channel::ChannelSource;
pub use file::FileSource;
pub use memory::MemorySource;
