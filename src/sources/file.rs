//! File-backed byte source

use std::path::{Path, PathBuf};
use tracing::info;

use crate::source::ByteSource;
use crate::{DecoderError, Result};

/// Default chunk size for file reads.
pub const DEFAULT_FILE_CHUNK: usize = 64 * 1024;

/// Source that reads a file and yields it in fixed-size chunks.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    name: String,
    data: Vec<u8>,
    position: usize,
    chunk_size: usize,
}

impl FileSource {
    /// Open `path`, reading it into memory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = std::fs::read(&path).map_err(|e| DecoderError::file_error(path.clone(), e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        info!("Opened source file {} ({} bytes)", path.display(), data.len());
        Ok(Self { path, name, data, position: 0, chunk_size: DEFAULT_FILE_CHUNK })
    }

    /// Set the chunk size; `0` keeps the current one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        if chunk_size > 0 {
            self.chunk_size = chunk_size;
        }
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait::async_trait]
impl ByteSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn block_size(&self) -> Option<u32> {
        u32::try_from(self.chunk_size).ok()
    }

    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.position >= self.data.len() {
            return Ok(None);
        }
        let end = (self.position + self.chunk_size).min(self.data.len());
        let chunk = self.data[self.position..end].to_vec();
        self.position = end;
        Ok(Some(chunk))
    }

    fn destroy(&mut self) {
        self.data = Vec::new();
        self.position = 0;
    }
}
