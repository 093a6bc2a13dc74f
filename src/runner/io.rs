//! Output capture and input feeding for toolchain processes.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Default)]
struct Buffer {
    bytes: Vec<u8>,
    truncated: bool,
}

/// A shared sink that merges several output streams into one buffer.
///
/// Chunks are appended in the order they are read, so stdout and stderr
/// interleave as the OS delivers them.
#[derive(Clone, Debug, Default)]
pub struct CapturedOutput {
    buffer: Arc<Mutex<Buffer>>,
    limit: Option<usize>,
}

impl CapturedOutput {
    /// Create an unbounded capture buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer that keeps at most `limit` bytes.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            buffer: Arc::default(),
            limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a chunk, dropping whatever exceeds the limit.
    pub fn append(&self, chunk: &[u8]) {
        let mut buffer = self.lock();
        let room = match self.limit {
            Some(limit) => limit.saturating_sub(buffer.bytes.len()),
            None => chunk.len(),
        };
        if room < chunk.len() {
            buffer.truncated = true;
        }
        let take = room.min(chunk.len());
        buffer.bytes.extend_from_slice(&chunk[..take]);
    }

    /// Get the captured output as a string.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock().bytes).into_owned()
    }

    /// Get the captured output as bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.lock().bytes.clone()
    }

    /// Whether any output was discarded because of the limit.
    pub fn is_truncated(&self) -> bool {
        self.lock().truncated
    }

    /// Get the length of captured data.
    pub fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drain `reader` into `sink` until EOF.
pub async fn pump<R>(mut reader: R, sink: CapturedOutput) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        sink.append(&chunk[..n]);
    }
}

/// Write `input` to a child's stdin and close it.
///
/// A child that exits without reading its input closes the pipe early;
/// that broken pipe is not an error.
pub async fn feed<W>(mut writer: W, input: String) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match writer.write_all(input.as_bytes()).await {
        Ok(()) => writer.shutdown().await,
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(e),
    }
}
