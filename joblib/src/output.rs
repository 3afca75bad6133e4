use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// The file backing a single job's combined stdout/stderr.
///
/// This is a cheap handle that can be cloned into job snapshots. Writing goes through the single
/// [`OutputWriter`] returned by [`OutputBuffer::create`]; reading is done through any number of
/// independent handles from [`OutputBuffer::open_reader`], each starting at offset 0.
#[derive(Clone, Debug)]
pub struct OutputBuffer {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    sealed: AtomicBool,
}

impl OutputBuffer {
    /// Create (or truncate) `<dir>/<job_id>.log` and return the buffer with its writer.
    pub async fn create(dir: &Path, job_id: &str) -> io::Result<(Self, OutputWriter)> {
        let path = dir.join(format!("{}.log", job_id));
        let file = File::create(&path).await?;
        let buffer = Self {
            inner: Arc::new(Inner {
                path,
                sealed: AtomicBool::new(false),
            }),
        };
        let writer = OutputWriter {
            file,
            buffer: buffer.clone(),
            written: 0,
        };
        Ok((buffer, writer))
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Open a fresh read handle positioned at the start of the file.
    pub async fn open_reader(&self) -> io::Result<File> {
        File::open(&self.inner.path).await
    }

    /// True once the writer has been dropped and no more bytes will be appended.
    pub fn is_sealed(&self) -> bool {
        self.inner.sealed.load(Ordering::Acquire)
    }
}

/// Append-only writer for an [`OutputBuffer`]. Seals the buffer on drop.
#[derive(Debug)]
pub struct OutputWriter {
    file: File,
    buffer: OutputBuffer,
    written: u64,
}

impl OutputWriter {
    /// Append `blob` and flush it so concurrent readers can observe it.
    pub async fn write(&mut self, blob: &[u8]) -> io::Result<()> {
        self.file.write_all(blob).await?;
        self.file.flush().await?;
        self.written += blob.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl Drop for OutputWriter {
    fn drop(&mut self) {
        self.buffer.inner.sealed.store(true, Ordering::Release);
    }
}
