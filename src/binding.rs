//! Source and destination bindings for update transactions.
//!
//! Each side of a transaction is either a filesystem path or an
//! externally-owned stream. The ownership rule is asymmetric and
//! deliberate: the coordinator opens and closes every stream derived from
//! a path binding, but it never closes a caller-supplied stream: a
//! reader source is drained through a borrow, and a writer destination is
//! only flushed.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::Result;
use crate::engine::ReadSeek;

/// Immutable shared bytes usable as a seekable stream.
///
/// Produced when a reader-typed source is drained at configuration time;
/// every operation on the coordinator then reads from a fresh cursor over
/// the same buffer, so a one-shot reader can back any number of
/// operations.
#[derive(Clone)]
pub struct SharedBytes(Arc<[u8]>);

impl std::fmt::Debug for SharedBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedBytes").field(&self.0.len()).finish()
    }
}

impl SharedBytes {
    /// Wraps the given bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }

    /// The byte length of the buffer.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// The source side of an update transaction.
#[derive(Debug)]
pub enum Source {
    /// A file opened fresh for every operation and closed after it.
    Path(PathBuf),
    /// A fully-drained stream source, replayable per operation.
    Buffer(SharedBytes),
}

impl Source {
    /// Binds a filesystem path as the source.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Source::Path(path.into())
    }

    /// Drains the given reader in full and binds the buffered bytes as
    /// the source.
    ///
    /// The container engines require seekable, sized input, so a stream
    /// source costs O(size) time and memory up front. The caller keeps
    /// ownership of the reader; it is never closed here.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if draining fails.
    pub fn from_reader(reader: &mut dyn Read) -> Result<Self> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer)?;
        Ok(Source::Buffer(SharedBytes::new(buffer)))
    }

    /// Resolves the binding to a readable, seekable stream.
    pub(crate) fn open(&self) -> Result<Box<dyn ReadSeek>> {
        match self {
            Source::Path(path) => {
                let file = File::open(path)?;
                Ok(Box::new(BufReader::new(file)))
            }
            Source::Buffer(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
        }
    }

    /// The path of a path-typed binding.
    pub(crate) fn as_path(&self) -> Option<&PathBuf> {
        match self {
            Source::Path(path) => Some(path),
            Source::Buffer(_) => None,
        }
    }
}

/// The destination side of an update transaction.
pub enum Destination {
    /// A file created (or, for in-place updates, staged and renamed) by
    /// the coordinator, which also closes it.
    Path(PathBuf),
    /// A caller-owned writer. The coordinator flushes it after a rewrite
    /// but never closes it; a [`SharedBuffer`] clone is a convenient way
    /// to keep access to the written bytes.
    Writer(Box<dyn Write + Send>),
}

impl Destination {
    /// Binds a filesystem path as the destination.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Destination::Path(path.into())
    }

    /// Binds a caller-owned writer as the destination.
    pub fn writer(writer: Box<dyn Write + Send>) -> Self {
        Destination::Writer(writer)
    }
}

impl std::fmt::Debug for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Destination::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// A clone-able, shared in-memory byte sink.
///
/// Intended for stream-typed destinations: pass one clone to the
/// coordinator and keep another to read the produced archive back. All
/// clones observe the same buffer.
///
/// # Example
///
/// ```rust
/// use std::io::Write;
/// use rearc::SharedBuffer;
///
/// let sink = SharedBuffer::new();
/// let mut writer = sink.clone();
/// writer.write_all(b"abc").unwrap();
/// assert_eq!(sink.contents(), b"abc");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Creates an empty shared buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the bytes written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// The number of bytes written so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discards all written bytes.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        // A poisoned buffer only means a writer panicked mid-write; the
        // bytes themselves are still the best available state.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
