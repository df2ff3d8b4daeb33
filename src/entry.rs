//! Format-agnostic entry records and content sources.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::PathBuf;
use std::time::SystemTime;

use crate::{Error, Result};

/// Maximum length for entry names (in bytes).
///
/// This limit guards against pathological names long before any container
/// format's own limit would apply. 32KB is well above any reasonable file
/// system path limit.
const MAX_NAME_LENGTH: usize = 32768;

/// Validates an entry name.
///
/// Names are archive-internal identifiers: non-empty, relative,
/// forward-slash separated, with no NUL bytes, no empty segments, and no
/// `.`/`..` segments.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidEntryName("empty name".into()));
    }
    if name.contains('\0') {
        return Err(Error::InvalidEntryName("contains NUL byte".into()));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::InvalidEntryName(format!(
            "name exceeds maximum length of {} bytes",
            MAX_NAME_LENGTH
        )));
    }
    if name.starts_with('/') {
        return Err(Error::InvalidEntryName("absolute name not allowed".into()));
    }
    if name.ends_with('/') {
        return Err(Error::InvalidEntryName("trailing slash not allowed".into()));
    }
    for segment in name.split('/') {
        if segment.is_empty() {
            return Err(Error::InvalidEntryName(
                "empty segment (consecutive slashes)".into(),
            ));
        }
        if segment == "." || segment == ".." {
            return Err(Error::InvalidEntryName(format!(
                "'{}' segment not allowed",
                segment
            )));
        }
    }
    Ok(())
}

/// The comparable property set of one archive item.
///
/// Container formats refine these fields differently (gzip keeps only a
/// name and a timestamp, tar keeps mode bits too); unset optional fields
/// inherit the stored item's values when an entry is written back.
/// Constructible directly so format adapters can materialize stored
/// items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryProperties {
    /// The name within the archive, forward-slash separated.
    pub name: String,
    /// Whether this entry is a directory marker.
    pub is_directory: bool,
    /// Uncompressed size in bytes, if known.
    pub size: Option<u64>,
    /// Modification time, if known.
    pub modified: Option<SystemTime>,
    /// Format-specific attribute bits (e.g. Unix mode), if known.
    pub attributes: Option<u32>,
}

impl EntryProperties {
    fn new(name: String, is_directory: bool) -> Self {
        Self {
            name,
            is_directory,
            size: None,
            modified: None,
            attributes: None,
        }
    }
}

/// Externally-owned byte content for an entry.
///
/// A source is consumed at most once per operation. The engine opens
/// `Path` sources itself and closes them before the transaction returns;
/// a `Reader` source is handed over to the engine, which drops it after
/// the member is written.
pub enum ContentSource {
    /// Content read from a file on disk, opened lazily during the
    /// content phase of a rewrite.
    Path(PathBuf),
    /// Content held in memory.
    Bytes(Vec<u8>),
    /// An already-open readable stream. Ownership transfers to the
    /// engine; the stream is dropped once the member has been written.
    Reader(Box<dyn Read + Send>),
}

impl ContentSource {
    /// Opens this source as a readable stream.
    ///
    /// `Path` sources open the file fresh; `Bytes` and `Reader` sources
    /// are zero-cost moves.
    pub(crate) fn open(self) -> Result<Box<dyn Read + Send>> {
        match self {
            ContentSource::Path(path) => {
                let file = File::open(path)?;
                Ok(Box::new(BufReader::new(file)))
            }
            ContentSource::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes))),
            ContentSource::Reader(reader) => Ok(reader),
        }
    }
}

impl fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            ContentSource::Bytes(bytes) => {
                f.debug_tuple("Bytes").field(&bytes.len()).finish()
            }
            ContentSource::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// One logical archive item, independent of container format.
///
/// An entry is a property record plus an optional [`ContentSource`].
/// Entries are constructed by the caller (for `append`) or derived from
/// stored items by a [`FormatAdapter`](crate::FormatAdapter) (for
/// `update` and `remove` predicates), and are immutable once handed to an
/// operation.
///
/// # Equality
///
/// `PartialEq` compares the property record only. The content source
/// never participates: two entries with the same name, size, times and
/// attributes are equal even if one carries replacement bytes and the
/// other doesn't. `remove` relies on this.
///
/// # Example
///
/// ```rust
/// use rearc::UpdateEntry;
///
/// let entry = UpdateEntry::file("docs/readme.md")
///     .unwrap()
///     .with_source_bytes(b"# hello".to_vec());
/// assert!(entry.has_source());
/// assert_eq!(entry.properties().name, "docs/readme.md");
/// ```
#[derive(Debug)]
pub struct UpdateEntry {
    properties: EntryProperties,
    source: Option<ContentSource>,
}

impl UpdateEntry {
    /// Creates a file entry with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEntryName`] if the name is empty, absolute,
    /// contains NUL bytes, `.`/`..` segments, or a trailing slash.
    pub fn file(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            properties: EntryProperties::new(name, false),
            source: None,
        })
    }

    /// Creates a directory-marker entry with the given name.
    ///
    /// Directory entries never carry content; single-member formats
    /// without a directory concept reject them at the adapter level.
    pub fn directory(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            properties: EntryProperties::new(name, true),
            source: None,
        })
    }

    /// Creates an entry from an existing property record.
    ///
    /// Used by format adapters when materializing stored items; the name
    /// is taken as-is since it came out of the container.
    pub fn from_properties(properties: EntryProperties) -> Self {
        Self {
            properties,
            source: None,
        }
    }

    /// Sets the uncompressed size property.
    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.properties.size = Some(size);
        self
    }

    /// Sets the modification time property.
    #[must_use]
    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.properties.modified = Some(modified);
        self
    }

    /// Sets the format-specific attribute bits.
    #[must_use]
    pub fn with_attributes(mut self, attributes: u32) -> Self {
        self.properties.attributes = Some(attributes);
        self
    }

    /// Renames the entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEntryName`] under the same rules as
    /// [`UpdateEntry::file`].
    pub fn renamed(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        self.properties.name = name;
        Ok(self)
    }

    /// Attaches content read from a file on disk.
    #[must_use]
    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(ContentSource::Path(path.into()));
        self
    }

    /// Attaches in-memory content.
    #[must_use]
    pub fn with_source_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.source = Some(ContentSource::Bytes(bytes));
        self
    }

    /// Attaches an already-open readable stream as content.
    ///
    /// The stream is handed to the engine during the rewrite and dropped
    /// once the member has been written.
    #[must_use]
    pub fn with_source_reader(mut self, reader: Box<dyn Read + Send>) -> Self {
        self.source = Some(ContentSource::Reader(reader));
        self
    }

    /// The property record of this entry.
    pub fn properties(&self) -> &EntryProperties {
        &self.properties
    }

    /// The entry name.
    pub fn name(&self) -> &str {
        &self.properties.name
    }

    /// Whether this entry is a directory marker.
    pub fn is_directory(&self) -> bool {
        self.properties.is_directory
    }

    /// Whether this entry carries replacement content.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Takes the content source out of the entry, leaving none.
    pub(crate) fn take_source(&mut self) -> Option<ContentSource> {
        self.source.take()
    }
}

impl PartialEq for UpdateEntry {
    fn eq(&self, other: &Self) -> bool {
        // Structural over properties only; the source never participates.
        self.properties == other.properties
    }
}

impl Eq for UpdateEntry {}
