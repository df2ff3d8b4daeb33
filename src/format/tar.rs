//! Tar (ustar) container support.
//!
//! Tar is the multi-member representative: any number of files and
//! directory markers, rich per-member metadata (mode bits, timestamps),
//! no compression of its own. Carried-over members are re-emitted from
//! their original headers and raw data blocks; only members with
//! replaced content read from the caller's streams.

use std::io::{self, Read, Write};
use std::ops::Range;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::engine::{ContainerArchive, ContainerEngine, ItemPlan, ReadSeek, UpdateFeed};
use crate::format::FormatAdapter;
use crate::{EntryProperties, Error, Result, UpdateEntry};

/// Short format name used in errors and logs.
const FORMAT: &str = "tar";

/// Default mode bits for entries created without attributes.
const DEFAULT_FILE_MODE: u32 = 0o644;
const DEFAULT_DIR_MODE: u32 = 0o755;

/// The tar container format.
///
/// A thin configuration value; construct one per updater.
///
/// # Example
///
/// ```rust,no_run
/// use rearc::{ArchiveUpdater, TarFormat, UpdateEntry};
///
/// let mut updater = ArchiveUpdater::new(TarFormat::default());
/// updater.source_path("bundle.tar");
/// let entry = UpdateEntry::file("notes.txt")?.with_source_bytes(b"hi".to_vec());
/// updater.append_one(entry)?;
/// # rearc::Result::Ok(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TarFormat;

/// Metadata of one stored tar member.
pub struct TarItem {
    /// The member path, with GNU long names already resolved.
    pub name: String,
    /// The raw header block the member was stored with.
    pub header: tar::Header,
}

impl std::fmt::Debug for TarItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TarItem")
            .field("name", &self.name)
            .field("size", &self.header.size().unwrap_or(0))
            .finish_non_exhaustive()
    }
}

/// One parsed member: its metadata plus the data range in the source.
struct Member {
    data: Range<usize>,
}

/// An opened tar file: raw source bytes plus its parsed members.
pub struct TarArchive {
    buf: Vec<u8>,
    members: Vec<Member>,
    items: Vec<TarItem>,
}

impl ContainerEngine for TarFormat {
    type Item = TarItem;
    type Archive = TarArchive;

    fn kind(&self) -> &'static str {
        FORMAT
    }

    fn multi_item(&self) -> bool {
        true
    }

    fn open(&self, mut input: Box<dyn ReadSeek>) -> Result<Self::Archive> {
        let mut buf = Vec::new();
        input.read_to_end(&mut buf)?;

        let mut members = Vec::new();
        let mut items = Vec::new();
        {
            let mut archive = tar::Archive::new(io::Cursor::new(&buf[..]));
            for entry in archive.entries()? {
                let entry = entry?;
                let index = items.len();
                let name = entry
                    .path()
                    .map_err(|e| {
                        Error::corrupt_entry(index, format!("unreadable member path: {e}"))
                    })?
                    .to_string_lossy()
                    .into_owned();
                let start = entry.raw_file_position() as usize;
                let size = entry.size() as usize;
                let end = start.checked_add(size).filter(|end| *end <= buf.len());
                let data = match end {
                    Some(end) => start..end,
                    None => {
                        return Err(Error::corrupt_entry(index, "member data extends past EOF"));
                    }
                };
                items.push(TarItem {
                    name,
                    header: entry.header().clone(),
                });
                members.push(Member { data });
            }
        }

        Ok(TarArchive {
            buf,
            members,
            items,
        })
    }
}

impl ContainerArchive for TarArchive {
    type Item = TarItem;

    fn items(&self) -> &[TarItem] {
        &self.items
    }

    fn update_items(
        &mut self,
        output: &mut dyn Write,
        new_count: usize,
        feed: &mut dyn UpdateFeed<TarItem>,
    ) -> Result<()> {
        // Metadata phase: one plan per target index, in order.
        let mut plans = Vec::with_capacity(new_count);
        for index in 0..new_count {
            let existing = self.items.get(index);
            plans.push(feed.plan(index, existing)?);
        }

        let mut builder = tar::Builder::new(&mut *output);

        // Content phase interleaved with writing; content is requested
        // only for indices whose plan flagged new content.
        for (index, plan) in plans.into_iter().enumerate() {
            match plan {
                ItemPlan::Keep { source_index } => {
                    let (item, member) = self
                        .items
                        .get(source_index)
                        .zip(self.members.get(source_index))
                        .ok_or_else(|| {
                            Error::corrupt_entry(source_index, "kept index out of range")
                        })?;
                    let data = &self.buf[member.data.clone()];
                    append_member(&mut builder, item.header.clone(), &item.name, data)?;
                }
                ItemPlan::Write {
                    item,
                    content_changed,
                    ..
                } => {
                    if content_changed {
                        let mut data = Vec::new();
                        if let Some(mut reader) = feed.content(index)? {
                            reader.read_to_end(&mut data)?;
                        }
                        append_member(&mut builder, item.header.clone(), &item.name, &data)?;
                    } else if let Some(member) = self.members.get(index) {
                        let data = &self.buf[member.data.clone()];
                        append_member(&mut builder, item.header.clone(), &item.name, data)?;
                    } else {
                        // Appended entry without content (e.g. a
                        // directory marker).
                        append_member(&mut builder, item.header.clone(), &item.name, &[])?;
                    }
                }
            }
        }

        builder.finish()?;
        drop(builder);
        output.flush()?;
        Ok(())
    }
}

/// Appends one member, letting the builder regenerate path extensions
/// and checksums.
fn append_member<W: Write>(
    builder: &mut tar::Builder<W>,
    mut header: tar::Header,
    name: &str,
    data: &[u8],
) -> Result<()> {
    header.set_size(data.len() as u64);
    builder.append_data(&mut header, Path::new(name), data)?;
    Ok(())
}

impl FormatAdapter for TarFormat {
    type Item = TarItem;

    fn item_to_entry(&self, item: &TarItem) -> UpdateEntry {
        UpdateEntry::from_properties(EntryProperties {
            name: item.name.clone(),
            is_directory: item.header.entry_type().is_dir(),
            size: item.header.size().ok(),
            modified: item
                .header
                .mtime()
                .ok()
                .map(|secs| SystemTime::UNIX_EPOCH + Duration::from_secs(secs)),
            attributes: item.header.mode().ok(),
        })
    }

    fn entry_to_item(&self, entry: &UpdateEntry, template: Option<&TarItem>) -> Result<TarItem> {
        let props = entry.properties();

        let mut header = match template {
            Some(t) => t.header.clone(),
            None => {
                let mut header = tar::Header::new_gnu();
                header.set_entry_type(if props.is_directory {
                    tar::EntryType::Directory
                } else {
                    tar::EntryType::Regular
                });
                header.set_mode(if props.is_directory {
                    DEFAULT_DIR_MODE
                } else {
                    DEFAULT_FILE_MODE
                });
                header.set_mtime(0);
                header.set_size(0);
                header
            }
        };

        if template.is_some() {
            let was_dir = header.entry_type().is_dir();
            if props.is_directory != was_dir {
                header.set_entry_type(if props.is_directory {
                    tar::EntryType::Directory
                } else {
                    tar::EntryType::Regular
                });
            }
        }
        if let Some(size) = props.size {
            header.set_size(size);
        }
        if let Some(modified) = props.modified {
            let secs = modified
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            header.set_mtime(secs);
        }
        if let Some(mode) = props.attributes {
            header.set_mode(mode);
        }

        Ok(TarItem {
            name: props.name.clone(),
            header,
        })
    }
}
