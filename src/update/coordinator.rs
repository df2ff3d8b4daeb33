//! The update coordinator.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::binding::{Destination, Source};
use crate::engine::{ContainerArchive, ContainerEngine};
use crate::format::FormatAdapter;
use crate::update::feed::{AppendFeed, CarryFeed, TransformFeed};
use crate::update::summary::UpdateSummary;
use crate::{Error, Password, Result, UpdateEntry};

/// Coordinates update transactions against one archive.
///
/// An updater is configured once (source, destination, optional
/// password) and then runs any number of operations, each a complete
/// rewrite transaction: open the source container, compute the target
/// item list, stream content only for items whose data changed, and
/// release every resource in a fixed order whether the rewrite succeeded
/// or failed.
///
/// The type is generic over a format value implementing both capability
/// traits: the container engine and the item/entry adapter. Formats are
/// plain values: `ArchiveUpdater::new(TarFormat::default())`.
///
/// # In-place updates
///
/// When only a source path is configured, the destination defaults to
/// the same path. An in-place rewrite is staged in a sibling `.tmp` file
/// and renamed over the source after the transaction commits, so a
/// failed operation leaves the original archive untouched.
///
/// # Concurrency
///
/// Operations are synchronous and blocking, and an updater is not safe
/// for concurrent use: configuration and operations must be externally
/// serialized. An in-flight operation runs to completion or fails;
/// cancellation is not supported.
///
/// # Example
///
/// ```rust,no_run
/// use rearc::{ArchiveUpdater, TarFormat, UpdateEntry};
///
/// let mut updater = ArchiveUpdater::new(TarFormat::default());
/// updater.source_path("bundle.tar").destination_path("bundle.new.tar");
///
/// let summary = updater.update(|entry| {
///     if entry.name() == "config.toml" {
///         Some(entry.with_source_bytes(b"refreshed = true".to_vec()))
///     } else {
///         Some(entry)
///     }
/// })?;
/// assert_eq!(summary.entries_updated, 1);
/// # rearc::Result::Ok(())
/// ```
pub struct ArchiveUpdater<F>
where
    F: ContainerEngine + FormatAdapter<Item = <F as ContainerEngine>::Item>,
{
    format: F,
    source: Option<Source>,
    destination: Option<Destination>,
    password: Option<Password>,
}

impl<F> ArchiveUpdater<F>
where
    F: ContainerEngine + FormatAdapter<Item = <F as ContainerEngine>::Item>,
{
    /// Creates an unconfigured updater for the given container format.
    pub fn new(format: F) -> Self {
        Self {
            format,
            source: None,
            destination: None,
            password: None,
        }
    }

    /// Sets a filesystem path as the source archive.
    ///
    /// If no destination has been set yet, the destination defaults to
    /// the same path (in-place update). An explicit destination set
    /// later overrides the default.
    pub fn source_path(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        let path = path.into();
        if self.destination.is_none() {
            self.destination = Some(Destination::Path(path.clone()));
        }
        self.source = Some(Source::Path(path));
        self
    }

    /// Drains the given reader in full and uses the buffered bytes as
    /// the source archive.
    ///
    /// The container engines need seekable, sized input, so the stream
    /// is consumed up front in O(size) time and memory; the caller keeps
    /// ownership of the reader. A destination must be configured
    /// explicitly; there is no path to default to.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if draining the reader fails.
    pub fn source_reader(&mut self, reader: &mut dyn Read) -> Result<&mut Self> {
        self.source = Some(Source::from_reader(reader)?);
        Ok(self)
    }

    /// Sets a filesystem path as the destination, overriding any
    /// default.
    pub fn destination_path(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.destination = Some(Destination::Path(path.into()));
        self
    }

    /// Sets a caller-owned writer as the destination, overriding any
    /// default.
    ///
    /// The writer is flushed after each rewrite but never closed; keep a
    /// [`SharedBuffer`](crate::SharedBuffer) clone to read the produced
    /// archive back.
    pub fn destination_writer(&mut self, writer: impl Write + Send + 'static) -> &mut Self {
        self.destination = Some(Destination::Writer(Box::new(writer)));
        self
    }

    /// Stores a password for the engine's decrypt/encrypt callbacks.
    ///
    /// Omitting the password for an encrypted container is not rejected
    /// eagerly: the failure surfaces at the codec layer, and some
    /// containers appear to rewrite successfully while producing
    /// unusable output. Known sharp edge of the engine boundary.
    pub fn password(&mut self, password: impl Into<Password>) -> &mut Self {
        self.password = Some(password.into());
        self
    }

    /// Appends entries to the end of the archive.
    ///
    /// Every existing item is carried over unchanged (no recompression);
    /// the new entries land behind them in order. Entries carrying a
    /// content source stream their bytes lazily during the rewrite;
    /// entries without one become payload-less members (e.g. directory
    /// markers, where the format has them).
    ///
    /// # Errors
    ///
    /// Returns [`Error::SingleItemFormat`] before any I/O when more than
    /// one entry is given and the container holds a single member per
    /// append step; use [`append_one`](Self::append_one) there.
    pub fn append(&mut self, entries: Vec<UpdateEntry>) -> Result<UpdateSummary> {
        if entries.len() > 1 && !self.format.multi_item() {
            return Err(Error::SingleItemFormat {
                format: self.format.kind(),
            });
        }

        let added = entries.len();
        let format = &self.format;
        let password = self.password.as_ref();
        Self::with_archive(
            format,
            self.source.as_ref(),
            self.destination.as_mut(),
            move |original, archive, output| {
                let mut feed = AppendFeed::new(format, original, entries, password);
                archive.update_items(output, original + added, &mut feed)?;
                log::debug!("appended {} entries behind {} existing items", added, original);
                Ok(UpdateSummary {
                    entries_kept: original,
                    entries_added: added,
                    total_entries: original + added,
                    ..Default::default()
                })
            },
        )
    }

    /// Appends a single entry. Available for every format, including
    /// single-member containers.
    pub fn append_one(&mut self, entry: UpdateEntry) -> Result<UpdateSummary> {
        self.append(vec![entry])
    }

    /// Removes the one item structurally equal to `entry`.
    ///
    /// Matching compares entry properties only (never the content
    /// source, never identity); when several stored items are equal to
    /// the given entry, exactly the first match is removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] when nothing matches.
    pub fn remove(&mut self, entry: &UpdateEntry) -> Result<UpdateSummary> {
        let format = &self.format;
        Self::with_archive(
            format,
            self.source.as_ref(),
            self.destination.as_mut(),
            move |original, archive, output| {
                let mut removed = BTreeSet::new();
                for (index, item) in archive.items().iter().enumerate() {
                    if &format.item_to_entry(item) == entry {
                        removed.insert(index);
                        break;
                    }
                }
                if removed.is_empty() {
                    return Err(Error::EntryNotFound {
                        name: entry.name().to_string(),
                    });
                }
                rewrite_without(archive, output, original, removed)
            },
        )
    }

    /// Removes every item matching the predicate.
    ///
    /// The predicate sees each stored item materialized as an
    /// [`UpdateEntry`] through the same read path `update` uses. A
    /// predicate matching nothing degenerates to an identity rewrite; a
    /// predicate matching everything produces a structurally valid empty
    /// archive.
    pub fn remove_where<P>(&mut self, mut predicate: P) -> Result<UpdateSummary>
    where
        P: FnMut(&UpdateEntry) -> bool,
    {
        let format = &self.format;
        Self::with_archive(
            format,
            self.source.as_ref(),
            self.destination.as_mut(),
            move |original, archive, output| {
                let mut removed = BTreeSet::new();
                for (index, item) in archive.items().iter().enumerate() {
                    if predicate(&format.item_to_entry(item)) {
                        removed.insert(index);
                    }
                }
                rewrite_without(archive, output, original, removed)
            },
        )
    }

    /// Transforms every item in place, keeping the item count fixed.
    ///
    /// Each stored item is materialized as an [`UpdateEntry`] and passed
    /// to `transform`; the returned candidate's set properties are
    /// layered onto the stored item (unset properties inherit the
    /// original values), and a candidate carrying a content source has
    /// its bytes replaced. Items the transform leaves untouched are
    /// carried over without recompression.
    ///
    /// An item whose only change is a new content source is still
    /// reported to the engine as a metadata change: the source
    /// participates in the change snapshot. Conservative by contract;
    /// the engine may spend a header rewrite on it, nothing more.
    ///
    /// `update` never changes the item count; appending and removing
    /// go through [`append`](Self::append) and [`remove`](Self::remove).
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransformReturnedNone`] and aborts the rewrite
    /// if `transform` returns `None` for any item.
    pub fn update<T>(&mut self, transform: T) -> Result<UpdateSummary>
    where
        T: FnMut(UpdateEntry) -> Option<UpdateEntry>,
    {
        let format = &self.format;
        let password = self.password.as_ref();
        Self::with_archive(
            format,
            self.source.as_ref(),
            self.destination.as_mut(),
            move |original, archive, output| {
                let mut feed = TransformFeed::new(format, transform, password);
                archive.update_items(output, original, &mut feed)?;
                let changed = feed.changed();
                log::debug!("rewrote {} items, {} changed", original, changed);
                Ok(UpdateSummary {
                    entries_kept: original - changed,
                    entries_updated: changed,
                    total_entries: original,
                    ..Default::default()
                })
            },
        )
    }

    /// The shared transaction protocol underlying every operation.
    ///
    /// Resolves the source to a seekable stream and the destination to a
    /// writable one, opens the container, runs `body`, and releases
    /// resources on every exit path in a fixed order: destination stream
    /// first, then the archive handle (which owns the source stream),
    /// then the staging commit or cleanup. Errors from `body` propagate
    /// after cleanup.
    fn with_archive<T>(
        format: &F,
        source: Option<&Source>,
        destination: Option<&mut Destination>,
        body: impl FnOnce(usize, &mut F::Archive, &mut dyn Write) -> Result<T>,
    ) -> Result<T> {
        let source = source.ok_or(Error::SourceNotSet)?;
        let input = source.open()?;
        let mut sink = DestinationSink::resolve(source.as_path(), destination)?;

        log::debug!("opening {} archive for rewrite", format.kind());
        let mut archive = match format.open(input) {
            Ok(archive) => archive,
            Err(e) => {
                sink.abandon();
                return Err(e);
            }
        };
        let original_count = archive.item_count();
        log::debug!(
            "{} archive holds {} items",
            format.kind(),
            original_count
        );

        let body_result = body(original_count, &mut archive, sink.stream());

        // Fixed release order: destination stream, then the archive
        // handle together with the source stream it owns.
        let close_result = sink.close_stream();
        drop(archive);

        let outcome = match (body_result, close_result) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        };
        match outcome {
            Ok(value) => {
                sink.commit()?;
                Ok(value)
            }
            Err(e) => {
                sink.abandon();
                Err(e)
            }
        }
    }
}

/// Rewrites the archive with the given source indices removed.
fn rewrite_without<A: ContainerArchive>(
    archive: &mut A,
    output: &mut dyn Write,
    original: usize,
    removed: BTreeSet<usize>,
) -> Result<UpdateSummary> {
    let removed_count = removed.len();
    let remaining = original - removed_count;
    let mut feed = CarryFeed::new(removed);
    archive.update_items(output, remaining, &mut feed)?;
    log::debug!("removed {} of {} items", removed_count, original);
    Ok(UpdateSummary {
        entries_kept: remaining,
        entries_removed: removed_count,
        total_entries: remaining,
        ..Default::default()
    })
}

/// The resolved, writable side of one transaction.
enum DestinationSink<'a> {
    /// A file the coordinator created and will close. `commit_path` is
    /// set when the stream writes a staging file that replaces the
    /// source on commit.
    File {
        stream: Option<BufWriter<File>>,
        write_path: PathBuf,
        commit_path: Option<PathBuf>,
    },
    /// A caller-owned writer: flushed, never closed.
    Borrowed { stream: &'a mut (dyn Write + Send) },
}

impl<'a> DestinationSink<'a> {
    fn resolve(
        source_path: Option<&PathBuf>,
        destination: Option<&'a mut Destination>,
    ) -> Result<Self> {
        match destination {
            Some(Destination::Path(path)) => Self::create_file(path.clone(), source_path),
            Some(Destination::Writer(writer)) => Ok(DestinationSink::Borrowed {
                stream: &mut **writer,
            }),
            None => match source_path {
                Some(path) => Self::create_file(path.clone(), source_path),
                None => Err(Error::DestinationNotSet),
            },
        }
    }

    fn create_file(path: PathBuf, source_path: Option<&PathBuf>) -> Result<Self> {
        let in_place = source_path == Some(&path);
        let (write_path, commit_path) = if in_place {
            (staging_path(&path), Some(path))
        } else {
            (path, None)
        };
        let file = File::create(&write_path)?;
        Ok(DestinationSink::File {
            stream: Some(BufWriter::new(file)),
            write_path,
            commit_path,
        })
    }

    fn stream(&mut self) -> &mut dyn Write {
        match self {
            DestinationSink::File { stream, .. } => {
                stream.as_mut().expect("destination stream already closed")
            }
            DestinationSink::Borrowed { stream } => &mut **stream,
        }
    }

    /// Flushes and, for coordinator-owned files, closes the stream.
    /// Idempotent.
    fn close_stream(&mut self) -> Result<()> {
        match self {
            DestinationSink::File { stream, .. } => match stream.take() {
                Some(buffered) => {
                    let file = buffered
                        .into_inner()
                        .map_err(|e| Error::Io(e.into_error()))?;
                    drop(file);
                    Ok(())
                }
                None => Ok(()),
            },
            DestinationSink::Borrowed { stream } => Ok(stream.flush()?),
        }
    }

    /// Finalizes a successful transaction: renames the staging file
    /// over the source for in-place updates.
    fn commit(self) -> Result<()> {
        if let DestinationSink::File {
            write_path,
            commit_path: Some(final_path),
            ..
        } = self
        {
            fs::rename(&write_path, &final_path)?;
        }
        Ok(())
    }

    /// Cleans up after a failed transaction. The staging file of an
    /// in-place update is deleted, leaving the source untouched; a
    /// direct destination keeps whatever partial bytes were written and
    /// must be discarded by the caller.
    fn abandon(mut self) {
        if let Err(e) = self.close_stream() {
            log::warn!("failed to close destination stream during cleanup: {e}");
        }
        if let DestinationSink::File {
            write_path,
            commit_path: Some(_),
            ..
        } = self
        {
            if let Err(e) = fs::remove_file(&write_path) {
                log::warn!(
                    "failed to remove staging file '{}': {e}",
                    write_path.display()
                );
            }
        }
    }
}

/// The sibling staging path for an in-place update.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_else(|| OsString::from("archive"));
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntryProperties;
    use crate::engine::{ItemPlan, ReadSeek, UpdateFeed};

    /// A format stub that never stores anything; enough to exercise the
    /// configuration contract.
    struct StubFormat;

    struct StubArchive;

    impl ContainerEngine for StubFormat {
        type Item = EntryProperties;
        type Archive = StubArchive;

        fn kind(&self) -> &'static str {
            "stub"
        }

        fn multi_item(&self) -> bool {
            true
        }

        fn open(&self, _input: Box<dyn ReadSeek>) -> Result<Self::Archive> {
            Ok(StubArchive)
        }
    }

    impl ContainerArchive for StubArchive {
        type Item = EntryProperties;

        fn items(&self) -> &[EntryProperties] {
            &[]
        }

        fn update_items(
            &mut self,
            _output: &mut dyn Write,
            new_count: usize,
            feed: &mut dyn UpdateFeed<EntryProperties>,
        ) -> Result<()> {
            for index in 0..new_count {
                if let ItemPlan::Write {
                    content_changed: true,
                    ..
                } = feed.plan(index, None)?
                {
                    let _ = feed.content(index)?;
                }
            }
            Ok(())
        }
    }

    impl FormatAdapter for StubFormat {
        type Item = EntryProperties;

        fn item_to_entry(&self, item: &EntryProperties) -> UpdateEntry {
            UpdateEntry::from_properties(item.clone())
        }

        fn entry_to_item(
            &self,
            entry: &UpdateEntry,
            _template: Option<&EntryProperties>,
        ) -> Result<EntryProperties> {
            Ok(entry.properties().clone())
        }
    }

    #[test]
    fn test_operation_without_source_fails() {
        let mut updater = ArchiveUpdater::new(StubFormat);
        let err = updater.update(Some).unwrap_err();
        assert!(matches!(err, Error::SourceNotSet));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_reader_source_requires_destination() {
        let mut updater = ArchiveUpdater::new(StubFormat);
        updater.source_reader(&mut &b""[..]).unwrap();
        let err = updater.update(Some).unwrap_err();
        assert!(matches!(err, Error::DestinationNotSet));
    }

    #[test]
    fn test_reader_source_with_writer_destination() {
        let mut updater = ArchiveUpdater::new(StubFormat);
        updater.source_reader(&mut &b""[..]).unwrap();
        updater.destination_writer(std::io::sink());
        let summary = updater.update(Some).unwrap();
        assert_eq!(summary.total_entries, 0);
        assert!(summary.is_noop());
    }

    #[test]
    fn test_staging_path_appends_tmp() {
        assert_eq!(
            staging_path(Path::new("dir/bundle.tar")),
            PathBuf::from("dir/bundle.tar.tmp")
        );
        assert_eq!(staging_path(Path::new("plain")), PathBuf::from("plain.tmp"));
    }

    #[test]
    fn test_append_gate_checks_before_io() {
        struct SingleStub;
        impl ContainerEngine for SingleStub {
            type Item = EntryProperties;
            type Archive = StubArchive;
            fn kind(&self) -> &'static str {
                "single-stub"
            }
            fn multi_item(&self) -> bool {
                false
            }
            fn open(&self, _input: Box<dyn ReadSeek>) -> Result<Self::Archive> {
                Ok(StubArchive)
            }
        }
        impl FormatAdapter for SingleStub {
            type Item = EntryProperties;
            fn item_to_entry(&self, item: &EntryProperties) -> UpdateEntry {
                UpdateEntry::from_properties(item.clone())
            }
            fn entry_to_item(
                &self,
                entry: &UpdateEntry,
                _template: Option<&EntryProperties>,
            ) -> Result<EntryProperties> {
                Ok(entry.properties().clone())
            }
        }

        // No source configured: the gate must fire before the missing
        // source is even noticed.
        let mut updater = ArchiveUpdater::new(SingleStub);
        let entries = vec![
            UpdateEntry::file("a").unwrap(),
            UpdateEntry::file("b").unwrap(),
        ];
        let err = updater.append(entries).unwrap_err();
        assert!(matches!(
            err,
            Error::SingleItemFormat {
                format: "single-stub"
            }
        ));
    }
}
