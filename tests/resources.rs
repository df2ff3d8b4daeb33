//! Resource accounting tests.
//!
//! A mock container engine counts every content stream it receives and
//! injects failures at chosen points in the rewrite; drop-tracking
//! readers verify that no stream opened on the caller's behalf outlives
//! the operation, on success or failure. The mock also requests content
//! in reverse index order to pin down the sparse, engine-chosen-order
//! contract of the content phase.

use std::fs;
use std::io::{Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rearc::{
    ArchiveUpdater, ContainerArchive, ContainerEngine, EntryProperties, Error, FormatAdapter,
    ItemPlan, ReadSeek, Result, SharedBuffer, UpdateEntry, UpdateFeed,
};

/// Shared open/close counters for tracked readers.
#[derive(Clone, Default)]
struct StreamLedger {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl StreamLedger {
    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A reader that reports its construction and drop to a ledger.
struct TrackedReader {
    data: Cursor<Vec<u8>>,
    ledger: StreamLedger,
}

impl TrackedReader {
    fn new(ledger: &StreamLedger, data: Vec<u8>) -> Self {
        ledger.opened.fetch_add(1, Ordering::SeqCst);
        Self {
            data: Cursor::new(data),
            ledger: ledger.clone(),
        }
    }
}

impl Read for TrackedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.data.read(buf)
    }
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.ledger.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Where the mock engine injects a failure.
#[derive(Clone, Copy)]
enum FailPoint {
    Never,
    /// Fail once the metadata phase has completed.
    AfterPlans,
    /// Fail after consuming this many content streams.
    AfterContent(usize),
}

/// A container engine double: preset items, observable content
/// deliveries, reverse-order content phase, optional injected failures.
#[derive(Clone)]
struct MockFormat {
    items: Vec<EntryProperties>,
    fail: FailPoint,
    delivered: Arc<Mutex<Vec<(usize, Vec<u8>)>>>,
}

impl MockFormat {
    fn new(names: &[&str], fail: FailPoint) -> Self {
        Self {
            items: names
                .iter()
                .map(|name| EntryProperties {
                    name: (*name).to_string(),
                    is_directory: false,
                    size: Some(1),
                    modified: None,
                    attributes: None,
                })
                .collect(),
            fail,
            delivered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn delivered(&self) -> Vec<(usize, Vec<u8>)> {
        self.delivered.lock().unwrap().clone()
    }
}

struct MockArchive {
    items: Vec<EntryProperties>,
    fail: FailPoint,
    delivered: Arc<Mutex<Vec<(usize, Vec<u8>)>>>,
}

impl ContainerEngine for MockFormat {
    type Item = EntryProperties;
    type Archive = MockArchive;

    fn kind(&self) -> &'static str {
        "mock"
    }

    fn multi_item(&self) -> bool {
        true
    }

    fn open(&self, _input: Box<dyn ReadSeek>) -> Result<Self::Archive> {
        Ok(MockArchive {
            items: self.items.clone(),
            fail: self.fail,
            delivered: Arc::clone(&self.delivered),
        })
    }
}

impl ContainerArchive for MockArchive {
    type Item = EntryProperties;

    fn items(&self) -> &[EntryProperties] {
        &self.items
    }

    fn update_items(
        &mut self,
        output: &mut dyn Write,
        new_count: usize,
        feed: &mut dyn UpdateFeed<EntryProperties>,
    ) -> Result<()> {
        // Metadata phase: every target index, in order.
        let mut plans = Vec::with_capacity(new_count);
        for index in 0..new_count {
            plans.push(feed.plan(index, self.items.get(index))?);
        }
        if matches!(self.fail, FailPoint::AfterPlans) {
            return Err(Error::invalid_format("mock", "injected failure after plans"));
        }

        output.write_all(b"mock-archive\n")?;

        // Content phase: only registered indices, highest index first.
        let mut consumed = 0usize;
        for (index, plan) in plans.iter().enumerate().rev() {
            let ItemPlan::Write {
                content_changed: true,
                ..
            } = plan
            else {
                continue;
            };
            let mut reader = feed
                .content(index)?
                .ok_or_else(|| Error::corrupt_entry(index, "registered content missing"))?;
            let mut data = Vec::new();
            reader.read_to_end(&mut data)?;
            drop(reader);
            self.delivered.lock().unwrap().push((index, data));
            consumed += 1;
            if let FailPoint::AfterContent(limit) = self.fail {
                if consumed == limit {
                    return Err(Error::invalid_format(
                        "mock",
                        "injected failure mid-content",
                    ));
                }
            }
        }

        output.flush()?;
        Ok(())
    }
}

impl FormatAdapter for MockFormat {
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

/// Attaches tracked replacement content to the named entries.
fn attach_tracked(
    ledger: StreamLedger,
    names: &'static [&'static str],
) -> impl FnMut(UpdateEntry) -> Option<UpdateEntry> {
    move |entry: UpdateEntry| {
        if names.contains(&entry.name()) {
            let payload = format!("content for {}", entry.name()).into_bytes();
            let reader = TrackedReader::new(&ledger, payload);
            Some(entry.with_source_reader(Box::new(reader)))
        } else {
            Some(entry)
        }
    }
}

#[test]
fn test_all_streams_closed_after_success() {
    let ledger = StreamLedger::default();
    let format = MockFormat::new(&["a", "b", "c"], FailPoint::Never);
    let probe = format.clone();

    let mut updater = ArchiveUpdater::new(format);
    updater.source_reader(&mut &b"ignored"[..]).unwrap();
    updater.destination_writer(SharedBuffer::new());

    let summary = updater.update(attach_tracked(ledger.clone(), &["a", "c"])).unwrap();
    assert_eq!(summary.total_entries, 3);
    assert_eq!(summary.entries_updated, 2);

    assert_eq!(ledger.opened(), 2);
    assert_eq!(ledger.closed(), 2, "a content stream outlived the operation");

    // Sparse, engine-chosen order: the mock asked highest-index first,
    // and only for the two registered indices.
    let delivered = probe.delivered();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].0, 2);
    assert_eq!(delivered[0].1, b"content for c");
    assert_eq!(delivered[1].0, 0);
    assert_eq!(delivered[1].1, b"content for a");
}

#[test]
fn test_all_streams_closed_after_mid_content_failure() {
    let ledger = StreamLedger::default();
    let format = MockFormat::new(&["a", "b", "c"], FailPoint::AfterContent(1));

    let mut updater = ArchiveUpdater::new(format);
    updater.source_reader(&mut &b"ignored"[..]).unwrap();
    updater.destination_writer(SharedBuffer::new());

    let err = updater.update(attach_tracked(ledger.clone(), &["a", "c"])).unwrap_err();
    assert!(err.is_engine_error());

    // One stream was consumed by the engine, the other never left the
    // pending map; both must be dropped by the time the call returns.
    assert_eq!(ledger.opened(), 2);
    assert_eq!(ledger.closed(), 2, "a content stream leaked through the failure path");
}

#[test]
fn test_all_streams_closed_when_metadata_phase_fails() {
    let ledger = StreamLedger::default();
    let format = MockFormat::new(&["a", "b"], FailPoint::AfterPlans);

    let mut updater = ArchiveUpdater::new(format);
    updater.source_reader(&mut &b"ignored"[..]).unwrap();
    updater.destination_writer(SharedBuffer::new());

    let err = updater.update(attach_tracked(ledger.clone(), &["a", "b"])).unwrap_err();
    assert!(err.is_engine_error());

    // The content phase never ran; the registered sources are released
    // with the transaction state.
    assert_eq!(ledger.opened(), 2);
    assert_eq!(ledger.closed(), 2);
}

#[test]
fn test_failed_in_place_rewrite_cleans_staging_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let archive_path = dir.path().join("archive.mock");
    fs::write(&archive_path, b"original bytes").unwrap();

    let format = MockFormat::new(&["a"], FailPoint::AfterPlans);
    let mut updater = ArchiveUpdater::new(format);
    updater.source_path(&archive_path);
    assert!(updater.update(Some).is_err());

    assert_eq!(fs::read(&archive_path).unwrap(), b"original bytes");
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("archive.mock")]);
}

#[test]
fn test_successful_in_place_rewrite_commits_over_source() {
    let dir = tempfile::TempDir::new().unwrap();
    let archive_path = dir.path().join("archive.mock");
    fs::write(&archive_path, b"original bytes").unwrap();

    let format = MockFormat::new(&[], FailPoint::Never);
    let mut updater = ArchiveUpdater::new(format);
    updater.source_path(&archive_path);
    let summary = updater.update(Some).unwrap();
    assert_eq!(summary.total_entries, 0);

    assert_eq!(fs::read(&archive_path).unwrap(), b"mock-archive\n");
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from("archive.mock")]);
}
