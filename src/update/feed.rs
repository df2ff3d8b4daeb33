//! The coordinator's implementations of the rewrite callback.
//!
//! Each operation drives the engine through a dedicated feed:
//!
//! - [`AppendFeed`] carries every existing item over and materializes
//!   the appended entries behind them;
//! - [`CarryFeed`] remaps indices across a removal set, skipping removed
//!   items while keeping everything else verbatim;
//! - [`TransformFeed`] runs the caller's transform over every existing
//!   item, registering replacement content for the sparse content phase.
//!
//! A feed owns the transaction-scoped state: the map from target index
//! to pending content source, filled during the metadata phase and
//! drained during the content phase. Sources the feed opens (files,
//! buffered bytes) and readers handed over by the caller all pass to the
//! engine, which drops them before `update_items` returns; whatever the
//! content phase never requested is dropped with the feed itself.

use std::collections::{BTreeSet, HashMap};
use std::io::Read;

use crate::engine::{ItemPlan, UpdateFeed};
use crate::entry::ContentSource;
use crate::format::FormatAdapter;
use crate::{Error, Password, Result, UpdateEntry};

/// Feed for `append`: pass-through below the original count, new items
/// above it.
pub(crate) struct AppendFeed<'a, A: FormatAdapter> {
    adapter: &'a A,
    original_count: usize,
    entries: Vec<Option<UpdateEntry>>,
    pending: HashMap<usize, ContentSource>,
    password: Option<&'a Password>,
}

impl<'a, A: FormatAdapter> AppendFeed<'a, A> {
    pub(crate) fn new(
        adapter: &'a A,
        original_count: usize,
        entries: Vec<UpdateEntry>,
        password: Option<&'a Password>,
    ) -> Self {
        Self {
            adapter,
            original_count,
            entries: entries.into_iter().map(Some).collect(),
            pending: HashMap::new(),
            password,
        }
    }
}

impl<A: FormatAdapter> UpdateFeed<A::Item> for AppendFeed<'_, A> {
    fn plan(&mut self, index: usize, _existing: Option<&A::Item>) -> Result<ItemPlan<A::Item>> {
        if index < self.original_count {
            return Ok(ItemPlan::Keep {
                source_index: index,
            });
        }

        let slot = index - self.original_count;
        let mut entry = self
            .entries
            .get_mut(slot)
            .and_then(Option::take)
            .ok_or_else(|| Error::corrupt_entry(index, "append plan requested twice"))?;
        let source = entry.take_source();
        let item = self.adapter.entry_to_item(&entry, None)?;
        let content_changed = source.is_some();
        if let Some(source) = source {
            self.pending.insert(index, source);
        }
        Ok(ItemPlan::Write {
            item,
            properties_changed: true,
            content_changed,
        })
    }

    fn content(&mut self, index: usize) -> Result<Option<Box<dyn Read + Send>>> {
        match self.pending.remove(&index) {
            Some(source) => Ok(Some(source.open()?)),
            None => Ok(None),
        }
    }

    fn password(&self) -> Option<&Password> {
        self.password
    }
}

/// Feed for the rewrite phase of `remove`: emits every surviving item,
/// skipping forward across the removal set.
pub(crate) struct CarryFeed {
    removed: BTreeSet<usize>,
    offset: usize,
}

impl CarryFeed {
    pub(crate) fn new(removed: BTreeSet<usize>) -> Self {
        Self { removed, offset: 0 }
    }
}

impl<I> UpdateFeed<I> for CarryFeed {
    fn plan(&mut self, index: usize, _existing: Option<&I>) -> Result<ItemPlan<I>> {
        let mut source_index = index + self.offset;
        while self.removed.contains(&source_index) {
            self.offset += 1;
            source_index = index + self.offset;
        }
        Ok(ItemPlan::Keep { source_index })
    }

    fn content(&mut self, _index: usize) -> Result<Option<Box<dyn Read + Send>>> {
        // Removal never changes the bytes of surviving items.
        Ok(None)
    }
}

/// Feed for `update`: transforms every existing item in place.
pub(crate) struct TransformFeed<'a, A: FormatAdapter, T> {
    adapter: &'a A,
    transform: T,
    pending: HashMap<usize, ContentSource>,
    password: Option<&'a Password>,
    /// Number of items whose metadata or content changed.
    changed: usize,
}

impl<'a, A, T> TransformFeed<'a, A, T>
where
    A: FormatAdapter,
    T: FnMut(UpdateEntry) -> Option<UpdateEntry>,
{
    pub(crate) fn new(adapter: &'a A, transform: T, password: Option<&'a Password>) -> Self {
        Self {
            adapter,
            transform,
            pending: HashMap::new(),
            password,
            changed: 0,
        }
    }

    /// Number of items the transform changed (metadata or content).
    pub(crate) fn changed(&self) -> usize {
        self.changed
    }
}

impl<A, T> UpdateFeed<A::Item> for TransformFeed<'_, A, T>
where
    A: FormatAdapter,
    T: FnMut(UpdateEntry) -> Option<UpdateEntry>,
{
    fn plan(&mut self, index: usize, existing: Option<&A::Item>) -> Result<ItemPlan<A::Item>> {
        let original_item = existing
            .ok_or_else(|| Error::corrupt_entry(index, "transform plan beyond original count"))?;
        let original = self.adapter.item_to_entry(original_item);
        let original_props = original.properties().clone();

        let mut candidate = (self.transform)(original)
            .ok_or(Error::TransformReturnedNone { index })?;
        let source = candidate.take_source();

        // A replaced source flips the change flag even when the
        // comparable properties are identical: the source participates
        // in the snapshot handed to the comparison, so a content-only
        // edit is reported to the engine as a metadata change as well.
        let properties_changed = candidate.properties() != &original_props || source.is_some();
        let content_changed = source.is_some();

        let item = self.adapter.entry_to_item(&candidate, Some(original_item))?;
        if let Some(source) = source {
            self.pending.insert(index, source);
        }
        if properties_changed {
            self.changed += 1;
        }

        Ok(ItemPlan::Write {
            item,
            properties_changed,
            content_changed,
        })
    }

    fn content(&mut self, index: usize) -> Result<Option<Box<dyn Read + Send>>> {
        match self.pending.remove(&index) {
            Some(source) => Ok(Some(source.open()?)),
            None => Ok(None),
        }
    }

    fn password(&self) -> Option<&Password> {
        self.password
    }
}
