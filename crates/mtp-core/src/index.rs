//! Object index collaborator.
//!
//! The media index ("tagcache") lives outside the responder. The responder
//! only opens a search, steps through it, looks entries up by id and
//! releases the search again.

use tracing::debug;

/// Field of an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTag {
    Filename,
}

/// Interface consumed from the media index.
pub trait ObjectIndex {
    /// Resumable enumeration position.
    type Cursor;

    /// Whether the index is loaded and can be searched.
    fn is_usable(&self) -> bool;

    /// Open a search over `tag`, positioned before the first entry.
    fn begin_search(&mut self, tag: IndexTag) -> Self::Cursor;

    /// Advance the cursor, returning the id of the entry it now points at.
    fn get_next(&mut self, cursor: &mut Self::Cursor) -> Option<u32>;

    /// Look up field `tag` of entry `idx_id`.
    fn retrieve(&mut self, cursor: &mut Self::Cursor, idx_id: u32, tag: IndexTag)
    -> Option<String>;

    /// Release a search.
    fn finish(&mut self, cursor: Self::Cursor);
}

/// Object handle for an index entry (handles are 1-based).
pub fn idx_id_to_handle(idx_id: u32) -> u32 {
    idx_id.wrapping_add(1)
}

pub fn handle_to_idx_id(handle: u32) -> u32 {
    handle.wrapping_sub(1)
}

/// Lazily opened search owned by the responder.
#[derive(Debug)]
pub struct CursorSlot<C> {
    cursor: Option<C>,
}

impl<C> Default for CursorSlot<C> {
    fn default() -> Self {
        Self { cursor: None }
    }
}

impl<C> CursorSlot<C> {
    pub fn is_active(&self) -> bool {
        self.cursor.is_some()
    }

    /// Open the search if it is not open yet.
    pub fn ensure<I: ObjectIndex<Cursor = C>>(&mut self, index: &mut I) -> &mut C {
        self.cursor
            .get_or_insert_with(|| index.begin_search(IndexTag::Filename))
    }

    /// Restart the search from the first entry.
    pub fn rewind<I: ObjectIndex<Cursor = C>>(&mut self, index: &mut I) -> &mut C {
        self.release(index);
        self.ensure(index)
    }

    pub fn release<I: ObjectIndex<Cursor = C>>(&mut self, index: &mut I) {
        if let Some(cursor) = self.cursor.take() {
            index.finish(cursor);
        }
    }
}

/// In-memory index over a list of file names.
///
/// Entry ids are positions in the list.
#[derive(Debug, Clone, Default)]
pub struct StaticIndex {
    entries: Vec<String>,
    usable: bool,
    open_searches: usize,
}

/// Cursor into a [`StaticIndex`].
#[derive(Debug)]
pub struct StaticCursor {
    next: usize,
}

impl StaticIndex {
    pub fn new<S: Into<String>>(entries: impl IntoIterator<Item = S>) -> Self {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
            usable: true,
            open_searches: 0,
        }
    }

    /// Index that reports itself as not yet usable (still loading).
    pub fn unusable() -> Self {
        Self {
            usable: false,
            ..Self::default()
        }
    }

    pub fn set_usable(&mut self, usable: bool) {
        self.usable = usable;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Searches begun and not yet finished.
    pub fn open_searches(&self) -> usize {
        self.open_searches
    }
}

impl ObjectIndex for StaticIndex {
    type Cursor = StaticCursor;

    fn is_usable(&self) -> bool {
        self.usable
    }

    fn begin_search(&mut self, tag: IndexTag) -> StaticCursor {
        debug!(?tag, entries = self.entries.len(), "Index search opened");
        self.open_searches += 1;
        StaticCursor { next: 0 }
    }

    fn get_next(&mut self, cursor: &mut StaticCursor) -> Option<u32> {
        if cursor.next >= self.entries.len() {
            return None;
        }
        let id = cursor.next as u32;
        cursor.next += 1;
        Some(id)
    }

    fn retrieve(
        &mut self,
        _cursor: &mut StaticCursor,
        idx_id: u32,
        tag: IndexTag,
    ) -> Option<String> {
        match tag {
            IndexTag::Filename => self.entries.get(idx_id as usize).cloned(),
        }
    }

    fn finish(&mut self, _cursor: StaticCursor) {
        self.open_searches = self.open_searches.saturating_sub(1);
    }
}
