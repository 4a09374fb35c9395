//! Set of pages with unsaved edits
//!
//! `DirtySet` is an immutable value. Every mutation returns a new set and
//! leaves the receiver untouched; a mutation that changes nothing hands back
//! the same underlying instance, so callers can detect change with
//! [`DirtySet::ptr_eq`].

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::models::PageId;

#[derive(Debug, Clone, Default)]
pub struct DirtySet {
    pages: Arc<BTreeSet<PageId>>,
}

impl DirtySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set with `id` added
    pub fn mark_dirty(&self, id: PageId) -> Self {
        if self.pages.contains(&id) {
            return self.clone();
        }
        let mut pages = (*self.pages).clone();
        pages.insert(id);
        Self {
            pages: Arc::new(pages),
        }
    }

    /// Set with `id` removed; the same instance if it was not present
    pub fn mark_clean(&self, id: PageId) -> Self {
        if !self.pages.contains(&id) {
            return self.clone();
        }
        let mut pages = (*self.pages).clone();
        pages.remove(&id);
        Self {
            pages: Arc::new(pages),
        }
    }

    /// Empty set; the same instance if already empty
    pub fn clear(&self) -> Self {
        if self.pages.is_empty() {
            return self.clone();
        }
        Self::new()
    }

    pub fn contains(&self, id: PageId) -> bool {
        self.pages.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Dirty page ids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = PageId> + '_ {
        self.pages.iter().copied()
    }

    /// Whether both values share the same underlying set
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pages, &other.pages)
    }
}

impl PartialEq for DirtySet {
    fn eq(&self, other: &Self) -> bool {
        self.pages == other.pages
    }
}

impl Eq for DirtySet {}
