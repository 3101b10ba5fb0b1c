use crate::model::Subject;
use crate::reification::mask::StmtMask;
use crate::reification::store::ReifRow;
use std::collections::VecDeque;

/// What is known of the stored fragments of one reified node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReifCache {
    node: Subject,
    mask: StmtMask,
    rows: usize,
}

impl ReifCache {
    pub fn new(node: Subject, mask: StmtMask, rows: usize) -> Self {
        Self { node, mask, rows }
    }

    /// Folds the rows of a node. `None` if there are none.
    pub fn from_rows(node: Subject, rows: &[ReifRow]) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let mut mask = StmtMask::EMPTY;
        for row in rows {
            mask.merge(row.mask());
        }
        Some(Self::new(node, mask, rows.len()))
    }

    #[inline]
    pub fn node(&self) -> &Subject {
        &self.node
    }

    #[inline]
    pub fn mask(&self) -> StmtMask {
        self.mask
    }

    #[cfg(test)]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// A complete statement held by a single row.
    #[inline]
    pub fn is_stmt(&self) -> bool {
        self.mask.is_spot() && self.rows == 1
    }

    #[inline]
    pub fn can_merge(&self, mask: StmtMask) -> bool {
        !self.mask.intersects(mask)
    }

    /// The fragments can be written into the single existing row.
    #[inline]
    pub fn can_update(&self, mask: StmtMask) -> bool {
        self.can_merge(mask) && self.rows == 1
    }

    #[inline]
    pub fn update(&mut self, mask: StmtMask) {
        self.mask.merge(mask);
    }

    #[inline]
    pub fn add_row(&mut self, mask: StmtMask) {
        self.mask.merge(mask);
        self.rows += 1;
    }
}

/// A small cache of [`ReifCache`] entries, evicting the oldest first.
#[derive(Debug)]
pub(crate) struct ReifCacheMap {
    capacity: usize,
    entries: VecDeque<ReifCache>,
}

impl ReifCacheMap {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn get(&self, node: &Subject) -> Option<&ReifCache> {
        self.entries.iter().find(|e| e.node() == node)
    }

    /// Inserts or replaces the entry of its node.
    pub fn insert(&mut self, entry: ReifCache) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.node() == entry.node()) {
            *existing = entry;
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn remove(&mut self, node: &Subject) {
        self.entries.retain(|e| e.node() != node);
    }

    pub fn flush(&mut self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
