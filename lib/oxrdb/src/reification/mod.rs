//! Reification bookkeeping.
//!
//! A reified node is described by up to four fragments: `rdf:subject`, `rdf:predicate`,
//! `rdf:object` and `rdf:type rdf:Statement`.
//! They are stored in the reification table, ideally as one row per node.
//! Fragments may arrive one by one; they are merged into the existing row when possible
//! and kept as extra rows when the node is over-specified.
use crate::driver::{Driver, GraphId};
use crate::error::{CorruptionError, ReificationError, StorageError};
use crate::model::{Subject, Triple};
use cache::{ReifCache, ReifCacheMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use store::ReifStore;
use tracing::trace;

mod cache;
mod mask;
mod store;

pub use mask::{Fragment, FragmentKind, StmtMask};
pub(crate) use mask::{FragmentPattern, is_statement_class};
pub(crate) use store::ReifRow;

/// The reification rows of one graph and the cache of their per-node state.
///
/// Writers of one graph must be serialized by the caller: the cache lock only protects memory.
pub(crate) struct ReificationTable {
    store: ReifStore,
    cache: Mutex<ReifCacheMap>,
}

impl ReificationTable {
    pub fn new(driver: Driver, graph: GraphId, cache_size: usize) -> Self {
        Self {
            store: ReifStore::new(driver, graph),
            cache: Mutex::new(ReifCacheMap::new(cache_size)),
        }
    }

    #[inline]
    pub fn store(&self) -> &ReifStore {
        &self.store
    }

    fn cache(&self) -> Result<MutexGuard<'_, ReifCacheMap>, StorageError> {
        self.cache.lock().map_err(poison_error)
    }

    fn load(
        &self,
        cache: &mut ReifCacheMap,
        node: &Subject,
    ) -> Result<Option<ReifCache>, StorageError> {
        if let Some(entry) = cache.get(node) {
            return Ok(Some(entry.clone()));
        }
        let Some(entry) = ReifCache::from_rows(node.clone(), &self.store.rows(node)?) else {
            return Ok(None);
        };
        cache.insert(entry.clone());
        Ok(Some(entry))
    }

    /// Stores one fragment of `node`.
    pub fn add_fragment(&self, node: &Subject, fragment: Fragment) -> Result<(), ReificationError> {
        let mut cache = self.cache()?;
        self.add_fragment_locked(&mut cache, node, fragment)
    }

    fn add_fragment_locked(
        &self,
        cache: &mut ReifCacheMap,
        node: &Subject,
        fragment: Fragment,
    ) -> Result<(), ReificationError> {
        let Some(fragment) = self.try_add_fragment(cache, node, fragment)? else {
            return Ok(());
        };
        // The rows of the node were changed through another handle
        trace!("Reloading the stale reification state of {node}");
        cache.remove(node);
        if let Some(fragment) = self.try_add_fragment(cache, node, fragment)? {
            self.store.insert_fragment(node, fragment)?;
            cache.remove(node);
        }
        Ok(())
    }

    /// Runs the fragment state machine from the cached state of the node.
    ///
    /// Gives the fragment back if the cached state turned out to disagree with the stored rows.
    fn try_add_fragment(
        &self,
        cache: &mut ReifCacheMap,
        node: &Subject,
        fragment: Fragment,
    ) -> Result<Option<Fragment>, ReificationError> {
        let mask = fragment.mask();
        let Some(mut entry) = self.load(cache, node)? else {
            self.store.insert_fragment(node, fragment)?;
            cache.insert(ReifCache::new(node.clone(), mask, 1));
            return Ok(None);
        };
        if entry.can_update(mask) {
            if !self.store.update_fragment(node, &fragment)? {
                return Ok(Some(fragment));
            }
            entry.update(mask);
            cache.insert(entry);
        } else if entry.can_merge(mask) {
            cache.remove(node);
            self.store.insert_and_compact(node, fragment)?;
        } else if self.store.has_fragment(node, &fragment)? {
            trace!("Fragment {mask} of {node} is already stored");
        } else if entry.is_stmt() {
            return Err(ReificationError::AlreadyReified { node: node.clone() });
        } else {
            self.store.insert_fragment(node, fragment)?;
            entry.add_row(mask);
            cache.insert(entry);
        }
        Ok(None)
    }

    /// Removes one fragment of `node`. Returns if it was stored.
    pub fn remove_fragment(&self, node: &Subject, fragment: &Fragment) -> Result<bool, StorageError> {
        let mut cache = self.cache()?;
        cache.flush();
        Ok(self.store.remove_fragment(node, fragment)? > 0)
    }

    pub fn reify(&self, node: &Subject, triple: &Triple) -> Result<(), ReificationError> {
        let mut cache = self.cache()?;
        let rows = self.store.rows(node)?;
        let Some(entry) = ReifCache::from_rows(node.clone(), &rows) else {
            self.store.insert_statement(node, triple)?;
            cache.insert(ReifCache::new(node.clone(), StmtMask::SPOT, 1));
            return Ok(());
        };
        if entry.is_stmt() {
            return if rows
                .first()
                .and_then(ReifRow::statement)
                .is_some_and(|t| t == *triple)
            {
                Ok(())
            } else {
                Err(ReificationError::AlreadyReified { node: node.clone() })
            };
        }
        if !rows.iter().all(|row| row.agrees_with(triple)) {
            return Err(ReificationError::CannotReify { node: node.clone() });
        }
        for fragment in Fragment::of_statement(triple) {
            self.add_fragment_locked(&mut cache, node, fragment)?;
        }
        Ok(())
    }

    pub fn remove(&self, node: &Subject, triple: &Triple) -> Result<(), StorageError> {
        let mut cache = self.cache()?;
        cache.flush();
        for fragment in Fragment::of_statement(triple) {
            self.store.remove_fragment(node, &fragment)?;
        }
        Ok(())
    }

    /// The statement completely reified by the node.
    pub fn triple_for(&self, node: &Subject) -> Result<Option<Triple>, StorageError> {
        let rows = self.store.rows(node)?;
        Ok(match rows.as_slice() {
            [row] => row.statement(),
            _ => None,
        })
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        let mut cache = self.cache()?;
        cache.flush();
        self.store.clear()
    }
}

fn poison_error<T>(_: PoisonError<T>) -> StorageError {
    CorruptionError::msg("Poisoned reification cache mutex").into()
}

/// Reification read/write surface of a [`GraphRdb`](crate::GraphRdb).
///
/// ```
/// use oxrdb::model::{NamedNode, Triple};
/// use oxrdb::{Driver, GraphOptions, GraphRdb};
///
/// let graph = GraphRdb::default_graph(&Driver::open_in_memory()?, GraphOptions::new())?;
/// let node = NamedNode::new("http://example.com/r")?;
/// let triple = Triple::new(
///     NamedNode::new("http://example.com/s")?,
///     NamedNode::new("http://example.com/p")?,
///     NamedNode::new("http://example.com/o")?,
/// );
/// graph.reifier().reify(&node.clone().into(), &triple)?;
/// assert_eq!(graph.reifier().triple_for(&node.into())?, Some(triple));
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone, Copy)]
pub struct Reifier<'a> {
    table: &'a ReificationTable,
}

impl<'a> Reifier<'a> {
    pub(crate) fn new(table: &'a ReificationTable) -> Self {
        Self { table }
    }

    /// Makes `node` reify `triple`.
    ///
    /// Fails with [`ReificationError::AlreadyReified`] if the node reifies another statement
    /// and with [`ReificationError::CannotReify`] if some of its fragments disagree with `triple`.
    pub fn reify(&self, node: &Subject, triple: &Triple) -> Result<(), ReificationError> {
        self.table.reify(node, triple)
    }

    /// Removes the reification of `triple` by `node`.
    pub fn remove(&self, node: &Subject, triple: &Triple) -> Result<(), StorageError> {
        self.table.remove(node, triple)
    }

    /// Checks if the node completely reifies a statement.
    pub fn contains_node(&self, node: &Subject) -> Result<bool, StorageError> {
        Ok(self.table.triple_for(node)?.is_some())
    }

    /// Checks if some node completely reifies the statement.
    pub fn contains_triple(&self, triple: &Triple) -> Result<bool, StorageError> {
        Ok(!self.table.store().nodes_for(triple)?.is_empty())
    }

    /// The statement completely reified by the node.
    pub fn triple_for(&self, node: &Subject) -> Result<Option<Triple>, StorageError> {
        self.table.triple_for(node)
    }

    /// The nodes completely reifying the statement.
    pub fn nodes_for(&self, triple: &Triple) -> Result<Vec<Subject>, StorageError> {
        self.table.store().nodes_for(triple)
    }

    /// All the nodes completely reifying a statement.
    pub fn reified_nodes(&self) -> Result<Vec<Subject>, StorageError> {
        self.table.store().complete_nodes()
    }

    /// Checks if the node has any reification fragment, complete or not.
    pub fn has_fragments(&self, node: &Subject) -> Result<bool, StorageError> {
        self.table.store().has_node(node)
    }
}
