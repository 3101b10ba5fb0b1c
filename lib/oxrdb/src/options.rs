/// How reification fragments (`rdf:subject`, `rdf:predicate`, `rdf:object` and
/// `rdf:type rdf:Statement` triples) interact with the rest of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReificationStyle {
    /// Fragments added to the graph are stored in the reifier table and stay visible
    /// to `find`, `contains`, `len` and queries.
    #[default]
    Standard,
    /// Fragments added to the graph are stored in the reifier table but hidden.
    Convenient,
    /// The reifier table is only written through the reifier API.
    /// Fragments added to the graph are plain triples.
    Minimal,
}

impl ReificationStyle {
    /// Whether graph writes are routed to the reifier table.
    #[inline]
    pub fn intercepts(self) -> bool {
        !matches!(self, Self::Minimal)
    }

    /// Whether the reifier table content is part of the graph.
    #[inline]
    pub fn conceals(self) -> bool {
        !matches!(self, Self::Standard)
    }

    /// The name stored in the graph registry.
    #[inline]
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Convenient => "convenient",
            Self::Minimal => "minimal",
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(Self::Standard),
            "convenient" => Some(Self::Convenient),
            "minimal" => Some(Self::Minimal),
            _ => None,
        }
    }
}

/// The options deciding how the triples of a graph are laid out in the tables.
///
/// They are stored with the graph when it is created and can't change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StorageOptions {
    pub reification_style: ReificationStyle,
    pub duplicate_check: bool,
    pub full_reification: bool,
}

/// Options of a [`GraphRdb`](crate::GraphRdb).
///
/// The reification style, the duplicate check and full reification are stored with the graph
/// when it is created. Opening the graph again with other values for them fails.
/// The other options only tune the handle they are given to.
///
/// ```
/// use oxrdb::{GraphOptions, ReificationStyle};
///
/// let options = GraphOptions::new()
///     .with_reification_style(ReificationStyle::Convenient)
///     .without_fast_path();
/// assert!(!options.fast_path());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphOptions {
    reification_style: ReificationStyle,
    fast_path: bool,
    full_reification: bool,
    duplicate_check: bool,
    pipeline_buffer: usize,
    reification_cache_size: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            reification_style: ReificationStyle::default(),
            fast_path: true,
            full_reification: false,
            duplicate_check: true,
            pipeline_buffer: 64,
            reification_cache_size: 1,
        }
    }
}

impl GraphOptions {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_reification_style(mut self, style: ReificationStyle) -> Self {
        self.reification_style = style;
        self
    }

    /// Evaluates every triple pattern on its own instead of compiling joins into a single SQL query.
    #[inline]
    #[must_use]
    pub fn without_fast_path(mut self) -> Self {
        self.fast_path = false;
        self
    }

    /// Asserts that every reified statement is stored as one complete row.
    ///
    /// Patterns on the same reified statement then share a table alias instead of being joined.
    #[inline]
    #[must_use]
    pub fn with_full_reification(mut self) -> Self {
        self.full_reification = true;
        self
    }

    /// Stores triples without checking first if they are already present.
    #[inline]
    #[must_use]
    pub fn without_duplicate_check(mut self) -> Self {
        self.duplicate_check = false;
        self
    }

    /// Capacity of the channel between two consecutive stages of a query pipeline.
    #[inline]
    #[must_use]
    pub fn with_pipeline_buffer(mut self, capacity: usize) -> Self {
        self.pipeline_buffer = capacity.max(1);
        self
    }

    /// Number of reified nodes kept in the reification cache.
    #[inline]
    #[must_use]
    pub fn with_reification_cache_size(mut self, size: usize) -> Self {
        self.reification_cache_size = size.max(1);
        self
    }

    #[inline]
    pub fn reification_style(&self) -> ReificationStyle {
        self.reification_style
    }

    #[inline]
    pub fn fast_path(&self) -> bool {
        self.fast_path
    }

    #[inline]
    pub fn full_reification(&self) -> bool {
        self.full_reification
    }

    #[inline]
    pub fn duplicate_check(&self) -> bool {
        self.duplicate_check
    }

    #[inline]
    pub fn pipeline_buffer(&self) -> usize {
        self.pipeline_buffer
    }

    #[inline]
    pub fn reification_cache_size(&self) -> usize {
        self.reification_cache_size
    }

    #[inline]
    pub(crate) fn storage(&self) -> StorageOptions {
        StorageOptions {
            reification_style: self.reification_style,
            duplicate_check: self.duplicate_check,
            full_reification: self.full_reification,
        }
    }

    #[inline]
    #[must_use]
    pub(crate) fn with_storage(mut self, storage: StorageOptions) -> Self {
        self.reification_style = storage.reification_style;
        self.duplicate_check = storage.duplicate_check;
        self.full_reification = storage.full_reification;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_options() {
        let options = GraphOptions::new()
            .with_reification_style(ReificationStyle::Minimal)
            .without_duplicate_check()
            .with_pipeline_buffer(3);
        let storage = options.storage();
        assert_eq!(GraphOptions::new().with_storage(storage).storage(), storage);
        assert_ne!(GraphOptions::new().storage(), storage);
        assert_eq!(
            GraphOptions::new().with_storage(storage).pipeline_buffer(),
            GraphOptions::new().pipeline_buffer()
        );
        for style in [
            ReificationStyle::Standard,
            ReificationStyle::Convenient,
            ReificationStyle::Minimal,
        ] {
            assert_eq!(ReificationStyle::from_name(style.name()), Some(style));
        }
        assert_eq!(ReificationStyle::from_name("full"), None);
    }
}
