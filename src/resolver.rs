//! Dependency resolver.
//!
//! Expands the entry files into one ordered, de-duplicated list of all
//! transitively-imported local files. Each entry's list comes from the module
//! graph provider in dependency-first, entry-last order; merging keeps the
//! first-seen position of every file so the assembler can rely on every
//! dependency preceding its dependents.

use std::path::{Path, PathBuf};

use crate::error::BuildError;
use crate::graph::ModuleGraph;

/// Ordered sequence with set semantics: pushing an already-present item is a
/// no-op and first-seen order is preserved.
#[derive(Debug, Clone, Default)]
pub struct SetList<T: PartialEq> {
    items: Vec<T>,
}

impl<T: PartialEq> SetList<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Returns true when the item was actually appended.
    pub fn push(&mut self, item: T) -> bool {
        if self.items.contains(&item) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.push(item);
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: PartialEq> std::ops::Deref for SetList<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<'a, T: PartialEq> IntoIterator for &'a SetList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Result of resolving the entry set.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Every local file of the bundle, dependency-first.
    pub files: SetList<PathBuf>,
    /// Import targets that could not be located; reported, never fatal.
    pub unresolved: SetList<String>,
}

/// Merge the per-entry transitive dependency lists into one DependencyList.
///
/// No cycle detection is performed here; ordering inside an import cycle is
/// whatever the graph provider produced.
pub fn resolve(
    entries: &[PathBuf],
    root: &Path,
    graph: &dyn ModuleGraph,
) -> Result<Resolution, BuildError> {
    let mut resolution = Resolution::default();

    for entry in entries {
        let listing = graph.dependencies(entry, root)?;
        resolution.files.extend(listing.files);
        resolution.unresolved.extend(listing.unresolved);
    }

    Ok(resolution)
}
