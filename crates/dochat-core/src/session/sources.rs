//! Citation correlator: the ordered, deduplicated source list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One cited document reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub url: String,
    pub title: String,
}

impl Source {
    fn labeled(id: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            url: url.to_string(),
            title: format!("Source {id}"),
        }
    }
}

/// Outcome of applying an incremental citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CitationOutcome {
    /// A new source joined the list at `index`.
    Added { index: usize },
    /// The id was already known; only the current pointer moved.
    Revisited { index: usize },
}

/// Ordered source list with a "current" pointer.
///
/// Ids keep first-seen order. An id, once added, is never removed or
/// duplicated within a turn; re-arrival only moves the pointer.
#[derive(Debug, Clone, Default)]
pub struct SourceList {
    sources: Vec<Source>,
    current_index: usize,
}

impl SourceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one incremental citation frame.
    pub fn apply_citation(&mut self, id: &str, url: &str) -> CitationOutcome {
        if let Some(index) = self.sources.iter().position(|source| source.id == id) {
            self.current_index = index;
            return CitationOutcome::Revisited { index };
        }
        self.sources.push(Source::labeled(id, url));
        let index = self.sources.len() - 1;
        self.current_index = index;
        CitationOutcome::Added { index }
    }

    /// Applies the bulk map delivered with turn completion.
    ///
    /// Incremental citations take precedence: the map is ignored unless the
    /// list is still empty. Entries land in `BTreeMap` iteration order,
    /// i.e. ascending id.
    pub fn apply_bulk(&mut self, sources: &BTreeMap<String, String>) {
        if !self.sources.is_empty() {
            return;
        }
        for (id, url) in sources {
            self.sources.push(Source::labeled(id, url));
        }
    }

    /// Resets the list for a new turn.
    pub fn clear(&mut self) {
        self.sources.clear();
        self.current_index = 0;
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}
