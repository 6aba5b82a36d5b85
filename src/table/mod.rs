//! Phrase tables, the per-sentence phrase arena and the table registry.

pub mod group;
pub mod memory;

use std::{borrow::Cow, sync::Arc};

use crate::{
    ff::FeatureFunction,
    phrase::{InputPath, Phrase, TargetPhraseCollection},
    score::FeatureId,
};

pub use group::{GroupOptions, PhraseDictionaryGroup};
pub use memory::{MemoryPhraseTable, MemoryTableOptions};

/// Index of a collection inside a [`PhraseArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectionHandle(usize);

/// Candidate collections built while translating one sentence.
///
/// Each slot remembers the table that created it so a table can release
/// exactly its own collections at the end of the sentence.
#[derive(Debug, Default)]
pub struct PhraseArena {
    slots: Vec<Option<(FeatureId, TargetPhraseCollection)>>,
}

impl PhraseArena {
    pub fn cache(&mut self, owner: FeatureId, collection: TargetPhraseCollection) -> CollectionHandle {
        self.slots.push(Some((owner, collection)));
        CollectionHandle(self.slots.len() - 1)
    }

    pub fn get(&self, handle: CollectionHandle) -> Option<&TargetPhraseCollection> {
        self.slots
            .get(handle.0)
            .and_then(|s| s.as_ref())
            .map(|(_, c)| c)
    }

    /// Drops every collection cached by `owner`; returns how many.
    pub fn release(&mut self, owner: FeatureId) -> usize {
        let mut n = 0;
        for slot in self.slots.iter_mut() {
            if matches!(slot, Some((id, _)) if *id == owner) {
                *slot = None;
                n += 1;
            }
        }
        n
    }

    /// Number of collections still held.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// A source of translation candidates.
pub trait PhraseTable: FeatureFunction {
    /// Maximum candidates kept per source phrase, 0 for no limit.
    fn table_limit(&self) -> usize;

    /// Lookup warm-up hook, called for every path before any
    /// [`PhraseTable::target_phrases`] call of a batch.
    fn prefix_exists(&self, _source: &Phrase) -> bool {
        true
    }

    /// Candidates for `source`, scored under this table's [`FeatureId`].
    fn target_phrases(&self, source: &Phrase) -> Option<Cow<'_, TargetPhraseCollection>>;

    /// Attaches candidates to every path; collections live in `arena` until
    /// [`PhraseTable::clean_up_after_sentence`].
    fn get_target_phrase_collection_batch(&self, arena: &mut PhraseArena, paths: &mut [InputPath]) {
        for path in paths.iter() {
            self.prefix_exists(&path.phrase);
        }
        for path in paths.iter_mut() {
            if let Some(collection) = self.target_phrases(&path.phrase) {
                let handle = arena.cache(self.id(), collection.into_owned());
                path.set_target_phrases(self.id(), handle);
            }
        }
    }

    fn clean_up_after_sentence(&self, arena: &mut PhraseArena) {
        arena.release(self.id());
    }
}

/// Tables by name; this is where groups resolve their members.
#[derive(Default, Clone)]
pub struct TableRegistry {
    tables: Vec<Arc<dyn PhraseTable>>,
}

impl TableRegistry {
    pub fn register(&mut self, table: Arc<dyn PhraseTable>) {
        self.tables.push(table);
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn PhraseTable>> {
        self.tables.iter().find(|t| t.name() == name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PhraseTable>> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
