use std::collections::BTreeMap;

use crate::collaborators::ProcessingTaggerTrait;
use crate::logger::{LogEvent, Logger};
use crate::types::EntityKey;
use crate::warnln;

/// Where an entity stands within one multi-window run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    /// Still waiting for a window with enough data
    Unprocessed,
    /// Claimed by a window, later windows leave it alone
    Evaluated,
}

/// Processing marks owned by the orchestrator for the duration of one run
///
/// The in-memory map is authoritative. A tagger, when given, mirrors every
/// change so the marks can be inspected outside the process; its failures are
/// only logged.
pub struct ProcessingMarks<'a> {
    states: BTreeMap<EntityKey, ProcessingState>,
    tagger: Option<&'a mut dyn ProcessingTaggerTrait>,
}

impl<'a> ProcessingMarks<'a> {
    pub fn new(tagger: Option<&'a mut dyn ProcessingTaggerTrait>) -> Self {
        Self {
            states: BTreeMap::new(),
            tagger,
        }
    }

    /// Mark every in-scope entity as unprocessed
    pub fn mark_all(&mut self, keys: &[EntityKey], logger: &mut Logger) {
        for key in keys {
            self.states.insert(*key, ProcessingState::Unprocessed);
        }

        if let Some(tagger) = self.tagger.as_mut() {
            // leftovers of a run that never reached its cleanup
            let stale: Vec<EntityKey> = keys.iter().copied().filter(|key| tagger.is_marked(key)).collect();
            if !stale.is_empty() {
                warnln!(logger, LogEvent::Pass, "{} entities still carried a processing mark from an earlier run", stale.len());
                if let Err(e) = tagger.clear_processing(&stale) {
                    warnln!(logger, LogEvent::Pass, "{}", e);
                }
            }
            if let Err(e) = tagger.mark_processing(keys) {
                warnln!(logger, LogEvent::Pass, "{}", e);
            }
        }
    }

    pub fn state(&self, key: &EntityKey) -> Option<ProcessingState> {
        self.states.get(key).copied()
    }

    pub fn is_marked(&self, key: &EntityKey) -> bool {
        self.state(key) == Some(ProcessingState::Unprocessed)
    }

    /// Clear the mark of an entity; false if it was not marked
    pub fn claim(&mut self, key: &EntityKey, logger: &mut Logger) -> bool {
        if !self.is_marked(key) {
            return false;
        }
        self.states.insert(*key, ProcessingState::Evaluated);
        if let Some(tagger) = self.tagger.as_mut() {
            if let Err(e) = tagger.clear_processing(std::slice::from_ref(key)) {
                warnln!(logger, LogEvent::Entity, "{}", e);
            }
        }
        true
    }

    /// Entities still marked, in key order
    pub fn unprocessed(&self) -> Vec<EntityKey> {
        self.states
            .iter()
            .filter(|(_, state)| **state == ProcessingState::Unprocessed)
            .map(|(key, _)| *key)
            .collect()
    }

    /// End of run: drop every remaining mark and return the entities that never got claimed
    pub fn sweep(&mut self, logger: &mut Logger) -> Vec<EntityKey> {
        let remaining = self.unprocessed();
        if let Some(tagger) = self.tagger.as_mut() {
            if !remaining.is_empty() {
                if let Err(e) = tagger.clear_processing(&remaining) {
                    warnln!(logger, LogEvent::Pass, "{}", e);
                }
            }
        }
        self.states.clear();
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory_account::InMemoryTagger;

    #[test]
    fn test_claim_is_exclusive() {
        let mut logger = Logger::new();
        let mut marks = ProcessingMarks::new(None);
        let key = EntityKey::new(1, 1);
        marks.mark_all(&[key], &mut logger);

        assert!(marks.claim(&key, &mut logger));
        assert!(!marks.claim(&key, &mut logger));
        assert_eq!(marks.state(&key), Some(ProcessingState::Evaluated));
        assert!(!marks.is_marked(&key));
    }

    #[test]
    fn test_sweep_returns_unclaimed_and_clears() {
        let mut logger = Logger::new();
        let mut marks = ProcessingMarks::new(None);
        let keys = [EntityKey::new(1, 1), EntityKey::new(1, 2), EntityKey::new(2, 1)];
        marks.mark_all(&keys, &mut logger);
        marks.claim(&keys[1], &mut logger);

        assert_eq!(marks.sweep(&mut logger), vec![keys[0], keys[2]]);
        assert!(marks.unprocessed().is_empty());
        assert_eq!(marks.state(&keys[0]), None);
    }

    #[test]
    fn test_tagger_mirrors_marks() {
        let mut logger = Logger::new();
        let mut tagger = InMemoryTagger::default();
        let keys = [EntityKey::new(1, 1), EntityKey::new(1, 2)];
        {
            let mut marks = ProcessingMarks::new(Some(&mut tagger));
            marks.mark_all(&keys, &mut logger);
            marks.claim(&keys[0], &mut logger);
        }
        assert!(!tagger.is_marked(&keys[0]));
        assert!(tagger.is_marked(&keys[1]));

        // a new run starts from the leftover mark and sweeps everything
        {
            let mut marks = ProcessingMarks::new(Some(&mut tagger));
            marks.mark_all(&keys, &mut logger);
            marks.sweep(&mut logger);
        }
        assert!(tagger.tags.is_empty());
    }

    #[test]
    fn test_failing_tagger_does_not_affect_marks() {
        let mut logger = Logger::new();
        let mut tagger = InMemoryTagger { fail: true, ..InMemoryTagger::default() };
        let key = EntityKey::new(3, 4);
        let mut marks = ProcessingMarks::new(Some(&mut tagger));
        marks.mark_all(&[key], &mut logger);
        assert!(marks.is_marked(&key));
        assert!(marks.claim(&key, &mut logger));
    }
}
