// ==============================================================================
// Versioned snapshot cache
// ==============================================================================
//
// One entry per document holding the newest version that has finished
// analysis and, if that pass produced one, its snapshot. Every write goes
// through `commit`, which checks freshness, publishes and stores under a
// single lock acquisition so that two finishing workers can never interleave
// between the check and the write.
//
// Each `didOpen` starts a new session with its own generation. Results carry
// the generation they were computed for and are dropped once that session is
// closed or replaced, since a reopened document may restart its versions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::analysis::Snapshot;
use crate::state::{outdated, DocumentId, Generation, Version};

#[derive(Debug)]
struct Entry {
    /// Session of the document this entry belongs to.
    generation: Generation,
    open: bool,
    /// Newest version whose result was applied (with or without snapshot).
    latest: Option<Version>,
    snapshot: Option<Arc<Snapshot>>,
}

impl Entry {
    fn accepts(&self, generation: Generation) -> bool {
        self.open && self.generation == generation
    }
}

#[derive(Debug)]
pub enum CommitOutcome {
    Applied,
    /// The result lost to a newer version, or belongs to a session that has
    /// since been closed or reopened. Carries the stored snapshot when it is
    /// at least as new as the rejected one, so a waiting query can still
    /// answer.
    Superseded { newer: Option<Arc<Snapshot>> },
}

#[derive(Debug, Default)]
pub struct VersionedCache {
    entries: Mutex<HashMap<DocumentId, Entry>>,
    next_generation: AtomicU64,
}

impl VersionedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session for `doc`, discarding whatever an earlier session
    /// left behind. Results stamped with an older generation are rejected
    /// from now on, whatever their version.
    pub fn open(&self, doc: &DocumentId) -> Generation {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries.lock().insert(
            doc.clone(),
            Entry {
                generation,
                open: true,
                latest: None,
                snapshot: None,
            },
        );
        generation
    }

    /// End the current session of `doc`. Its snapshot is dropped and late
    /// results of the session are rejected.
    pub fn close(&self, doc: &DocumentId) {
        if let Some(entry) = self.entries.lock().get_mut(doc) {
            entry.open = false;
            entry.latest = None;
            entry.snapshot = None;
        }
    }

    pub fn get(&self, doc: &DocumentId) -> Option<Arc<Snapshot>> {
        self.entries.lock().get(doc)?.snapshot.clone()
    }

    /// The cached snapshot of session `generation`, unless it is older than
    /// `requested`.
    pub fn get_fresh(
        &self,
        doc: &DocumentId,
        generation: Generation,
        requested: Version,
    ) -> Option<Arc<Snapshot>> {
        let entries = self.entries.lock();
        let entry = entries.get(doc).filter(|entry| entry.accepts(generation))?;
        let snapshot = entry.snapshot.as_ref()?;
        if outdated(requested, snapshot.version) {
            return None;
        }
        Some(snapshot.clone())
    }

    pub fn latest_version(&self, doc: &DocumentId) -> Option<Version> {
        self.entries.lock().get(doc)?.latest
    }

    /// Apply the result of the pass for `version` of session `generation`.
    /// Skipped when a newer version already landed or the session is over;
    /// otherwise `publish` runs while the entry is still locked, so
    /// publications for one document follow version order. A `None`
    /// snapshot records the version without replacing the stored snapshot.
    pub fn commit(
        &self,
        doc: &DocumentId,
        generation: Generation,
        version: Version,
        snapshot: Option<Arc<Snapshot>>,
        publish: impl FnOnce(),
    ) -> CommitOutcome {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(doc).filter(|entry| entry.accepts(generation)) else {
            log::debug!("{doc}: dropping result for v{version:?} of a finished session");
            return CommitOutcome::Superseded { newer: None };
        };
        if let Some(latest) = entry.latest {
            if outdated(latest, version) {
                log::debug!("{doc}: dropping result for v{version:?}, v{latest:?} already landed");
                // The stored snapshot may predate `version` when the newer
                // passes failed to parse.
                let newer = entry
                    .snapshot
                    .clone()
                    .filter(|stored| !outdated(version, stored.version));
                return CommitOutcome::Superseded { newer };
            }
        }
        publish();
        entry.latest = Some(version);
        if snapshot.is_some() {
            entry.snapshot = snapshot;
        }
        CommitOutcome::Applied
    }

    pub fn remove(&self, doc: &DocumentId) -> bool {
        self.entries.lock().remove(doc).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
