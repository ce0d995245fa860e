//! Memory service facade.
//!
//! Owns the staging area, the committed store and the index, each behind its own
//! lock, and exposes the record-management and query API. Lock order is always
//! staging → store → index.
//!
//! Cross-subsystem steps (staging commit → store append → index update) are not
//! transactional. The index is a cache rebuilt from the store on open, so a crash
//! between steps never leaves it as the only copy of anything.

use crate::clock::{Clock, SystemClock};
use crate::config::MemoryConfig;
use crate::memory::error::MemoryError;
use crate::memory::index::MemoryIndex;
use crate::memory::stage::StagingArea;
use crate::memory::store::CommittedStore;
use crate::memory::types::{MemoryId, MemoryQuery, MemoryRecord, MemoryResult};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

pub struct MemoryService {
    config: MemoryConfig,
    clock: Arc<dyn Clock>,
    staging: Mutex<StagingArea>,
    store: Mutex<CommittedStore>,
    index: RwLock<MemoryIndex>,
}

fn poisoned(what: &str) -> MemoryError {
    MemoryError::Internal(format!("{} lock poisoned", what))
}

impl MemoryService {
    /// Open the service with the wall clock.
    pub fn open(config: MemoryConfig) -> Result<Self, MemoryError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open with default configuration rooted at `root`.
    pub fn open_at(root: impl AsRef<Path>) -> Result<Self, MemoryError> {
        Self::open(MemoryConfig::with_root(root.as_ref()))
    }

    /// Recover staging and store from disk and build the index from the store.
    pub fn open_with_clock(config: MemoryConfig, clock: Arc<dyn Clock>) -> Result<Self, MemoryError> {
        config.validate()?;

        let mut staging = StagingArea::open(&config.root)?;
        let store = CommittedStore::open(
            &config.root,
            config.decay_factor,
            config.journal_compact_threshold,
        )?;
        staging.ensure_next_id_at_least(store.next_id());

        let mut index = MemoryIndex::new(config.scoring);
        index.build_from_snapshot(store.records());

        log::info!(
            "[Memory] Service ready at {} ({} staged, {} committed)",
            config.root.display(),
            staging.state().staged.len(),
            store.len()
        );

        Ok(Self {
            config,
            clock,
            staging: Mutex::new(staging),
            store: Mutex::new(store),
            index: RwLock::new(index),
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    fn staging(&self) -> Result<MutexGuard<'_, StagingArea>, MemoryError> {
        self.staging.lock().map_err(|_| poisoned("staging"))
    }

    fn store(&self) -> Result<MutexGuard<'_, CommittedStore>, MemoryError> {
        self.store.lock().map_err(|_| poisoned("store"))
    }

    pub fn stage_add(&self, text: &str) -> Result<MemoryId, MemoryError> {
        let now = self.clock.now_ns();
        self.staging()?.add(text, now)
    }

    pub fn stage_edit(&self, id: MemoryId, text: &str) -> Result<(), MemoryError> {
        let now = self.clock.now_ns();
        self.staging()?.edit(id, text, now)
    }

    pub fn stage_list(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(self.staging()?.list())
    }

    /// Promote staged records into the store and the index. Empty if nothing was staged.
    pub fn stage_commit(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        let mut staging = self.staging()?;
        let committed = staging.commit()?;
        if committed.is_empty() {
            return Ok(committed);
        }

        if let Err(e) = self.store()?.append_committed(&committed) {
            log::error!(
                "[Memory] Staged commit of {} records did not reach the store: {}",
                committed.len(),
                e
            );
            return Err(e);
        }
        self.index
            .write()
            .map_err(|_| poisoned("index"))?
            .update_on_commit(&committed);

        log::info!("[Memory] Committed {} records", committed.len());
        Ok(committed)
    }

    pub fn stage_discard(&self) -> Result<(), MemoryError> {
        self.staging()?.discard()
    }

    /// Rank committed records against `query`; at most `query.limit` results.
    pub fn store_query(&self, query: &MemoryQuery) -> Result<Vec<MemoryResult>, MemoryError> {
        let now = self.clock.now_ns();
        let store = self.store()?;
        let index = self.index.read().map_err(|_| poisoned("index"))?;
        let results = index.query(query, now, |id| store.get(id));
        log::debug!(
            "[Memory] Query '{}' (limit {}) returned {} results",
            query.text,
            query.limit,
            results.len()
        );
        Ok(results)
    }

    pub fn reinforce(&self, id: MemoryId, delta: f32) -> Result<(), MemoryError> {
        let now = self.clock.now_ns();
        self.store()?.reinforce(id, delta, now)
    }

    pub fn decay_sweep(&self) -> Result<(), MemoryError> {
        let now = self.clock.now_ns();
        self.store()?.decay_sweep(now)
    }

    /// Snapshot the committed store and truncate its journal.
    pub fn checkpoint(&self) -> Result<(), MemoryError> {
        self.store()?.checkpoint()
    }

    /// Rebuild the index from the committed store.
    pub fn rebuild_index(&self) -> Result<(), MemoryError> {
        let store = self.store()?;
        self.index
            .write()
            .map_err(|_| poisoned("index"))?
            .build_from_snapshot(store.records());
        Ok(())
    }

    pub fn committed_records(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(self.store()?.records().to_vec())
    }

    pub fn committed_record(&self, id: MemoryId) -> Result<Option<MemoryRecord>, MemoryError> {
        Ok(self.store()?.get(id).cloned())
    }

    pub fn committed_len(&self) -> Result<usize, MemoryError> {
        Ok(self.store()?.len())
    }
}
