//! Committed store: the authoritative record list.
//!
//! Persistence:
//! - `memory.snapshot.json`: `{"next_id":N,"records":[...]}`, records sorted by id,
//!   written through a temp file and an atomic rename.
//! - `memory.journal.jsonl`: one record per line, appended since the last snapshot.
//!   Replay upserts by id, so a later line for the same id wins and replaying the
//!   same journal twice converges to the same state.
//!
//! Reinforcement appends the updated record to the journal; a decay sweep rewrites
//! the snapshot and truncates the journal. Both apply in memory only after the
//! write succeeded.

use crate::memory::error::MemoryError;
use crate::memory::persist;
use crate::memory::types::{MemoryId, MemoryRecord};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const STORE_SNAPSHOT_FILE: &str = "memory.snapshot.json";
pub const STORE_JOURNAL_FILE: &str = "memory.journal.jsonl";

/// Committed records (sorted by id, unique) plus the next-id watermark.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommittedState {
    pub next_id: u64,
    pub records: Vec<MemoryRecord>,
}

impl Default for CommittedState {
    fn default() -> Self {
        Self {
            next_id: 1,
            records: Vec::new(),
        }
    }
}

impl CommittedState {
    fn from_map(next_id: u64, map: BTreeMap<MemoryId, MemoryRecord>) -> Self {
        let next_id = map
            .keys()
            .next_back()
            .map(|id| next_id.max(id.successor()))
            .unwrap_or(next_id);
        Self {
            next_id,
            records: map.into_values().collect(),
        }
    }

    fn into_map(self) -> BTreeMap<MemoryId, MemoryRecord> {
        self.records.into_iter().map(|r| (r.id, r)).collect()
    }

    fn position(&self, id: MemoryId) -> Option<usize> {
        self.records.binary_search_by_key(&id, |r| r.id).ok()
    }

    /// Insert or replace a record, keeping the list sorted and the watermark ahead.
    fn upsert(&mut self, record: MemoryRecord) {
        self.next_id = self.next_id.max(record.id.successor());
        match self.records.binary_search_by_key(&record.id, |r| r.id) {
            Ok(pos) => self.records[pos] = record,
            Err(pos) => self.records.insert(pos, record),
        }
    }
}

fn decode_record(value: Value) -> Result<MemoryRecord, String> {
    let record: MemoryRecord = serde_json::from_value(value).map_err(|e| e.to_string())?;
    record.validate()?;
    Ok(record)
}

/// Load `memory.snapshot.json` from `root`. Missing file → empty state.
///
/// Individual malformed records are skipped; an unparsable document is treated
/// as empty. Both cases are logged.
pub fn load_snapshot(root: &Path) -> Result<CommittedState, MemoryError> {
    let path = root.join(STORE_SNAPSHOT_FILE);
    let content = match persist::read_optional(&path)? {
        Some(content) => content,
        None => return Ok(CommittedState::default()),
    };

    let doc = match serde_json::from_str::<Value>(&content) {
        Ok(doc @ Value::Object(_)) => doc,
        _ => {
            log::warn!(
                "[MemoryStore] Snapshot {} malformed; using empty snapshot",
                path.display()
            );
            return Ok(CommittedState::default());
        }
    };

    let next_id = match doc.get("next_id").and_then(Value::as_u64) {
        Some(n) => n.max(1),
        None => {
            log::warn!(
                "[MemoryStore] Snapshot {} missing next_id; defaulting to 1",
                path.display()
            );
            1
        }
    };

    let mut map = BTreeMap::new();
    if let Some(Value::Array(items)) = doc.get("records") {
        for item in items {
            match decode_record(item.clone()) {
                Ok(record) => {
                    map.insert(record.id, record);
                }
                Err(e) => log::warn!("[MemoryStore] Snapshot record malformed; skipped ({})", e),
            }
        }
    }
    Ok(CommittedState::from_map(next_id, map))
}

/// Atomically replace `memory.snapshot.json` with `state` (records sorted by id).
pub fn save_snapshot(root: &Path, state: &CommittedState) -> Result<(), MemoryError> {
    let mut sorted = state.clone();
    sorted.records.sort_by_key(|r| r.id);
    persist::write_json_atomic(&root.join(STORE_SNAPSHOT_FILE), &sorted)
}

/// Append one record per line to `memory.journal.jsonl`, in id order.
pub fn append_journal(root: &Path, records: &[MemoryRecord]) -> Result<usize, MemoryError> {
    let mut sorted: Vec<&MemoryRecord> = records.iter().collect();
    sorted.sort_by_key(|r| r.id);
    persist::append_json_lines(&root.join(STORE_JOURNAL_FILE), sorted)
}

/// Load the snapshot and replay the journal on top of it.
pub fn rebuild_state(root: &Path) -> Result<CommittedState, MemoryError> {
    Ok(rebuild_with_journal_len(root)?.0)
}

fn rebuild_with_journal_len(root: &Path) -> Result<(CommittedState, usize), MemoryError> {
    let snapshot = load_snapshot(root)?;
    let next_id = snapshot.next_id;
    let mut map = snapshot.into_map();

    let journal_path = root.join(STORE_JOURNAL_FILE);
    let lines = persist::read_journal_lines(&journal_path)?;
    let journal_len = lines.len();
    for (line_no, line) in lines {
        let parsed = serde_json::from_str::<Value>(&line)
            .map_err(|e| e.to_string())
            .and_then(decode_record);
        match parsed {
            Ok(record) => {
                map.insert(record.id, record);
            }
            Err(e) => log::warn!(
                "[MemoryStore] Journal entry {}:{} malformed; skipped ({})",
                journal_path.display(),
                line_no,
                e
            ),
        }
    }
    Ok((CommittedState::from_map(next_id, map), journal_len))
}

/// Durable committed-record store rooted at a directory.
///
/// Not internally synchronized; the facade serializes access through one lock.
#[derive(Debug)]
pub struct CommittedStore {
    root: PathBuf,
    state: CommittedState,
    decay_factor: f32,
    compact_threshold: usize,
    journal_len: usize,
}

impl CommittedStore {
    pub fn open(
        root: impl Into<PathBuf>,
        decay_factor: f32,
        compact_threshold: usize,
    ) -> Result<Self, MemoryError> {
        let root = root.into();
        persist::ensure_dir(&root)?;
        let (state, journal_len) = rebuild_with_journal_len(&root)?;
        log::info!(
            "[MemoryStore] Opened {} ({} records, {} journal lines, next id {})",
            root.display(),
            state.records.len(),
            journal_len,
            state.next_id
        );
        Ok(Self {
            root,
            state,
            decay_factor,
            compact_threshold,
            journal_len,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> &CommittedState {
        &self.state
    }

    pub fn records(&self) -> &[MemoryRecord] {
        &self.state.records
    }

    pub fn get(&self, id: MemoryId) -> Option<&MemoryRecord> {
        self.state.position(id).map(|pos| &self.state.records[pos])
    }

    pub fn len(&self) -> usize {
        self.state.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.records.is_empty()
    }

    pub fn next_id(&self) -> u64 {
        self.state.next_id
    }

    /// Lines appended to the journal since the last snapshot.
    pub fn journal_len(&self) -> usize {
        self.journal_len
    }

    fn append(&mut self, records: &[MemoryRecord]) -> Result<(), MemoryError> {
        self.journal_len += append_journal(&self.root, records)?;
        Ok(())
    }

    /// Add newly committed records. Each id must be new to the store.
    pub fn append_committed(&mut self, records: &[MemoryRecord]) -> Result<(), MemoryError> {
        if records.is_empty() {
            return Ok(());
        }
        for record in records {
            assert!(
                self.state.position(record.id).is_none(),
                "memory id {} promoted into the store twice",
                record.id
            );
        }
        self.append(records)?;
        for record in records {
            self.state.upsert(record.clone());
        }
        log::info!("[MemoryStore] Appended {} committed records", records.len());
        self.maybe_compact();
        Ok(())
    }

    /// `strength = max(0, strength + delta)` and refresh `updated_ns`.
    pub fn reinforce(&mut self, id: MemoryId, delta: f32, now_ns: u64) -> Result<(), MemoryError> {
        if !id.is_valid() {
            return Err(MemoryError::InvalidArgument("memory id invalid".to_string()));
        }
        if !delta.is_finite() {
            return Err(MemoryError::InvalidArgument(format!(
                "reinforcement delta must be finite (got {})",
                delta
            )));
        }
        let mut updated = match self.get(id) {
            Some(record) => record.clone(),
            None => return Err(MemoryError::NotFound(format!("stored memory {} not found", id))),
        };
        updated.strength = (updated.strength + delta).max(0.0);
        updated.updated_ns = now_ns;

        self.append(std::slice::from_ref(&updated))?;
        let strength = updated.strength;
        self.state.upsert(updated);
        log::info!("[MemoryStore] Reinforced memory {} to strength {:.4}", id, strength);
        self.maybe_compact();
        Ok(())
    }

    /// Multiply every strength by the decay factor and refresh `updated_ns`.
    pub fn decay_sweep(&mut self, now_ns: u64) -> Result<(), MemoryError> {
        if self.state.records.is_empty() {
            log::debug!("[MemoryStore] No stored records to decay");
            return Ok(());
        }
        let mut decayed = self.state.clone();
        for record in &mut decayed.records {
            record.strength = (record.strength * self.decay_factor).max(0.0);
            record.updated_ns = now_ns;
        }
        self.write_checkpoint(&decayed)?;
        self.state = decayed;
        log::info!(
            "[MemoryStore] Decayed {} stored memory records by {}",
            self.state.records.len(),
            self.decay_factor
        );
        Ok(())
    }

    /// Snapshot the current state and truncate the journal.
    pub fn checkpoint(&mut self) -> Result<(), MemoryError> {
        let state = self.state.clone();
        self.write_checkpoint(&state)?;
        log::info!(
            "[MemoryStore] Checkpointed {} records at next id {}",
            self.state.records.len(),
            self.state.next_id
        );
        Ok(())
    }

    fn write_checkpoint(&mut self, state: &CommittedState) -> Result<(), MemoryError> {
        save_snapshot(&self.root, state)?;
        persist::truncate(&self.root.join(STORE_JOURNAL_FILE))?;
        self.journal_len = 0;
        Ok(())
    }

    /// Checkpoint once the journal reaches the threshold. Runs after a change is
    /// already durable, so a failure is logged and the journal is kept.
    fn maybe_compact(&mut self) {
        if self.compact_threshold == 0 || self.journal_len < self.compact_threshold {
            return;
        }
        log::debug!(
            "[MemoryStore] Journal reached {} lines; compacting",
            self.journal_len
        );
        if let Err(e) = self.checkpoint() {
            log::warn!(
                "[MemoryStore] Compaction failed; journal kept ({} lines): {}",
                self.journal_len,
                e
            );
        }
    }
}
