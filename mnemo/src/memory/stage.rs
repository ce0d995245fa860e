//! Staging area: durable pre-commit editing buffer.
//!
//! Persistence:
//! - `memory.staging.jsonl`: one patch per line (`add`/`edit`/`discard`/`commit`),
//!   appended before the matching in-memory change is applied.
//! - `memory.staging.snapshot.json`: full staging state, rewritten atomically after
//!   every commit and discard, followed by a journal truncation.
//!
//! Recovery loads the snapshot and replays the journal in file order. Malformed
//! lines and patches that no longer apply are logged and skipped.
//!
//! Unit tests are colocated at the bottom of this file.

use crate::memory::error::MemoryError;
use crate::memory::persist;
use crate::memory::types::{MemoryId, MemoryRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub const STAGING_SNAPSHOT_FILE: &str = "memory.staging.snapshot.json";
pub const STAGING_JOURNAL_FILE: &str = "memory.staging.jsonl";

/// One line of the staging journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum StagePatch {
    Add { record: MemoryRecord },
    Edit { record: MemoryRecord },
    Discard { ids: Vec<MemoryId> },
    Commit { ids: Vec<MemoryId> },
}

impl StagePatch {
    fn validate(&self) -> Result<(), String> {
        match self {
            StagePatch::Add { record } | StagePatch::Edit { record } => record.validate(),
            StagePatch::Discard { ids } | StagePatch::Commit { ids } => {
                if ids.iter().any(|id| !id.is_valid()) {
                    Err("patch references id 0".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Not-yet-committed records, the ids already promoted, and the id counter.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingState {
    pub staged: BTreeMap<MemoryId, MemoryRecord>,
    pub committed: BTreeSet<MemoryId>,
    pub next_id: u64,
}

impl Default for StagingState {
    fn default() -> Self {
        Self {
            staged: BTreeMap::new(),
            committed: BTreeSet::new(),
            next_id: 1,
        }
    }
}

impl StagingState {
    /// Apply a patch to the in-memory state. Used both live and during replay.
    pub fn apply(&mut self, patch: &StagePatch) -> Result<(), MemoryError> {
        match patch {
            StagePatch::Add { record } => {
                if self.committed.contains(&record.id) {
                    return Err(MemoryError::AlreadyCommitted(format!(
                        "memory {} already committed",
                        record.id
                    )));
                }
                if self.staged.contains_key(&record.id) {
                    return Err(MemoryError::InvalidArgument(format!(
                        "memory {} already staged",
                        record.id
                    )));
                }
                self.next_id = self.next_id.max(record.id.successor());
                self.staged.insert(record.id, record.clone());
                Ok(())
            }
            StagePatch::Edit { record } => {
                if self.committed.contains(&record.id) {
                    return Err(MemoryError::AlreadyCommitted(format!(
                        "memory {} already committed",
                        record.id
                    )));
                }
                match self.staged.get_mut(&record.id) {
                    Some(existing) => {
                        *existing = record.clone();
                        Ok(())
                    }
                    None => Err(MemoryError::NotFound(format!(
                        "staged memory {} not found",
                        record.id
                    ))),
                }
            }
            StagePatch::Discard { ids } => {
                for id in ids {
                    if self.committed.contains(id) {
                        return Err(MemoryError::AlreadyCommitted(format!(
                            "memory {} already committed",
                            id
                        )));
                    }
                    if self.staged.remove(id).is_none() {
                        return Err(MemoryError::NotFound(format!(
                            "staged memory {} not found",
                            id
                        )));
                    }
                }
                Ok(())
            }
            StagePatch::Commit { ids } => {
                for id in ids {
                    if self.committed.contains(id) {
                        log::warn!("[MemoryStage] Commit ignored for already committed id {}", id);
                        continue;
                    }
                    if self.staged.remove(id).is_none() {
                        return Err(MemoryError::NotFound(format!(
                            "staged memory {} not found",
                            id
                        )));
                    }
                    self.committed.insert(*id);
                }
                Ok(())
            }
        }
    }

    fn to_snapshot(&self) -> StagingSnapshot {
        StagingSnapshot {
            next_id: self.next_id,
            staged: self.staged.values().cloned().collect(),
            committed: self.committed.iter().copied().collect(),
        }
    }
}

/// On-disk shape of `memory.staging.snapshot.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct StagingSnapshot {
    next_id: u64,
    staged: Vec<MemoryRecord>,
    committed: Vec<MemoryId>,
}

/// Decode a staging snapshot leniently: bad entries are skipped, a bad document
/// yields an empty state.
fn decode_snapshot(content: &str, path: &Path) -> StagingState {
    let doc: Value = match serde_json::from_str(content) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(_) | Err(_) => {
            log::warn!(
                "[MemoryStage] Snapshot {} malformed; using empty staging state",
                path.display()
            );
            return StagingState::default();
        }
    };

    let mut state = StagingState::default();
    match doc.get("next_id").and_then(Value::as_u64) {
        Some(next_id) => state.next_id = next_id.max(1),
        None => log::warn!(
            "[MemoryStage] Snapshot {} missing next_id; defaulting to 1",
            path.display()
        ),
    }

    if let Some(items) = doc.get("staged").and_then(Value::as_array) {
        for item in items {
            match serde_json::from_value::<MemoryRecord>(item.clone())
                .map_err(|e| e.to_string())
                .and_then(|r| r.validate().map(|_| r))
            {
                Ok(record) => {
                    state.next_id = state.next_id.max(record.id.successor());
                    state.staged.insert(record.id, record);
                }
                Err(e) => log::warn!("[MemoryStage] Snapshot record skipped: {}", e),
            }
        }
    }

    if let Some(items) = doc.get("committed").and_then(Value::as_array) {
        for item in items {
            match item.as_u64().filter(|v| *v != 0) {
                Some(id) => {
                    state.committed.insert(MemoryId(id));
                }
                None => log::warn!("[MemoryStage] Snapshot committed id skipped: {}", item),
            }
        }
    }

    state
}

/// Durable staging buffer rooted at a directory.
///
/// Not internally synchronized; the facade serializes access through one lock.
#[derive(Debug)]
pub struct StagingArea {
    root: PathBuf,
    state: StagingState,
}

impl StagingArea {
    /// Recover the staging area from `root`: snapshot first, then journal replay.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let root = root.into();
        persist::ensure_dir(&root)?;
        let state = Self::recover(&root)?;
        log::info!(
            "[MemoryStage] Opened {} ({} staged, {} committed, next id {})",
            root.display(),
            state.staged.len(),
            state.committed.len(),
            state.next_id
        );
        Ok(Self { root, state })
    }

    fn recover(root: &Path) -> Result<StagingState, MemoryError> {
        let snapshot_path = root.join(STAGING_SNAPSHOT_FILE);
        let mut state = match persist::read_optional(&snapshot_path)? {
            Some(content) => decode_snapshot(&content, &snapshot_path),
            None => StagingState::default(),
        };

        let journal_path = root.join(STAGING_JOURNAL_FILE);
        for (line_no, line) in persist::read_journal_lines(&journal_path)? {
            let patch = match serde_json::from_str::<StagePatch>(&line)
                .map_err(|e| e.to_string())
                .and_then(|p| p.validate().map(|_| p))
            {
                Ok(patch) => patch,
                Err(e) => {
                    log::warn!(
                        "[MemoryStage] Journal entry {}:{} malformed; skipped ({})",
                        journal_path.display(),
                        line_no,
                        e
                    );
                    continue;
                }
            };
            if let Err(e) = state.apply(&patch) {
                log::warn!(
                    "[MemoryStage] Journal entry {}:{} not applied: {}",
                    journal_path.display(),
                    line_no,
                    e
                );
            }
        }
        Ok(state)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> &StagingState {
        &self.state
    }

    pub fn next_id(&self) -> u64 {
        self.state.next_id
    }

    /// Raise the id counter to at least `watermark`. Never lowers it.
    pub fn ensure_next_id_at_least(&mut self, watermark: u64) {
        if watermark > self.state.next_id {
            log::info!(
                "[MemoryStage] Raising next id from {} to {}",
                self.state.next_id,
                watermark
            );
            self.state.next_id = watermark;
        }
    }

    fn journal_path(&self) -> PathBuf {
        self.root.join(STAGING_JOURNAL_FILE)
    }

    /// Journal the patch, then apply it. Nothing changes in memory if the append fails.
    fn record_patch(&mut self, patch: StagePatch) -> Result<(), MemoryError> {
        persist::append_json_lines(&self.journal_path(), std::iter::once(&patch))?;
        self.state.apply(&patch)
    }

    fn checkpoint(&self) -> Result<(), MemoryError> {
        persist::write_json_atomic(&self.root.join(STAGING_SNAPSHOT_FILE), &self.state.to_snapshot())?;
        persist::truncate(&self.journal_path())
    }

    /// Checkpoint after a journaled commit or discard. The patch is already
    /// durable, so a failure only leaves a longer journal to replay.
    fn checkpoint_after(&self, op: &str) {
        if let Err(e) = self.checkpoint() {
            log::warn!(
                "[MemoryStage] Checkpoint after {} failed; journal kept for replay: {}",
                op,
                e
            );
        }
    }

    /// Stage a new record and return its id.
    pub fn add(&mut self, text: &str, now_ns: u64) -> Result<MemoryId, MemoryError> {
        if text.is_empty() {
            return Err(MemoryError::InvalidArgument("memory text empty".to_string()));
        }
        let id = MemoryId(self.state.next_id);
        assert!(id.is_valid(), "generated memory id is invalid");
        assert!(
            !self.state.staged.contains_key(&id) && !self.state.committed.contains(&id),
            "id generator produced already-used id {}",
            id
        );

        let record = MemoryRecord::new(id, text, now_ns);
        self.record_patch(StagePatch::Add { record })?;
        log::info!("[MemoryStage] Staged new memory record {}", id);
        Ok(id)
    }

    /// Replace the text of a staged record.
    pub fn edit(&mut self, id: MemoryId, text: &str, now_ns: u64) -> Result<(), MemoryError> {
        if !id.is_valid() {
            return Err(MemoryError::InvalidArgument("memory id invalid".to_string()));
        }
        if text.is_empty() {
            return Err(MemoryError::InvalidArgument("memory text empty".to_string()));
        }
        let mut record = match self.state.staged.get(&id) {
            Some(record) => record.clone(),
            None if self.state.committed.contains(&id) => {
                return Err(MemoryError::AlreadyCommitted(format!(
                    "memory {} already committed",
                    id
                )))
            }
            None => return Err(MemoryError::NotFound(format!("staged memory {} not found", id))),
        };
        record.text = text.to_string();
        record.updated_ns = now_ns;

        self.record_patch(StagePatch::Edit { record })?;
        log::info!("[MemoryStage] Updated staged memory record {}", id);
        Ok(())
    }

    /// Staged records ordered by id.
    pub fn list(&self) -> Vec<MemoryRecord> {
        self.state.staged.values().cloned().collect()
    }

    /// Promote every staged record. Returns them in id order; empty if nothing is staged.
    pub fn commit(&mut self) -> Result<Vec<MemoryRecord>, MemoryError> {
        if self.state.staged.is_empty() {
            log::debug!("[MemoryStage] No staged records to commit");
            return Ok(Vec::new());
        }
        let records = self.list();
        let ids = records.iter().map(|r| r.id).collect();
        self.record_patch(StagePatch::Commit { ids })?;
        self.checkpoint_after("commit");
        log::info!("[MemoryStage] Committed {} staged memory records", records.len());
        Ok(records)
    }

    /// Drop every staged record. Ids are not reused afterwards.
    pub fn discard(&mut self) -> Result<(), MemoryError> {
        if self.state.staged.is_empty() {
            log::debug!("[MemoryStage] No staged records to discard");
            return Ok(());
        }
        let ids: Vec<MemoryId> = self.state.staged.keys().copied().collect();
        let count = ids.len();
        self.record_patch(StagePatch::Discard { ids })?;
        self.checkpoint_after("discard");
        log::info!("[MemoryStage] Discarded {} staged memory records", count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::error::MemoryErrorKind;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_patch_wire_format() {
        let add = StagePatch::Add {
            record: MemoryRecord::new(MemoryId(1), "a", 5),
        };
        let line = serde_json::to_string(&add).unwrap();
        assert!(line.starts_with(r#"{"op":"add","record":{"id":1,"#));

        let commit = StagePatch::Commit {
            ids: vec![MemoryId(1), MemoryId(2)],
        };
        assert_eq!(
            serde_json::to_string(&commit).unwrap(),
            r#"{"op":"commit","ids":[1,2]}"#
        );
        let parsed: StagePatch = serde_json::from_str(r#"{"ids":[3],"op":"discard"}"#).unwrap();
        assert_eq!(parsed, StagePatch::Discard { ids: vec![MemoryId(3)] });
    }

    #[test]
    fn test_add_edit_list_commit_cycle() {
        let dir = tempdir().unwrap();
        let mut stage = StagingArea::open(dir.path()).unwrap();

        let id = stage.add("alpha one", 100).unwrap();
        assert_eq!(id, MemoryId(1));
        stage.edit(id, "alpha one edited", 200).unwrap();

        let listed = stage.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].text, "alpha one edited");
        assert_eq!(listed[0].created_ns, 100);
        assert_eq!(listed[0].updated_ns, 200);

        let committed = stage.commit().unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].id, id);
        assert!(stage.list().is_empty());

        let err = stage.edit(id, "again", 300).unwrap_err();
        assert_eq!(err.kind(), MemoryErrorKind::AlreadyCommitted);
    }

    #[test]
    fn test_live_validation() {
        let dir = tempdir().unwrap();
        let mut stage = StagingArea::open(dir.path()).unwrap();
        assert_eq!(stage.add("", 1).unwrap_err().kind(), MemoryErrorKind::InvalidArgument);
        assert_eq!(
            stage.edit(MemoryId(0), "x", 1).unwrap_err().kind(),
            MemoryErrorKind::InvalidArgument
        );
        assert_eq!(
            stage.edit(MemoryId(9), "x", 1).unwrap_err().kind(),
            MemoryErrorKind::NotFound
        );
        let id = stage.add("x", 1).unwrap();
        assert_eq!(stage.edit(id, "", 1).unwrap_err().kind(), MemoryErrorKind::InvalidArgument);
    }

    #[test]
    fn test_commit_and_discard_on_empty_are_noops() {
        let dir = tempdir().unwrap();
        let mut stage = StagingArea::open(dir.path()).unwrap();
        assert!(stage.commit().unwrap().is_empty());
        stage.discard().unwrap();
        assert!(!dir.path().join(STAGING_JOURNAL_FILE).exists());
        assert!(!dir.path().join(STAGING_SNAPSHOT_FILE).exists());
    }

    #[test]
    fn test_discard_never_reuses_ids() {
        let dir = tempdir().unwrap();
        let mut stage = StagingArea::open(dir.path()).unwrap();
        let a = stage.add("a", 1).unwrap();
        stage.discard().unwrap();
        let b = stage.add("b", 2).unwrap();
        assert!(b > a);

        drop(stage);
        let mut reopened = StagingArea::open(dir.path()).unwrap();
        let c = reopened.add("c", 3).unwrap();
        assert!(c > b);
    }

    #[test]
    fn test_recovery_replays_journal_after_snapshot() {
        let dir = tempdir().unwrap();
        {
            let mut stage = StagingArea::open(dir.path()).unwrap();
            stage.add("first", 1).unwrap();
            stage.commit().unwrap();
            stage.add("second", 2).unwrap();
            let third = stage.add("third", 3).unwrap();
            stage.edit(third, "third edited", 4).unwrap();
        }
        let stage = StagingArea::open(dir.path()).unwrap();
        let texts: Vec<String> = stage.list().into_iter().map(|r| r.text).collect();
        assert_eq!(texts, vec!["second".to_string(), "third edited".to_string()]);
        assert!(stage.state().committed.contains(&MemoryId(1)));
        assert_eq!(stage.next_id(), 4);
    }

    #[test]
    fn test_checkpoint_truncates_journal() {
        let dir = tempdir().unwrap();
        let mut stage = StagingArea::open(dir.path()).unwrap();
        stage.add("a", 1).unwrap();
        stage.commit().unwrap();
        let journal = fs::read_to_string(dir.path().join(STAGING_JOURNAL_FILE)).unwrap();
        assert!(journal.is_empty());
        let snapshot: Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join(STAGING_SNAPSHOT_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(snapshot["next_id"], 2);
        assert_eq!(snapshot["committed"], serde_json::json!([1]));
        assert_eq!(snapshot["staged"], serde_json::json!([]));
    }

    #[test]
    fn test_malformed_journal_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let journal = dir.path().join(STAGING_JOURNAL_FILE);
        fs::write(
            &journal,
            concat!(
                r#"{"op":"add","record":{"id":1,"text":"ok","created_ns":1,"updated_ns":1,"strength":1.0}}"#,
                "\n",
                "{not json\n",
                r#"{"op":"add","record":{"id":2,"text":"no strength","created_ns":1,"updated_ns":1}}"#,
                "\n",
                r#"{"op":"explode","ids":[1]}"#,
                "\n",
                r#"{"op":"edit","record":{"id":7,"text":"missing","created_ns":1,"updated_ns":1,"strength":1.0}}"#,
                "\n",
            ),
        )
        .unwrap();

        let stage = StagingArea::open(dir.path()).unwrap();
        let ids: Vec<MemoryId> = stage.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![MemoryId(1)]);
        assert_eq!(stage.next_id(), 2);
    }

    #[test]
    fn test_replaying_journal_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        {
            let mut stage = StagingArea::open(dir.path()).unwrap();
            let a = stage.add("a", 1).unwrap();
            stage.add("b", 2).unwrap();
            stage.edit(a, "a2", 3).unwrap();
        }
        let once = StagingArea::open(dir.path()).unwrap().state().clone();

        let journal = dir.path().join(STAGING_JOURNAL_FILE);
        let content = fs::read_to_string(&journal).unwrap();
        fs::write(&journal, format!("{}{}", content, content)).unwrap();
        let twice = StagingArea::open(dir.path()).unwrap().state().clone();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_malformed_snapshot_entries_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(STAGING_SNAPSHOT_FILE),
            r#"{"next_id":5,"staged":[{"id":3,"text":"kept","created_ns":1,"updated_ns":1,"strength":1.0},{"id":4}],"committed":[1,"x",2],"extra":true}"#,
        )
        .unwrap();
        let stage = StagingArea::open(dir.path()).unwrap();
        assert_eq!(stage.list().len(), 1);
        assert_eq!(stage.state().committed.len(), 2);
        assert_eq!(stage.next_id(), 5);
    }

    #[test]
    fn test_unparsable_snapshot_yields_empty_state() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(STAGING_SNAPSHOT_FILE), "][").unwrap();
        let stage = StagingArea::open(dir.path()).unwrap();
        assert_eq!(stage.state(), &StagingState::default());
    }

    #[test]
    fn test_failed_append_leaves_state_untouched() {
        let dir = tempdir().unwrap();
        let mut stage = StagingArea::open(dir.path()).unwrap();
        stage.add("a", 1).unwrap();
        let before = stage.state().clone();

        // A directory where the journal file should be makes every append fail.
        let journal = dir.path().join(STAGING_JOURNAL_FILE);
        fs::remove_file(&journal).unwrap();
        fs::create_dir(&journal).unwrap();

        assert_eq!(stage.add("b", 2).unwrap_err().kind(), MemoryErrorKind::Io);
        assert_eq!(stage.state(), &before);
    }

    #[test]
    fn test_failed_checkpoint_still_returns_committed_records() {
        let dir = tempdir().unwrap();
        let mut stage = StagingArea::open(dir.path()).unwrap();
        let id = stage.add("precious note", 1).unwrap();

        // Block the snapshot temp file so the post-commit checkpoint fails.
        fs::create_dir(dir.path().join(format!("{}.tmp", STAGING_SNAPSHOT_FILE))).unwrap();

        let committed = stage.commit().unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].id, id);
        assert!(stage.state().committed.contains(&id));
        assert!(!dir.path().join(STAGING_SNAPSHOT_FILE).exists());

        let reopened = StagingArea::open(dir.path()).unwrap();
        assert!(reopened.state().staged.is_empty());
        assert!(reopened.state().committed.contains(&id));
        assert_eq!(reopened.next_id(), 2);
    }

    #[test]
    fn test_ensure_next_id_only_raises() {
        let dir = tempdir().unwrap();
        let mut stage = StagingArea::open(dir.path()).unwrap();
        stage.ensure_next_id_at_least(10);
        assert_eq!(stage.next_id(), 10);
        stage.ensure_next_id_at_least(3);
        assert_eq!(stage.next_id(), 10);
        assert_eq!(stage.add("x", 1).unwrap(), MemoryId(10));
    }
}
