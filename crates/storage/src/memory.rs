//! In-process `AssetStorage` backend.
//!
//! Snapshots buffer their writes and apply them under a single lock on
//! commit, after re-checking every staged update's base version. The whole
//! store can be exported as a [`StoreDump`] and rebuilt from one, which is
//! how the CLI persists it between invocations.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use assetflow_model::{AssetId, AssetRecord, WorkflowEventRecord};

use crate::error::StorageError;
use crate::filter::AssetFilter;
use crate::traits::AssetStorage;

/// Serializable image of a [`MemoryStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDump {
    pub next_asset_id: AssetId,
    pub next_seq: u64,
    pub assets: Vec<AssetRecord>,
    pub events: Vec<WorkflowEventRecord>,
}

impl Default for StoreDump {
    fn default() -> Self {
        StoreDump {
            next_asset_id: 1,
            next_seq: 1,
            assets: Vec::new(),
            events: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Inner {
    next_asset_id: AssetId,
    next_seq: u64,
    assets: BTreeMap<AssetId, AssetRecord>,
    events: Vec<WorkflowEventRecord>,
}

/// An update staged against a committed asset.
#[derive(Debug)]
struct StagedUpdate {
    /// Committed version the snapshot read from.
    base_version: i64,
    record: AssetRecord,
}

/// Pending writes of one in-progress transaction.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    inserted: BTreeMap<AssetId, AssetRecord>,
    staged: BTreeMap<AssetId, StagedUpdate>,
    events: Vec<WorkflowEventRecord>,
}

#[derive(Debug)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::from_dump(StoreDump::default())
    }

    pub fn from_dump(dump: StoreDump) -> Self {
        let max_id = dump.assets.iter().map(|a| a.id).max().unwrap_or(0);
        let max_seq = dump.events.iter().map(|e| e.seq).max().unwrap_or(0);
        let mut events = dump.events;
        events.sort_by_key(|e| e.seq);
        MemoryStorage {
            inner: Mutex::new(Inner {
                next_asset_id: dump.next_asset_id.max(max_id + 1),
                next_seq: dump.next_seq.max(max_seq + 1),
                assets: dump.assets.into_iter().map(|a| (a.id, a)).collect(),
                events,
            }),
        }
    }

    pub fn dump(&self) -> Result<StoreDump, StorageError> {
        let inner = self.lock()?;
        Ok(StoreDump {
            next_asset_id: inner.next_asset_id,
            next_seq: inner.next_seq,
            assets: inner.assets.values().cloned().collect(),
            events: inner.events.clone(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }
}

fn check_immutable(stored: &AssetRecord, update: &AssetRecord) -> Result<(), StorageError> {
    let field = if stored.reference != update.reference {
        Some("reference")
    } else if stored.created_by != update.created_by {
        Some("created_by")
    } else if stored.created_at != update.created_at {
        Some("created_at")
    } else {
        None
    };
    match field {
        Some(field) => Err(StorageError::ImmutableField {
            asset_id: stored.id,
            field,
        }),
        None => Ok(()),
    }
}

#[async_trait]
impl AssetStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut inner = self.lock()?;

        // Validate everything before applying anything.
        for (id, staged) in &snapshot.staged {
            let current = inner
                .assets
                .get(id)
                .ok_or(StorageError::AssetNotFound { asset_id: *id })?;
            if current.version != staged.base_version {
                return Err(StorageError::ConcurrentConflict {
                    asset_id: *id,
                    expected_version: staged.base_version,
                });
            }
        }
        for record in snapshot.inserted.values() {
            if inner
                .assets
                .values()
                .any(|a| a.reference == record.reference)
            {
                return Err(StorageError::DuplicateReference {
                    reference: record.reference.clone(),
                });
            }
        }

        for (id, record) in snapshot.inserted {
            inner.assets.insert(id, record);
        }
        for (id, staged) in snapshot.staged {
            inner.assets.insert(id, staged.record);
        }
        for mut event in snapshot.events {
            event.seq = inner.next_seq;
            inner.next_seq += 1;
            inner.events.push(event);
        }
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_asset(
        &self,
        snapshot: &mut MemorySnapshot,
        mut record: AssetRecord,
    ) -> Result<AssetRecord, StorageError> {
        let mut inner = self.lock()?;
        let taken = inner.assets.values().any(|a| a.reference == record.reference)
            || snapshot
                .inserted
                .values()
                .any(|a| a.reference == record.reference);
        if taken {
            return Err(StorageError::DuplicateReference {
                reference: record.reference,
            });
        }
        // Ids burned by aborted snapshots are not reused.
        record.id = inner.next_asset_id;
        inner.next_asset_id += 1;
        record.version = 0;
        snapshot.inserted.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_asset_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        asset_id: AssetId,
    ) -> Result<AssetRecord, StorageError> {
        if let Some(staged) = snapshot.staged.get(&asset_id) {
            return Ok(staged.record.clone());
        }
        if let Some(inserted) = snapshot.inserted.get(&asset_id) {
            return Ok(inserted.clone());
        }
        let inner = self.lock()?;
        inner
            .assets
            .get(&asset_id)
            .cloned()
            .ok_or(StorageError::AssetNotFound { asset_id })
    }

    async fn update_asset(
        &self,
        snapshot: &mut MemorySnapshot,
        record: &AssetRecord,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        let asset_id = record.id;
        let conflict = StorageError::ConcurrentConflict {
            asset_id,
            expected_version,
        };

        if let Some(inserted) = snapshot.inserted.get_mut(&asset_id) {
            if inserted.version != expected_version {
                return Err(conflict);
            }
            check_immutable(inserted, record)?;
            let mut next = record.clone();
            next.version = expected_version + 1;
            *inserted = next;
            return Ok(expected_version + 1);
        }

        if let Some(staged) = snapshot.staged.get_mut(&asset_id) {
            if staged.record.version != expected_version {
                return Err(conflict);
            }
            check_immutable(&staged.record, record)?;
            let mut next = record.clone();
            next.version = expected_version + 1;
            staged.record = next;
            return Ok(expected_version + 1);
        }

        let inner = self.lock()?;
        let committed = inner
            .assets
            .get(&asset_id)
            .ok_or(StorageError::AssetNotFound { asset_id })?;
        if committed.version != expected_version {
            return Err(conflict);
        }
        check_immutable(committed, record)?;
        let mut next = record.clone();
        next.version = expected_version + 1;
        snapshot.staged.insert(
            asset_id,
            StagedUpdate {
                base_version: committed.version,
                record: next,
            },
        );
        Ok(expected_version + 1)
    }

    async fn append_event(
        &self,
        snapshot: &mut MemorySnapshot,
        event: WorkflowEventRecord,
    ) -> Result<(), StorageError> {
        if !snapshot.inserted.contains_key(&event.asset_id) {
            let inner = self.lock()?;
            if !inner.assets.contains_key(&event.asset_id) {
                return Err(StorageError::AssetNotFound {
                    asset_id: event.asset_id,
                });
            }
        }
        snapshot.events.push(event);
        Ok(())
    }

    async fn get_asset(&self, asset_id: AssetId) -> Result<AssetRecord, StorageError> {
        let inner = self.lock()?;
        inner
            .assets
            .get(&asset_id)
            .cloned()
            .ok_or(StorageError::AssetNotFound { asset_id })
    }

    async fn find_asset_by_reference(
        &self,
        reference: &str,
    ) -> Result<AssetRecord, StorageError> {
        let inner = self.lock()?;
        inner
            .assets
            .values()
            .find(|a| a.reference == reference)
            .cloned()
            .ok_or_else(|| StorageError::ReferenceNotFound {
                reference: reference.to_string(),
            })
    }

    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<AssetRecord>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .assets
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn list_events(
        &self,
        asset_id: Option<AssetId>,
    ) -> Result<Vec<WorkflowEventRecord>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .events
            .iter()
            .filter(|e| asset_id.map_or(true, |id| e.asset_id == id))
            .cloned()
            .collect())
    }
}
