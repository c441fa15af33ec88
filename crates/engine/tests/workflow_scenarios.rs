//! End-to-end scenarios for the asset service over the in-memory store.

use async_trait::async_trait;
use time::macros::datetime;
use time::Duration;
use tokio::sync::Barrier;

use assetflow_engine::{
    AssetService, Caller, ErrorKind, FixedClock, NewAsset, Transition, VerifyInput, WorkflowError,
};
use assetflow_model::{
    AssetId, AssetRecord, EventKind, RejectionStage, TagStatus, WorkflowEventRecord, WorkflowState,
};
use assetflow_storage::{AssetFilter, AssetStorage, MemorySnapshot, MemoryStorage, StorageError};

fn service() -> AssetService<MemoryStorage, FixedClock> {
    AssetService::with_clock(
        MemoryStorage::new(),
        FixedClock::new(datetime!(2025-03-01 09:00:00 UTC)),
    )
}

fn maker() -> Caller {
    Caller::new("walt", "Warehouseman")
}

fn clerk() -> Caller {
    Caller::new("clara", "InventoryClerk")
}

fn director() -> Caller {
    Caller::new("dana", "AssetDirector")
}

async fn create<S: AssetStorage>(svc: &AssetService<S, FixedClock>, reference: &str) -> AssetRecord {
    svc.create_asset(&maker(), NewAsset::new(reference))
        .await
        .unwrap()
}

async fn events_for<S: AssetStorage>(svc: &AssetService<S, FixedClock>, id: AssetId) -> Vec<WorkflowEventRecord> {
    svc.storage().list_events(Some(id)).await.unwrap()
}

#[tokio::test]
async fn create_starts_pending_verification_with_creation_event() {
    let svc = service();
    let asset = create(&svc, "EQ-0001").await;
    assert_eq!(asset.workflow_state, WorkflowState::PendingVerification);
    assert_eq!(asset.tag.status(), TagStatus::NeedsQr);
    assert_eq!(asset.created_by, "walt");

    let events = events_for(&svc, asset.id).await;
    assert_eq!(events.len(), 1);
    assert!(events[0].from_state.is_none());
    assert_eq!(events[0].to_state, "pending_verification");
}

#[tokio::test]
async fn create_rejects_bad_input_and_duplicates() {
    let svc = service();
    create(&svc, "EQ-0001").await;

    let dup = svc
        .create_asset(&maker(), NewAsset::new("EQ-0001"))
        .await
        .unwrap_err();
    assert_eq!(dup.kind(), ErrorKind::Validation);

    let mut negative = NewAsset::new("EQ-0002");
    negative.quantity = -3;
    let err = svc.create_asset(&maker(), negative).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = svc
        .create_asset(&director(), NewAsset::new("EQ-0003"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);

    assert_eq!(svc.list_assets(&AssetFilter::default()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn numeric_only_reference_is_refused() {
    let svc = service();
    let err = svc
        .create_asset(&maker(), NewAsset::new("12345"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let asset = create(&svc, "12345-A").await;
    assert_eq!(svc.asset_by_reference("12345-A").await.unwrap().id, asset.id);
}

#[tokio::test]
async fn batch_verify_deduplicates_and_reports_unknown_ids() {
    let svc = service();
    let a = create(&svc, "EQ-0005").await.id;
    let b = create(&svc, "EQ-0007").await.id;

    let outcome = svc
        .batch_verify(&[a, a, b, 99999], &clerk(), Some("counted"))
        .await
        .unwrap();

    assert_eq!(
        outcome.items.iter().map(|i| i.asset_id).collect::<Vec<_>>(),
        vec![a, b, 99999]
    );
    assert!(outcome.item(a).unwrap().success);
    assert!(outcome.item(b).unwrap().success);
    let missing = outcome.item(99999).unwrap();
    assert!(!missing.success);
    assert_eq!(missing.error_kind, Some(ErrorKind::NotFound));
    assert!(!outcome.all_succeeded());

    // verified exactly once despite the duplicate id
    assert_eq!(events_for(&svc, a).await.len(), 2);
    let asset = svc.asset(a).await.unwrap();
    assert_eq!(asset.workflow_state, WorkflowState::PendingAuthorization);
    assert_eq!(asset.verification_notes.as_deref(), Some("counted"));
}

#[tokio::test]
async fn batch_item_failure_does_not_stop_the_rest() {
    let svc = service();
    let a = create(&svc, "EQ-0010").await.id;
    let b = create(&svc, "EQ-0011").await.id;
    svc.verify(a, &clerk(), VerifyInput::default()).await.unwrap();

    let outcome = svc.batch_verify(&[a, b], &clerk(), None).await.unwrap();
    assert_eq!(outcome.item(a).unwrap().error_kind, Some(ErrorKind::InvalidState));
    assert!(outcome.item(b).unwrap().success);
    assert_eq!(outcome.succeeded(), 1);
}

#[tokio::test]
async fn quantity_discrepancy_is_noted_and_stored_quantity_kept() {
    let svc = service();
    let mut new = NewAsset::new("CON-0001");
    new.is_consumable = true;
    new.quantity = 10;
    let id = svc.create_asset(&maker(), new).await.unwrap().id;

    let input = VerifyInput {
        notes: Some("shelf B".to_string()),
        actual_quantity: Some(8),
        actual_condition: None,
    };
    let asset = svc.verify(id, &clerk(), input).await.unwrap();

    assert_eq!(asset.workflow_state, WorkflowState::PendingAuthorization);
    assert_eq!(asset.quantity, 10);
    let notes = asset.verification_notes.unwrap();
    assert!(notes.contains("found 8"));
    assert!(notes.contains("recorded 10"));
    assert_eq!(svc.asset(id).await.unwrap().quantity, 10);
}

#[tokio::test]
async fn warehouseman_cannot_authorize() {
    let svc = service();
    let id = create(&svc, "EQ-0020").await.id;
    svc.verify(id, &clerk(), VerifyInput::default()).await.unwrap();
    let before = events_for(&svc, id).await.len();

    let err = svc.authorize(id, &maker(), None).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Permission { .. }));

    let asset = svc.asset(id).await.unwrap();
    assert_eq!(asset.workflow_state, WorkflowState::PendingAuthorization);
    assert!(asset.authorized_by.is_none());
    assert_eq!(events_for(&svc, id).await.len(), before);
}

#[tokio::test]
async fn batch_without_capability_fails_every_item() {
    let svc = service();
    let a = create(&svc, "EQ-0021").await.id;
    let b = create(&svc, "EQ-0022").await.id;

    let outcome = svc
        .batch_verify(&[a, b, a, 77777], &maker(), None)
        .await
        .unwrap();
    assert!(!outcome.all_succeeded());
    assert_eq!(
        outcome.items.iter().map(|i| i.asset_id).collect::<Vec<_>>(),
        vec![a, b, 77777]
    );
    assert!(outcome
        .items
        .iter()
        .all(|i| i.error_kind == Some(ErrorKind::Permission) && !i.changed));

    for id in [a, b] {
        assert_eq!(
            svc.asset(id).await.unwrap().workflow_state,
            WorkflowState::PendingVerification
        );
        assert_eq!(events_for(&svc, id).await.len(), 1);
    }
}

#[tokio::test]
async fn permission_is_checked_before_existence() {
    let svc = service();
    let err = svc.authorize(424242, &maker(), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
    let err = svc.authorize(424242, &director(), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn rejection_capability_depends_on_stage() {
    let svc = service();
    let id = create(&svc, "EQ-0030").await.id;
    let err = svc
        .reject(id, &director(), RejectionStage::Verification, "wrong item")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);

    svc.verify(id, &clerk(), VerifyInput::default()).await.unwrap();
    let err = svc
        .reject(id, &clerk(), RejectionStage::Authorization, "over budget")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);

    let asset = svc
        .reject(id, &director(), RejectionStage::Authorization, "over budget")
        .await
        .unwrap();
    assert_eq!(asset.workflow_state, WorkflowState::RejectedAtAuthorization);
}

#[tokio::test]
async fn blank_rejection_reason_writes_nothing() {
    let svc = service();
    let id = create(&svc, "EQ-0031").await.id;
    let err = svc
        .reject(id, &clerk(), RejectionStage::Verification, "  ")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let batch = svc
        .apply_batch(
            &[id],
            &clerk(),
            Transition::Reject {
                stage: RejectionStage::Verification,
                reason: String::new(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(batch.kind(), ErrorKind::Validation);
    assert_eq!(events_for(&svc, id).await.len(), 1);
}

#[tokio::test]
async fn rejection_and_resubmission_cycles() {
    let svc = service();
    let id = create(&svc, "EQ-0040").await.id;

    svc.verify(id, &clerk(), VerifyInput::notes("first look")).await.unwrap();
    svc.reject(id, &director(), RejectionStage::Authorization, "no invoice")
        .await
        .unwrap();
    let back = svc.resubmit(id, &maker()).await.unwrap();
    assert_eq!(back.workflow_state, WorkflowState::PendingVerification);
    assert!(back.rejection_reason.is_none());
    assert_eq!(back.verification_notes.as_deref(), Some("first look"));

    let rejected = svc
        .reject(id, &clerk(), RejectionStage::Verification, "serial unreadable")
        .await
        .unwrap();
    assert_eq!(rejected.rejection_reason.as_deref(), Some("serial unreadable"));
    svc.resubmit(id, &maker()).await.unwrap();
    svc.verify(id, &clerk(), VerifyInput::notes("ok now")).await.unwrap();
    let approved = svc.authorize(id, &director(), Some("go")).await.unwrap();
    assert_eq!(approved.workflow_state, WorkflowState::Approved);
    assert_eq!(approved.verification_notes.as_deref(), Some("ok now"));

    let err = svc.resubmit(id, &maker()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let timeline = svc.timeline(id).await.unwrap();
    assert_eq!(timeline.current_state, WorkflowState::Approved);
    assert_eq!(timeline.submission_cycles, 3);
}

/// Gate fields follow the state; earlier cycles may leave verification
/// fields behind, which is kept history rather than a new verification.
fn assert_gate_fields(asset: &AssetRecord, earlier_cycle_verified: bool) {
    let state = asset.workflow_state;
    let verified = [&asset.verified_by, &asset.verification_date]
        .iter()
        .all(|f| f.is_some());
    if state.is_past_verification() || earlier_cycle_verified {
        assert!(verified, "verification fields missing in {state}");
    } else {
        assert!(asset.verified_by.is_none(), "verified_by set in {state}");
        assert!(asset.verification_date.is_none());
    }
    assert_eq!(
        asset.authorized_by.is_some(),
        state.is_past_authorization(),
        "authorized_by vs {state}"
    );
    assert_eq!(asset.authorization_date.is_some(), state.is_past_authorization());
}

#[tokio::test]
async fn gate_fields_track_state_through_cycles() {
    let svc = service();
    let asset = create(&svc, "EQ-0045").await;
    let id = asset.id;
    assert_gate_fields(&asset, false);

    let rejected = svc
        .reject(id, &clerk(), RejectionStage::Verification, "wrong label")
        .await
        .unwrap();
    assert!(!rejected.workflow_state.is_past_verification());
    assert_gate_fields(&rejected, false);
    assert_gate_fields(&svc.resubmit(id, &maker()).await.unwrap(), false);

    let verified = svc.verify(id, &clerk(), VerifyInput::notes("cycle 2")).await.unwrap();
    assert!(verified.workflow_state.is_past_verification());
    assert_gate_fields(&verified, false);

    let rejected = svc
        .reject(id, &director(), RejectionStage::Authorization, "no invoice")
        .await
        .unwrap();
    assert!(rejected.workflow_state.is_past_verification());
    assert_gate_fields(&rejected, false);

    // resubmission keeps the previous verification on record
    let back = svc.resubmit(id, &maker()).await.unwrap();
    assert!(!back.workflow_state.is_past_verification());
    assert_eq!(back.verification_notes.as_deref(), Some("cycle 2"));
    assert_gate_fields(&back, true);

    assert_gate_fields(&svc.verify(id, &clerk(), VerifyInput::default()).await.unwrap(), true);
    let approved = svc.authorize(id, &director(), Some("go")).await.unwrap();
    assert!(approved.workflow_state.is_past_authorization());
    assert_gate_fields(&approved, true);
}

#[tokio::test]
async fn one_event_per_committed_transition() {
    let svc = service();
    let id = create(&svc, "EQ-0050").await.id;
    svc.verify(id, &clerk(), VerifyInput::default()).await.unwrap();
    svc.authorize(id, &director(), None).await.unwrap();
    svc.generate_qr(id, &maker()).await.unwrap();
    svc.mark_printed(&[id], &maker()).await.unwrap();
    // failed and no-op requests leave no trace
    let _ = svc.verify(id, &clerk(), VerifyInput::default()).await;
    svc.mark_printed(&[id], &maker()).await.unwrap();

    let events = events_for(&svc, id).await;
    assert_eq!(events.len(), 5);
    let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Workflow,
            EventKind::Workflow,
            EventKind::Workflow,
            EventKind::Tag,
            EventKind::Tag
        ]
    );
    assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
    assert_eq!(svc.asset(id).await.unwrap().version, 4);
}

#[tokio::test]
async fn tag_steps_must_follow_order() {
    let svc = service();
    let id = create(&svc, "EQ-0060").await.id;
    svc.generate_qr(id, &maker()).await.unwrap();

    let outcome = svc.mark_applied(&[id], &maker()).await.unwrap();
    assert_eq!(outcome.items[0].error_kind, Some(ErrorKind::InvalidState));
    assert!(svc.asset(id).await.unwrap().tag.applied_at.is_none());
}

#[tokio::test]
async fn marking_printed_twice_keeps_first_timestamp() {
    let svc = service();
    let id = create(&svc, "EQ-0061").await.id;
    svc.generate_qr(id, &maker()).await.unwrap();

    let first = svc.mark_printed(&[id], &maker()).await.unwrap();
    assert!(first.items[0].changed);
    let printed_at = svc.asset(id).await.unwrap().tag.printed_at;
    assert!(printed_at.is_some());

    svc.clock().advance(Duration::hours(2));
    let second = svc.mark_printed(&[id], &maker()).await.unwrap();
    assert!(second.all_succeeded());
    assert!(!second.items[0].changed);
    assert_eq!(svc.asset(id).await.unwrap().tag.printed_at, printed_at);
    assert_eq!(events_for(&svc, id).await.len(), 3);
}

#[tokio::test]
async fn full_tag_lifecycle_is_independent_of_workflow() {
    let svc = service();
    let id = create(&svc, "EQ-0062").await.id;

    svc.generate_qr(id, &maker()).await.unwrap();
    svc.mark_printed(&[id], &maker()).await.unwrap();
    svc.mark_applied(&[id], &maker()).await.unwrap();
    let out = svc.mark_verified(&[id], &clerk()).await.unwrap();
    assert!(out.all_succeeded());

    let asset = svc.asset(id).await.unwrap();
    assert_eq!(asset.tag.status(), TagStatus::FullyTagged);
    assert_eq!(asset.workflow_state, WorkflowState::PendingVerification);
    assert_eq!(svc.timeline(id).await.unwrap().tag_status, "fully_tagged");
}

#[tokio::test]
async fn generate_qr_is_idempotent() {
    let svc = service();
    let id = create(&svc, "EQ-0070").await.id;
    let first = svc.generate_qr(id, &maker()).await.unwrap();
    let second = svc.generate_qr(id, &clerk()).await.unwrap();
    assert_eq!(first, second);
    assert!(first.starts_with("ASSET:EQ-0070:"));
    assert_eq!(events_for(&svc, id).await.len(), 2);
}

#[tokio::test]
async fn stats_count_both_machines_and_respect_filters() {
    let svc = service();
    for (reference, project) in [("S-1", "north"), ("S-2", "north"), ("S-3", "south")] {
        let mut new = NewAsset::new(reference);
        new.project = Some(project.to_string());
        svc.create_asset(&maker(), new).await.unwrap();
    }
    let s1 = svc.asset_by_reference("S-1").await.unwrap().id;
    svc.verify(s1, &clerk(), VerifyInput::default()).await.unwrap();
    svc.generate_qr(s1, &maker()).await.unwrap();

    let all = svc.stats(&director(), &AssetFilter::default()).await.unwrap();
    assert_eq!(all.total, 3);
    assert_eq!(all.pending_verification, 2);
    assert_eq!(all.pending_authorization, 1);
    assert_eq!(all.needs_qr, 2);
    assert_eq!(all.needs_printing, 1);

    let north = svc.stats(&director(), &AssetFilter::project("north")).await.unwrap();
    assert_eq!(north.total, 2);

    let pending = svc
        .stats(&director(), &AssetFilter::state(WorkflowState::PendingAuthorization))
        .await
        .unwrap();
    assert_eq!(pending.total, 1);

    let err = svc
        .stats(&Caller::new("eve", "Visitor"), &AssetFilter::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
}

#[tokio::test]
async fn timeline_matches_stored_state() {
    let svc = service();
    let id = create(&svc, "EQ-0080").await.id;
    svc.verify(id, &clerk(), VerifyInput::default()).await.unwrap();
    svc.reject(id, &director(), RejectionStage::Authorization, "dup")
        .await
        .unwrap();
    svc.generate_qr(id, &maker()).await.unwrap();

    let timeline = svc.timeline(id).await.unwrap();
    let stored = svc.asset(id).await.unwrap();
    assert_eq!(timeline.current_state, stored.workflow_state);
    assert_eq!(timeline.tag_status, stored.tag.status().as_str());
    assert_eq!(timeline.entries.len(), 4);
}

#[tokio::test]
async fn clock_drives_transition_timestamps() {
    let svc = service();
    let id = create(&svc, "EQ-0090").await.id;
    svc.clock().advance(Duration::minutes(30));
    let asset = svc.verify(id, &clerk(), VerifyInput::default()).await.unwrap();
    assert_eq!(asset.created_at, "2025-03-01T09:00:00Z");
    assert_eq!(asset.verification_date.as_deref(), Some("2025-03-01T09:30:00Z"));
    let events = events_for(&svc, id).await;
    assert_eq!(events[1].at, "2025-03-01T09:30:00Z");
}

// ── Concurrency ───────────────────────────────────────────────────────────────

/// Memory store that holds every reader at a barrier after
/// `get_asset_for_update`, so racing requests all read the same version.
struct LockstepStorage {
    inner: MemoryStorage,
    barrier: Barrier,
}

#[async_trait]
impl AssetStorage for LockstepStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        self.inner.begin_snapshot().await
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        self.inner.commit_snapshot(snapshot).await
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        self.inner.abort_snapshot(snapshot).await
    }

    async fn insert_asset(
        &self,
        snapshot: &mut MemorySnapshot,
        record: AssetRecord,
    ) -> Result<AssetRecord, StorageError> {
        self.inner.insert_asset(snapshot, record).await
    }

    async fn get_asset_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        asset_id: AssetId,
    ) -> Result<AssetRecord, StorageError> {
        let asset = self.inner.get_asset_for_update(snapshot, asset_id).await?;
        self.barrier.wait().await;
        Ok(asset)
    }

    async fn update_asset(
        &self,
        snapshot: &mut MemorySnapshot,
        record: &AssetRecord,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        self.inner.update_asset(snapshot, record, expected_version).await
    }

    async fn append_event(
        &self,
        snapshot: &mut MemorySnapshot,
        event: WorkflowEventRecord,
    ) -> Result<(), StorageError> {
        self.inner.append_event(snapshot, event).await
    }

    async fn get_asset(&self, asset_id: AssetId) -> Result<AssetRecord, StorageError> {
        self.inner.get_asset(asset_id).await
    }

    async fn find_asset_by_reference(&self, reference: &str) -> Result<AssetRecord, StorageError> {
        self.inner.find_asset_by_reference(reference).await
    }

    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<AssetRecord>, StorageError> {
        self.inner.list_assets(filter).await
    }

    async fn list_events(
        &self,
        asset_id: Option<AssetId>,
    ) -> Result<Vec<WorkflowEventRecord>, StorageError> {
        self.inner.list_events(asset_id).await
    }
}

#[tokio::test]
async fn concurrent_verify_has_exactly_one_winner() {
    let storage = LockstepStorage {
        inner: MemoryStorage::new(),
        barrier: Barrier::new(2),
    };
    let svc = AssetService::with_clock(storage, FixedClock::new(datetime!(2025-03-01 09:00:00 UTC)));
    let id = create(&svc, "EQ-0100").await.id;

    let clara = clerk();
    let petra = Caller::new("petra", "ProjectManager");
    let (a, b) = tokio::join!(
        svc.verify(id, &clara, VerifyInput::notes("clara")),
        svc.verify(id, &petra, VerifyInput::notes("petra")),
    );

    let results = [a, b];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(loser.kind(), ErrorKind::ConcurrentModification);

    let stored = svc.asset(id).await.unwrap();
    assert_eq!(stored.workflow_state, WorkflowState::PendingAuthorization);
    assert_eq!(stored.version, 1);
    assert_eq!(events_for(&svc, id).await.len(), 2);
}
