//! Request-level API over an [`AssetStorage`].
//!
//! Every operation follows the same order: role check, input validation,
//! then one store snapshot per asset (read, pure transition, versioned
//! update, event append, commit). Any failure aborts the snapshot, so a
//! state change is never visible without its event.

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use assetflow_model::{AssetId, AssetRecord, EventKind, RejectionStage, WorkflowEventRecord, WorkflowState};
use assetflow_storage::{AssetFilter, AssetStorage, StorageError};

use crate::batch::{dedup_ids, BatchOutcome, ItemOutcome, Transition};
use crate::clock::{Clock, SystemClock};
use crate::error::WorkflowError;
use crate::role::{Action, Caller, RoleGate};
use crate::stats::WorkflowStats;
use crate::tag::{self, QrRenderRequest, QrSize};
use crate::timeline::Timeline;
use crate::workflow::{self, Transitioned, VerificationPolicy, VerifyInput};

/// Attributes captured at Make time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAsset {
    pub reference: String,
    pub is_consumable: bool,
    pub is_client_supplied: bool,
    /// Checked to be non-negative before anything is stored.
    pub quantity: i64,
    pub condition: Option<String>,
    pub acquisition_cost: Option<Decimal>,
    pub project: Option<String>,
}

impl NewAsset {
    pub fn new(reference: &str) -> Self {
        NewAsset {
            reference: reference.to_string(),
            is_consumable: false,
            is_client_supplied: false,
            quantity: 1,
            condition: None,
            acquisition_cost: None,
            project: None,
        }
    }

    fn into_record(self, created_by: &str, created_at: &str) -> Result<AssetRecord, WorkflowError> {
        let reference = self.reference.trim();
        if reference.is_empty() {
            return Err(WorkflowError::Validation("reference must not be empty".to_string()));
        }
        // ':' separates the fields of the QR payload
        if reference.contains(':') {
            return Err(WorkflowError::Validation(format!(
                "reference '{reference}' must not contain ':'"
            )));
        }
        // a bare number is read as an asset id wherever either is accepted
        if reference.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WorkflowError::Validation(format!(
                "reference '{reference}' must contain at least one non-digit character"
            )));
        }
        let quantity = u64::try_from(self.quantity).map_err(|_| {
            WorkflowError::Validation(format!("quantity must be non-negative, got {}", self.quantity))
        })?;
        if let Some(cost) = self.acquisition_cost {
            if cost < Decimal::ZERO {
                return Err(WorkflowError::Validation(format!(
                    "acquisition cost must be non-negative, got {cost}"
                )));
            }
        }

        let mut record = AssetRecord::draft(reference, created_by, created_at);
        record.is_consumable = self.is_consumable;
        record.is_client_supplied = self.is_client_supplied;
        record.quantity = quantity;
        record.condition = self.condition.filter(|c| !c.trim().is_empty());
        record.acquisition_cost = self.acquisition_cost;
        record.project = self.project.filter(|p| !p.trim().is_empty());
        Ok(record)
    }
}

/// Log a detected version conflict and convert the store error.
fn storage_failure(asset_id: AssetId, e: StorageError) -> WorkflowError {
    if let StorageError::ConcurrentConflict { expected_version, .. } = &e {
        warn!(asset_id, expected_version, "concurrent modification; transition discarded");
    }
    e.into()
}

pub struct AssetService<S: AssetStorage, C: Clock = SystemClock> {
    storage: S,
    gate: RoleGate,
    clock: C,
    policy: VerificationPolicy,
}

impl<S: AssetStorage> AssetService<S, SystemClock> {
    pub fn new(storage: S) -> Self {
        AssetService::with_clock(storage, SystemClock)
    }
}

impl<S: AssetStorage, C: Clock> AssetService<S, C> {
    pub fn with_clock(storage: S, clock: C) -> Self {
        AssetService {
            storage,
            gate: RoleGate::default(),
            clock,
            policy: VerificationPolicy::default(),
        }
    }

    pub fn with_gate(mut self, gate: RoleGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_policy(mut self, policy: VerificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn gate(&self) -> &RoleGate {
        &self.gate
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ── Make ──────────────────────────────────────────────────────────────────

    /// Store a new asset in `pending_verification` with an empty tag record.
    pub async fn create_asset(&self, caller: &Caller, new: NewAsset) -> Result<AssetRecord, WorkflowError> {
        self.gate.check(Action::Create, &caller.role)?;
        let draft = new.into_record(&caller.actor, &self.clock.timestamp())?;

        let mut snapshot = self.storage.begin_snapshot().await?;
        let asset = match self.storage.insert_asset(&mut snapshot, draft).await {
            Ok(asset) => asset,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                return Err(e.into());
            }
        };
        let event = WorkflowEventRecord::pending(
            asset.id,
            EventKind::Workflow,
            None,
            WorkflowState::PendingVerification.as_str(),
            &caller.actor,
            &asset.created_at,
        );
        if let Err(e) = self.storage.append_event(&mut snapshot, event).await {
            let _ = self.storage.abort_snapshot(snapshot).await;
            return Err(e.into());
        }
        self.storage.commit_snapshot(snapshot).await?;

        info!(
            asset_id = asset.id,
            reference = %asset.reference,
            actor = %caller.actor,
            "asset created"
        );
        Ok(asset)
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub async fn asset(&self, asset_id: AssetId) -> Result<AssetRecord, WorkflowError> {
        Ok(self.storage.get_asset(asset_id).await?)
    }

    pub async fn asset_by_reference(&self, reference: &str) -> Result<AssetRecord, WorkflowError> {
        Ok(self.storage.find_asset_by_reference(reference).await?)
    }

    pub async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<AssetRecord>, WorkflowError> {
        Ok(self.storage.list_assets(filter).await?)
    }

    /// Summary counts over the assets matching `filter`, recomputed per call.
    pub async fn stats(&self, caller: &Caller, filter: &AssetFilter) -> Result<WorkflowStats, WorkflowError> {
        self.gate.check(Action::ViewStats, &caller.role)?;
        let assets = self.storage.list_assets(filter).await?;
        Ok(WorkflowStats::compute(&assets))
    }

    /// Fold the asset's event log and check it against the stored state.
    pub async fn timeline(&self, asset_id: AssetId) -> Result<Timeline, WorkflowError> {
        let asset = self.storage.get_asset(asset_id).await?;
        let events = self.storage.list_events(Some(asset_id)).await?;
        let timeline = Timeline::fold(asset_id, &events)?;
        if timeline.current_state != asset.workflow_state {
            return Err(WorkflowError::Storage(StorageError::Backend(format!(
                "event log for asset {asset_id} ends at {} but the record is {}",
                timeline.current_state, asset.workflow_state
            ))));
        }
        Ok(timeline)
    }

    /// What to send to the external renderer for this asset's label.
    pub async fn qr_render_request(&self, asset_id: AssetId, size: QrSize) -> Result<QrRenderRequest, WorkflowError> {
        let asset = self.storage.get_asset(asset_id).await?;
        Ok(QrRenderRequest::new(&asset.reference, size))
    }

    // ── Workflow transitions ──────────────────────────────────────────────────

    pub async fn verify(&self, asset_id: AssetId, caller: &Caller, input: VerifyInput) -> Result<AssetRecord, WorkflowError> {
        self.single(asset_id, caller, Transition::Verify(input)).await
    }

    pub async fn reject(
        &self,
        asset_id: AssetId,
        caller: &Caller,
        stage: RejectionStage,
        reason: &str,
    ) -> Result<AssetRecord, WorkflowError> {
        let transition = Transition::Reject {
            stage,
            reason: reason.to_string(),
        };
        self.single(asset_id, caller, transition).await
    }

    pub async fn resubmit(&self, asset_id: AssetId, caller: &Caller) -> Result<AssetRecord, WorkflowError> {
        self.single(asset_id, caller, Transition::Resubmit).await
    }

    pub async fn authorize(
        &self,
        asset_id: AssetId,
        caller: &Caller,
        notes: Option<&str>,
    ) -> Result<AssetRecord, WorkflowError> {
        let transition = Transition::Authorize {
            notes: notes.map(str::to_string),
        };
        self.single(asset_id, caller, transition).await
    }

    pub async fn batch_verify(
        &self,
        asset_ids: &[AssetId],
        caller: &Caller,
        notes: Option<&str>,
    ) -> Result<BatchOutcome, WorkflowError> {
        let input = VerifyInput {
            notes: notes.map(str::to_string),
            ..Default::default()
        };
        self.apply_batch(asset_ids, caller, Transition::Verify(input)).await
    }

    // ── Tag lifecycle ─────────────────────────────────────────────────────────

    /// Return the asset's QR code, assigning it on first call.
    pub async fn generate_qr(&self, asset_id: AssetId, caller: &Caller) -> Result<String, WorkflowError> {
        let asset = self.single(asset_id, caller, Transition::GenerateQr).await?;
        asset.tag.qr_code.ok_or_else(|| {
            WorkflowError::Storage(StorageError::Backend(format!(
                "asset {asset_id} has no QR code after assignment"
            )))
        })
    }

    pub async fn mark_printed(&self, asset_ids: &[AssetId], caller: &Caller) -> Result<BatchOutcome, WorkflowError> {
        self.apply_batch(asset_ids, caller, Transition::MarkPrinted).await
    }

    pub async fn mark_applied(&self, asset_ids: &[AssetId], caller: &Caller) -> Result<BatchOutcome, WorkflowError> {
        self.apply_batch(asset_ids, caller, Transition::MarkApplied).await
    }

    pub async fn mark_verified(&self, asset_ids: &[AssetId], caller: &Caller) -> Result<BatchOutcome, WorkflowError> {
        self.apply_batch(asset_ids, caller, Transition::MarkVerified).await
    }

    // ── Batch ─────────────────────────────────────────────────────────────────

    /// Apply one transition to every distinct id, each in its own snapshot.
    ///
    /// A caller without the capability gets a `Permission` item for every
    /// id and nothing is written. Invalid transition input is returned as
    /// an error before any asset is touched. Everything else, including
    /// unknown ids, is reported per item.
    pub async fn apply_batch(
        &self,
        asset_ids: &[AssetId],
        caller: &Caller,
        transition: Transition,
    ) -> Result<BatchOutcome, WorkflowError> {
        transition.validate()?;
        let asset_ids = dedup_ids(asset_ids);

        if let Err(denied) = self.gate.check(transition.action(), &caller.role) {
            warn!(
                action = %transition.action(),
                actor = %caller.actor,
                role = %caller.role,
                items = asset_ids.len(),
                "batch denied"
            );
            return Ok(BatchOutcome {
                items: asset_ids
                    .into_iter()
                    .map(|asset_id| ItemOutcome::failed(asset_id, &denied))
                    .collect(),
            });
        }

        let mut outcome = BatchOutcome::default();
        for asset_id in asset_ids {
            let result = self
                .run(asset_id, caller, &transition)
                .await
                .map(|(_, changed)| changed);
            outcome.items.push(ItemOutcome::from_result(asset_id, result));
        }
        info!(
            action = %transition.action(),
            actor = %caller.actor,
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            "batch applied"
        );
        Ok(outcome)
    }

    async fn single(&self, asset_id: AssetId, caller: &Caller, transition: Transition) -> Result<AssetRecord, WorkflowError> {
        self.gate.check(transition.action(), &caller.role)?;
        transition.validate()?;
        self.run(asset_id, caller, &transition)
            .await
            .map(|(asset, _)| asset)
    }

    /// Apply an already-authorized transition to one asset.
    async fn run(
        &self,
        asset_id: AssetId,
        caller: &Caller,
        transition: &Transition,
    ) -> Result<(AssetRecord, bool), WorkflowError> {
        let action = transition.action();
        match transition {
            Transition::Verify(input) => {
                let mut discrepancy = None;
                let applied = self
                    .transact(asset_id, action, |asset, at| {
                        let (change, found) = workflow::verify(asset, caller, input, &self.policy, at)?;
                        discrepancy = found;
                        Ok(Some(change))
                    })
                    .await?;
                if let Some(d) = discrepancy {
                    warn!(
                        asset_id,
                        quantity = ?d.quantity,
                        condition = ?d.condition,
                        review_suggested = d.review_suggested,
                        "verification recorded a discrepancy"
                    );
                }
                Ok(applied)
            }
            Transition::Authorize { notes } => {
                self.transact(asset_id, action, |asset, at| {
                    workflow::authorize(asset, caller, notes.as_deref(), at).map(Some)
                })
                .await
            }
            Transition::Reject { stage, reason } => {
                self.transact(asset_id, action, |asset, at| {
                    workflow::reject(asset, caller, *stage, reason, at).map(Some)
                })
                .await
            }
            Transition::Resubmit => {
                self.transact(asset_id, action, |asset, at| {
                    workflow::resubmit(asset, caller, at).map(Some)
                })
                .await
            }
            Transition::GenerateQr => {
                self.transact(asset_id, action, |asset, at| {
                    Ok(tag::assign_qr(asset, &caller.actor, at).1)
                })
                .await
            }
            Transition::MarkPrinted | Transition::MarkApplied | Transition::MarkVerified => {
                let step = transition.tag_step().ok_or_else(|| {
                    WorkflowError::Validation(format!("{action} is not a tag step"))
                })?;
                self.transact(asset_id, action, |asset, at| {
                    tag::mark(asset, step, &caller.actor, at)
                })
                .await
            }
        }
    }

    /// Run `apply` against the asset inside one snapshot.
    ///
    /// `Ok(None)` from `apply` is an idempotent no-op: the snapshot is
    /// aborted and the unchanged record returned with `false`.
    async fn transact<F>(&self, asset_id: AssetId, action: Action, apply: F) -> Result<(AssetRecord, bool), WorkflowError>
    where
        F: FnOnce(&AssetRecord, &str) -> Result<Option<Transitioned>, WorkflowError> + Send,
    {
        let at = self.clock.timestamp();
        let mut snapshot = self.storage.begin_snapshot().await?;

        let current = match self.storage.get_asset_for_update(&mut snapshot, asset_id).await {
            Ok(asset) => asset,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                return Err(e.into());
            }
        };

        let Transitioned { mut asset, event } = match apply(&current, &at) {
            Ok(Some(change)) => change,
            Ok(None) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                debug!(asset_id, %action, "already applied; nothing written");
                return Ok((current, false));
            }
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                return Err(e);
            }
        };

        match self.storage.update_asset(&mut snapshot, &asset, current.version).await {
            Ok(version) => asset.version = version,
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                return Err(storage_failure(asset_id, e));
            }
        }

        let from = event.from_state.clone().unwrap_or_default();
        let to = event.to_state.clone();
        let actor = event.actor.clone();
        if let Err(e) = self.storage.append_event(&mut snapshot, event).await {
            let _ = self.storage.abort_snapshot(snapshot).await;
            return Err(e.into());
        }
        self.storage
            .commit_snapshot(snapshot)
            .await
            .map_err(|e| storage_failure(asset_id, e))?;

        info!(
            asset_id,
            %action,
            actor = %actor,
            from = %from,
            to = %to,
            version = asset.version,
            "transition committed"
        );
        Ok((asset, true))
    }
}
