use assetflow_engine::{NewAsset, Transition, VerifyInput, WorkflowError};
use assetflow_model::{AssetId, RejectionStage};

use super::report::render_asset;
use super::Context;

pub(super) async fn create(ctx: &Context, new: NewAsset) -> Result<bool, WorkflowError> {
    let caller = ctx.caller()?;
    let asset = ctx.service.create_asset(&caller, new).await?;
    ctx.emit(&asset, || format!("created asset {} ({})", asset.id, asset.reference));
    Ok(true)
}

pub(super) async fn show(ctx: &Context, asset: &str) -> Result<bool, WorkflowError> {
    let id = ctx.resolve(asset).await?;
    let asset = ctx.service.asset(id).await?;
    ctx.emit(&asset, || render_asset(&asset));
    Ok(true)
}

pub(super) async fn verify(ctx: &Context, asset: &str, input: VerifyInput) -> Result<bool, WorkflowError> {
    let caller = ctx.caller()?;
    let id = ctx.resolve(asset).await?;
    let asset = ctx.service.verify(id, &caller, input).await?;
    ctx.emit(&asset, || {
        let mut line = format!("asset {} verified; now {}", asset.id, asset.workflow_state);
        if let Some(notes) = asset
            .verification_notes
            .as_deref()
            .filter(|n| n.contains("[discrepancy]"))
        {
            line.push('\n');
            line.push_str(notes);
        }
        line
    });
    Ok(true)
}

pub(super) async fn reject(
    ctx: &Context,
    asset: &str,
    stage: RejectionStage,
    reason: &str,
) -> Result<bool, WorkflowError> {
    let caller = ctx.caller()?;
    let id = ctx.resolve(asset).await?;
    let asset = ctx.service.reject(id, &caller, stage, reason).await?;
    ctx.emit(&asset, || format!("asset {} rejected at {stage}", asset.id));
    Ok(true)
}

pub(super) async fn resubmit(ctx: &Context, asset: &str) -> Result<bool, WorkflowError> {
    let caller = ctx.caller()?;
    let id = ctx.resolve(asset).await?;
    let asset = ctx.service.resubmit(id, &caller).await?;
    ctx.emit(&asset, || format!("asset {} resubmitted; now {}", asset.id, asset.workflow_state));
    Ok(true)
}

pub(super) async fn authorize(ctx: &Context, asset: &str, notes: Option<&str>) -> Result<bool, WorkflowError> {
    let caller = ctx.caller()?;
    let id = ctx.resolve(asset).await?;
    let asset = ctx.service.authorize(id, &caller, notes).await?;
    ctx.emit(&asset, || format!("asset {} authorized; now {}", asset.id, asset.workflow_state));
    Ok(true)
}

pub(super) async fn batch_verify(ctx: &Context, ids: &[AssetId], notes: Option<String>) -> Result<bool, WorkflowError> {
    let caller = ctx.caller()?;
    let outcome = ctx.service.batch_verify(ids, &caller, notes.as_deref()).await?;
    Ok(ctx.emit_batch(&outcome))
}

pub(super) async fn batch_authorize(ctx: &Context, ids: &[AssetId], notes: Option<String>) -> Result<bool, WorkflowError> {
    let caller = ctx.caller()?;
    let outcome = ctx
        .service
        .apply_batch(ids, &caller, Transition::Authorize { notes })
        .await?;
    Ok(ctx.emit_batch(&outcome))
}
