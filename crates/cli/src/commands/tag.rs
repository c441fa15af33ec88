use serde::Serialize;

use assetflow_engine::{QrRenderRequest, QrSize, WorkflowError};
use assetflow_model::AssetId;

use super::Context;
use crate::TagCommands;

#[derive(Serialize)]
struct QrResponse {
    asset_id: AssetId,
    qr_code: String,
    render: QrRenderRequest,
}

pub(super) async fn qr(ctx: &Context, asset: &str, size: Option<QrSize>) -> Result<bool, WorkflowError> {
    let caller = ctx.caller()?;
    let id = ctx.resolve(asset).await?;
    let qr_code = ctx.service.generate_qr(id, &caller).await?;
    let render = ctx
        .service
        .qr_render_request(id, size.unwrap_or(ctx.qr_size))
        .await?;
    let response = QrResponse {
        asset_id: id,
        qr_code,
        render,
    };
    ctx.emit(&response, || {
        format!(
            "{}\nrender: {} {} ({}px)",
            response.qr_code, response.render.reference, response.render.size, response.render.pixels
        )
    });
    Ok(true)
}

pub(super) async fn mark(ctx: &Context, step: TagCommands) -> Result<bool, WorkflowError> {
    let caller = ctx.caller()?;
    let outcome = match step {
        TagCommands::Print { ids } => ctx.service.mark_printed(&ids, &caller).await?,
        TagCommands::Apply { ids } => ctx.service.mark_applied(&ids, &caller).await?,
        TagCommands::Verify { ids } => ctx.service.mark_verified(&ids, &caller).await?,
    };
    Ok(ctx.emit_batch(&outcome))
}
