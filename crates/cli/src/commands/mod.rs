mod report;
mod tag;
mod workflow;

use serde::Serialize;

use assetflow_engine::{AssetService, BatchOutcome, Caller, QrSize, WorkflowError};
use assetflow_model::AssetId;
use assetflow_storage::MemoryStorage;

use crate::{report_error, Commands, OutputFormat};

/// Everything a command handler needs.
pub(crate) struct Context {
    pub service: AssetService<MemoryStorage>,
    pub actor: String,
    pub role: Option<String>,
    pub output: OutputFormat,
    pub quiet: bool,
    pub qr_size: QrSize,
}

impl Context {
    fn caller(&self) -> Result<Caller, WorkflowError> {
        self.role
            .as_deref()
            .map(|role| Caller::new(&self.actor, role))
            .ok_or_else(|| WorkflowError::Validation("--role is required for this command".to_string()))
    }

    /// Accept either a numeric id or a reference code.
    async fn resolve(&self, asset: &str) -> Result<AssetId, WorkflowError> {
        match asset.parse::<AssetId>() {
            Ok(id) => Ok(id),
            Err(_) => Ok(self.service.asset_by_reference(asset).await?.id),
        }
    }

    /// Print `value` as JSON, or the text rendering.
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) {
        match self.output {
            OutputFormat::Json => match serde_json::to_string_pretty(value) {
                Ok(json) => println!("{}", json),
                Err(e) => report_error(&format!("serialization error: {}", e), self.output, self.quiet),
            },
            OutputFormat::Text => println!("{}", text()),
        }
    }

    fn emit_batch(&self, outcome: &BatchOutcome) -> bool {
        let all_succeeded = outcome.all_succeeded();
        let json = serde_json::json!({
            "all_succeeded": all_succeeded,
            "succeeded": outcome.succeeded(),
            "failed": outcome.failed(),
            "items": outcome.items,
        });
        self.emit(&json, || report::render_batch(outcome, self.quiet));
        all_succeeded
    }
}

/// Run one command. Returns whether every part of it succeeded.
pub(crate) async fn run(ctx: &Context, command: Commands) -> bool {
    let result = match command {
        Commands::Create {
            reference,
            consumable,
            client_supplied,
            quantity,
            condition,
            cost,
            project,
        } => {
            let new = assetflow_engine::NewAsset {
                reference,
                is_consumable: consumable,
                is_client_supplied: client_supplied,
                quantity,
                condition,
                acquisition_cost: cost,
                project,
            };
            workflow::create(ctx, new).await
        }
        Commands::Show { asset } => workflow::show(ctx, &asset).await,
        Commands::Verify {
            asset,
            notes,
            actual_quantity,
            actual_condition,
        } => {
            let input = assetflow_engine::VerifyInput {
                notes,
                actual_quantity,
                actual_condition,
            };
            workflow::verify(ctx, &asset, input).await
        }
        Commands::Reject {
            asset,
            stage,
            reason,
        } => workflow::reject(ctx, &asset, stage, &reason).await,
        Commands::Resubmit { asset } => workflow::resubmit(ctx, &asset).await,
        Commands::Authorize { asset, notes } => workflow::authorize(ctx, &asset, notes.as_deref()).await,
        Commands::BatchVerify { ids, notes } => workflow::batch_verify(ctx, &ids, notes).await,
        Commands::BatchAuthorize { ids, notes } => workflow::batch_authorize(ctx, &ids, notes).await,
        Commands::Qr { asset, size } => tag::qr(ctx, &asset, size).await,
        Commands::Tag { step } => tag::mark(ctx, step).await,
        Commands::Stats { project, state } => report::stats(ctx, project, state).await,
        Commands::Timeline { asset } => report::timeline(ctx, &asset).await,
    };

    match result {
        Ok(success) => success,
        Err(e) => {
            report_error(&format!("error: {}", e), ctx.output, ctx.quiet);
            false
        }
    }
}
