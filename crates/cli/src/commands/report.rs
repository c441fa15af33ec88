use std::fmt::Write as _;

use assetflow_engine::{BatchOutcome, WorkflowError};
use assetflow_model::{AssetRecord, EventKind, WorkflowState};
use assetflow_storage::AssetFilter;

use super::Context;

pub(super) async fn stats(
    ctx: &Context,
    project: Option<String>,
    state: Option<WorkflowState>,
) -> Result<bool, WorkflowError> {
    let caller = ctx.caller()?;
    let filter = AssetFilter { project, state };
    let stats = ctx.service.stats(&caller, &filter).await?;
    ctx.emit(&stats, || {
        let rows = [
            ("total", stats.total),
            ("pending_verification", stats.pending_verification),
            ("pending_authorization", stats.pending_authorization),
            ("approved", stats.approved),
            ("rejected", stats.rejected),
            ("needs_qr", stats.needs_qr),
            ("needs_printing", stats.needs_printing),
            ("needs_application", stats.needs_application),
            ("needs_verification", stats.needs_verification),
            ("fully_tagged", stats.fully_tagged),
        ];
        rows.iter()
            .map(|(name, count)| format!("{:<22} {}", name, count))
            .collect::<Vec<_>>()
            .join("\n")
    });
    Ok(true)
}

pub(super) async fn timeline(ctx: &Context, asset: &str) -> Result<bool, WorkflowError> {
    let id = ctx.resolve(asset).await?;
    let timeline = ctx.service.timeline(id).await?;
    ctx.emit(&timeline, || {
        let mut out = String::new();
        for e in &timeline.entries {
            let from = e.from_state.as_deref().unwrap_or("-");
            let kind = match e.kind {
                EventKind::Workflow => "workflow",
                EventKind::Tag => "tag",
            };
            let _ = write!(
                out,
                "{:>4}  {}  {:<8} {} -> {}  by {}",
                e.seq, e.at, kind, from, e.to_state, e.actor
            );
            if let Some(notes) = &e.notes {
                let _ = write!(out, "  ({})", notes.replace('\n', "; "));
            }
            out.push('\n');
        }
        let _ = write!(
            out,
            "state: {}, tag: {}, submissions: {}",
            timeline.current_state, timeline.tag_status, timeline.submission_cycles
        );
        out
    });
    Ok(true)
}

pub(super) fn render_asset(asset: &AssetRecord) -> String {
    let mut out = format!("asset {} ({})\n", asset.id, asset.reference);
    let mut field = |name: &str, value: &str| {
        let _ = writeln!(out, "  {:<20} {}", name, value);
    };
    field("workflow_state", asset.workflow_state.as_str());
    field("tag_status", asset.tag.status().as_str());
    field("quantity", &asset.quantity.to_string());
    field("consumable", &asset.is_consumable.to_string());
    field("client_supplied", &asset.is_client_supplied.to_string());
    let optional = [
        ("condition", &asset.condition),
        ("project", &asset.project),
        ("verified_by", &asset.verified_by),
        ("verification_date", &asset.verification_date),
        ("authorized_by", &asset.authorized_by),
        ("authorization_date", &asset.authorization_date),
        ("rejection_reason", &asset.rejection_reason),
        ("qr_code", &asset.tag.qr_code),
    ];
    for (name, value) in optional {
        if let Some(v) = value {
            field(name, v);
        }
    }
    if let Some(cost) = asset.acquisition_cost {
        field("acquisition_cost", &cost.to_string());
    }
    field("created", &format!("{} by {}", asset.created_at, asset.created_by));
    out.trim_end().to_string()
}

pub(super) fn render_batch(outcome: &BatchOutcome, quiet: bool) -> String {
    let mut lines: Vec<String> = outcome
        .items
        .iter()
        .filter(|item| !quiet || !item.success)
        .map(|item| match (&item.error_kind, &item.error) {
            (Some(kind), Some(error)) => {
                format!("{:>6}  failed [{}] {}", item.asset_id, kind.as_str(), error)
            }
            _ if item.changed => format!("{:>6}  ok", item.asset_id),
            _ => format!("{:>6}  ok (unchanged)", item.asset_id),
        })
        .collect();
    lines.push(format!(
        "{} succeeded, {} failed",
        outcome.succeeded(),
        outcome.failed()
    ));
    lines.join("\n")
}
