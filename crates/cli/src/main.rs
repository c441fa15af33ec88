mod commands;
mod config;
mod store;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

use assetflow_engine::{AssetService, QrSize};
use assetflow_model::{AssetId, RejectionStage, WorkflowState};

use crate::config::Config;
use crate::store::{Access, StoreFile};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Asset approval workflow and QR tag tracking.
#[derive(Parser)]
#[command(
    name = "assetflow",
    version,
    about = "Asset approval workflow and QR tag tracking"
)]
struct Cli {
    /// Path to the TOML config file (default: ./assetflow.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the JSON store file (overrides [store] path)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Name recorded as the actor of every change
    #[arg(long, global = true, default_value = "cli")]
    actor: String,

    /// Role the actor acts under, e.g. InventoryClerk
    #[arg(long, global = true)]
    role: Option<String>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Register a new asset (Make)
    Create {
        /// Unique reference code, e.g. EQ-0042
        #[arg(long)]
        reference: String,
        #[arg(long)]
        consumable: bool,
        #[arg(long)]
        client_supplied: bool,
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        quantity: i64,
        #[arg(long)]
        condition: Option<String>,
        /// Acquisition cost as a decimal, e.g. 1250.50
        #[arg(long, allow_negative_numbers = true)]
        cost: Option<Decimal>,
        #[arg(long)]
        project: Option<String>,
    },

    /// Show one asset (by id or reference)
    Show { asset: String },

    /// Record physical verification of an asset
    Verify {
        asset: String,
        #[arg(long)]
        notes: Option<String>,
        /// Counted quantity; a difference is noted, never applied
        #[arg(long, allow_negative_numbers = true)]
        actual_quantity: Option<i64>,
        /// Observed condition; a difference is noted, never applied
        #[arg(long)]
        actual_condition: Option<String>,
    },

    /// Reject an asset at verification or authorization
    Reject {
        asset: String,
        /// verification or authorization
        #[arg(long)]
        stage: RejectionStage,
        #[arg(long)]
        reason: String,
    },

    /// Send a rejected asset back to pending verification
    Resubmit { asset: String },

    /// Authorize a verified asset
    Authorize {
        asset: String,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Verify many assets; each id succeeds or fails on its own
    BatchVerify {
        #[arg(required = true)]
        ids: Vec<AssetId>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Authorize many assets; each id succeeds or fails on its own
    BatchAuthorize {
        #[arg(required = true)]
        ids: Vec<AssetId>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Generate (or return the existing) QR code of an asset
    Qr {
        asset: String,
        /// Label size for the render request (default from [qr] default_size)
        #[arg(long)]
        size: Option<QrSize>,
    },

    /// Record tag printing, application or verification
    Tag {
        #[command(subcommand)]
        step: TagCommands,
    },

    /// Count assets per workflow state and tag status
    Stats {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        state: Option<WorkflowState>,
    },

    /// Show the event history of an asset
    Timeline { asset: String },
}

impl Commands {
    /// Whether the command can write to the store.
    pub(crate) fn mutates(&self) -> bool {
        !matches!(
            self,
            Commands::Show { .. } | Commands::Stats { .. } | Commands::Timeline { .. }
        )
    }
}

#[derive(Subcommand)]
pub(crate) enum TagCommands {
    /// Mark tags as printed
    Print {
        #[arg(required = true)]
        ids: Vec<AssetId>,
    },
    /// Mark tags as applied to the asset
    Apply {
        #[arg(required = true)]
        ids: Vec<AssetId>,
    },
    /// Mark applied tags as scanned and verified
    Verify {
        #[arg(required = true)]
        ids: Vec<AssetId>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ASSETFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let output = cli.output;
    let quiet = cli.quiet;

    let config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| exit_with(&e.to_string(), output, quiet));
    let gate = config.gate().unwrap_or_else(|e| exit_with(&e.to_string(), output, quiet));
    let qr_size = config.qr_size().unwrap_or_else(|e| exit_with(&e.to_string(), output, quiet));

    let store_path = cli
        .store
        .clone()
        .or_else(|| config.store.path.clone())
        .unwrap_or_else(|| PathBuf::from(store::DEFAULT_STORE_FILE));
    let mutates = cli.command.mutates();
    let access = if mutates { Access::Write } else { Access::Read };
    // held until the process ends so load and save see no other writer
    let store_file =
        StoreFile::open(&store_path, access).unwrap_or_else(|e| exit_with(&e.to_string(), output, quiet));
    let storage = store_file
        .load()
        .unwrap_or_else(|e| exit_with(&e.to_string(), output, quiet));
    tracing::debug!(store = %store_file.path().display(), ?access, "store loaded");

    let ctx = commands::Context {
        service: AssetService::new(storage)
            .with_gate(gate)
            .with_policy(config.policy()),
        actor: cli.actor,
        role: cli.role,
        output,
        quiet,
        qr_size,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| exit_with(&format!("failed to create tokio runtime: {e}"), output, quiet));

    let success = runtime.block_on(commands::run(&ctx, cli.command));

    if mutates {
        if let Err(e) = store_file.save(ctx.service.storage()) {
            exit_with(&e.to_string(), output, quiet);
        }
    }
    if !success {
        process::exit(1);
    }
}

fn exit_with(msg: &str, output: OutputFormat, quiet: bool) -> ! {
    report_error(msg, output, quiet);
    process::exit(1);
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg })),
    }
}
