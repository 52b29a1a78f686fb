//! `gov` — a local command-line harness over `gov-engine::Engine`,
//! wired to the in-memory reference `Store`/`Clock`/`Notifier`
//! (`gov-memstore`). Mirrors the teacher's `cli/doctor.rs` posture of
//! exercising the core engine directly rather than through its HTTP
//! surface — there is no network listener and no auth here, matching
//! the governance core's explicit non-goals.

mod commands;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gov_domain::config::EngineConfig;
use gov_domain::traits::{NullNotifier, Principal, SystemClock};
use gov_engine::Engine;
use gov_memstore::MemStore;

/// Runtime Governance Engine — local evaluation harness.
#[derive(Debug, Parser)]
#[command(name = "gov", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate a single proposed tool call through the six-layer pipeline.
    Evaluate {
        /// Tool name, e.g. "shell" or "http_request".
        tool: String,
        /// JSON object of tool arguments.
        #[arg(long, default_value = "{}")]
        args: String,
        #[arg(long)]
        agent_id: Option<String>,
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long)]
        user_id: Option<String>,
        /// Comma-separated scope of tools this agent is allowed to call.
        #[arg(long, value_delimiter = ',')]
        allowed_tools: Vec<String>,
    },
    /// Verify a reported tool-execution result against its linked action.
    Verify {
        action_id: String,
        /// JSON object: {"status", "output", "is_error", "raw"}.
        #[arg(long, default_value = "{}")]
        result: String,
        #[arg(long)]
        diff: Option<String>,
    },
    /// Policy Store management.
    #[command(subcommand)]
    Policy(PolicyCommand),
    /// Kill switch control.
    #[command(subcommand)]
    Kill(KillCommand),
    /// Per-agent wallet inspection.
    #[command(subcommand)]
    Wallet(WalletCommand),
    /// Human-review escalation queue.
    #[command(subcommand)]
    Escalation(EscalationCommand),
}

#[derive(Debug, Subcommand)]
enum PolicyCommand {
    /// List policies (base ∪ dynamic).
    List {
        #[arg(long)]
        active_only: bool,
    },
    /// Fetch a single policy by id.
    Get { id: String },
    /// Create a new dynamic policy from a JSON spec.
    Create {
        /// JSON `PolicySpec`.
        spec: String,
    },
    /// Patch an existing policy with a JSON partial.
    Patch { id: String, patch: String },
    /// Flip a policy's `active` flag.
    Toggle { id: String },
    /// Delete a dynamic policy (base policies cannot be deleted).
    Delete { id: String },
    /// List every version of a policy.
    Versions { id: String },
    /// Restore a policy to an earlier version's snapshot.
    Restore { id: String, version: u32 },
}

#[derive(Debug, Subcommand)]
enum KillCommand {
    /// Engage the kill switch (subsequent evaluations all block).
    Engage,
    /// Release the kill switch.
    Release,
    /// Print the current kill-switch state.
    Status,
}

#[derive(Debug, Subcommand)]
enum WalletCommand {
    /// Fetch (auto-provisioning if absent) an agent's wallet.
    Get { owner_id: String },
    /// Add funds to an agent's wallet.
    TopUp { owner_id: String, amount: String },
}

#[derive(Debug, Subcommand)]
enum EscalationCommand {
    /// List escalation events, optionally filtered by status.
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        agent_id: Option<String>,
    },
    /// Approve a pending escalation.
    Approve { id: String },
    /// Reject a pending escalation.
    Reject { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let cli = Cli::parse();

    let store = Arc::new(MemStore::new());
    let clock = Arc::new(SystemClock);
    let notifier = Arc::new(NullNotifier);
    let engine = Engine::new(
        EngineConfig::default(),
        gov_policy::default_base_policies(),
        store,
        clock,
        notifier,
        Vec::new(),
    )
    .await?;
    let actor = Principal::system();

    commands::dispatch(&engine, &actor, cli.command).await
}
