//! Dispatch from parsed CLI subcommands to `gov_engine::Engine` calls,
//! printing each result as pretty JSON. Mirrors the teacher's `run.rs`
//! shape: build a request, call the engine, format, done — no retries
//! or interactive prompting here.

use anyhow::{Context, Result};

use gov_domain::action::{RequestContext, ToolRequest};
use gov_domain::args::ArgValue;
use gov_domain::escalation::EscalationFilter;
use gov_domain::policy::{PolicyPatch, PolicySpec};
use gov_domain::traits::Principal;
use gov_domain::verification::ToolResult;
use gov_domain::wallet::Decimal3;
use gov_engine::Engine;

use crate::{Command, EscalationCommand, KillCommand, PolicyCommand, WalletCommand};

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn dispatch(engine: &Engine, actor: &Principal, command: Command) -> Result<()> {
    match command {
        Command::Evaluate { tool, args, agent_id, session_id, user_id, allowed_tools } => {
            let args_json: serde_json::Value = serde_json::from_str(&args).context("--args must be a JSON object")?;
            let req = ToolRequest {
                tool,
                args: ArgValue::from_json(&args_json),
                context: RequestContext {
                    agent_id,
                    session_id,
                    user_id,
                    allowed_tools,
                    ..Default::default()
                },
            };
            let decision = engine.evaluate(req).await?;
            print_json(&decision)
        }
        Command::Verify { action_id, result, diff } => {
            let result: ToolResult = serde_json::from_str(&result).context("--result must be a JSON object")?;
            let context = RequestContext::default();
            let log = engine.verify(&action_id, &result, diff.as_deref(), &context).await?;
            print_json(&log)
        }
        Command::Policy(cmd) => policy(engine, actor, cmd).await,
        Command::Kill(cmd) => kill(engine, actor, cmd).await,
        Command::Wallet(cmd) => wallet(engine, cmd).await,
        Command::Escalation(cmd) => escalation(engine, actor, cmd).await,
    }
}

async fn policy(engine: &Engine, actor: &Principal, cmd: PolicyCommand) -> Result<()> {
    match cmd {
        PolicyCommand::List { active_only } => print_json(&engine.policy_list(active_only).await?),
        PolicyCommand::Get { id } => print_json(&engine.policy_get(&id).await?),
        PolicyCommand::Create { spec } => {
            let spec: PolicySpec = serde_json::from_str(&spec).context("spec must be a JSON PolicySpec")?;
            print_json(&engine.policy_create(spec, actor).await?)
        }
        PolicyCommand::Patch { id, patch } => {
            let patch: PolicyPatch = serde_json::from_str(&patch).context("patch must be a JSON PolicyPatch")?;
            print_json(&engine.policy_patch(&id, patch, actor).await?)
        }
        PolicyCommand::Toggle { id } => print_json(&engine.policy_toggle(&id, actor).await?),
        PolicyCommand::Delete { id } => {
            engine.policy_delete(&id).await?;
            println!("deleted {id}");
            Ok(())
        }
        PolicyCommand::Versions { id } => print_json(&engine.policy_versions(&id).await?),
        PolicyCommand::Restore { id, version } => print_json(&engine.policy_restore(&id, version, actor).await?),
    }
}

async fn kill(engine: &Engine, actor: &Principal, cmd: KillCommand) -> Result<()> {
    match cmd {
        KillCommand::Engage => {
            engine.kill_engage(actor).await?;
            println!("kill switch engaged");
        }
        KillCommand::Release => {
            engine.kill_release(actor).await?;
            println!("kill switch released");
        }
        KillCommand::Status => {
            println!("engaged: {}", engine.kill_status());
        }
    }
    Ok(())
}

async fn wallet(engine: &Engine, cmd: WalletCommand) -> Result<()> {
    match cmd {
        WalletCommand::Get { owner_id } => print_json(&engine.wallet_get(&owner_id).await?),
        WalletCommand::TopUp { owner_id, amount } => {
            let amount: Decimal3 = amount.parse().map_err(anyhow::Error::msg)?;
            print_json(&engine.wallet_top_up(&owner_id, amount).await?)
        }
    }
}

async fn escalation(engine: &Engine, actor: &Principal, cmd: EscalationCommand) -> Result<()> {
    match cmd {
        EscalationCommand::List { status, agent_id } => {
            let status = status
                .map(|s| serde_json::from_value(serde_json::Value::String(s)))
                .transpose()
                .context("--status must be one of pending, approved, rejected, expired")?;
            let filter = EscalationFilter { status, agent_id };
            print_json(&engine.escalation_list(filter).await?)
        }
        EscalationCommand::Approve { id } => print_json(&engine.escalation_approve(&id, actor).await?),
        EscalationCommand::Reject { id } => print_json(&engine.escalation_reject(&id, actor).await?),
    }
}
