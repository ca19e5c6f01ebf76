mod cli;
mod config;
mod replay;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
use hook_runtime::{HookRunner, SharedState};
use rule_script::RuleScript;
use uuid::Uuid;

use crate::cli::Cli;
use crate::config::{Config, LogFormat};

const COMPONENT: &str = "proxy-scripts";

fn session_source(session_id: Uuid) -> AuditSource {
    AuditSource {
        session_id: Some(session_id),
        ..AuditSource::new(COMPONENT)
    }
}

fn init_tracing(level: &str, format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // stdout carries the replay report.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

struct SessionSummary {
    exchanges: usize,
    failed: usize,
    state_keys: Vec<String>,
}

async fn replay_session(
    cli: &Cli,
    cfg: &Config,
    session_id: Uuid,
    audit: &AuditSink,
) -> Result<SessionSummary> {
    // 5. Load and compile the rule script.
    let script_config = rule_script::loader::load_script(&cfg.script_file)
        .context("failed to load script file")?;
    let script = Arc::new(RuleScript::new(script_config).context("failed to compile script")?);

    info!(script_file = %cfg.script_file.display(), ?script, "script loaded");

    audit
        .log(AuditEntry::new(
            AuditEventType::ScriptLoaded,
            session_source(session_id),
            serde_json::json!({
                "script_file": cfg.script_file.display().to_string(),
                "name": script.name(),
                "rules": script.rule_names(),
            }),
        ))
        .await;

    // 6. Build the runner. One shared state for the whole session; a side
    //    the script has no actions for stays a passthrough.
    let mut runner = HookRunner::new(SharedState::new(), cfg.hooks.runner_config())
        .with_audit(audit.clone());
    if script.has_request_actions() {
        runner = runner.with_request_hook(script.clone());
    }
    if script.has_response_actions() {
        runner = runner.with_response_hook(script.clone());
    }
    info!(runner = ?runner, "hook runner ready");

    // 7. Replay every fixture and print one JSON line per exchange.
    let reports = replay::replay_all(&runner, session_id, &cli.exchanges).await;
    let mut failed = 0usize;
    for report in &reports {
        println!(
            "{}",
            serde_json::to_string(report).context("failed to serialize replay report")?
        );
        if report.is_failure() {
            failed += 1;
        }
    }

    Ok(SessionSummary {
        exchanges: reports.len(),
        failed,
        state_keys: runner.state().keys(),
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;

    if let Some(ref script) = cli.script {
        cfg.script_file = script.clone();
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        anyhow::ensure!(timeout_ms > 0, "--timeout-ms must be greater than 0");
        cfg.hooks.timeout_ms = timeout_ms;
    }
    if let Some(ref level) = cli.log_level {
        cfg.logging.level = level.clone();
    }

    // 3. Init tracing.
    init_tracing(&cfg.logging.level, cfg.logging.format);

    let session_id = Uuid::new_v4();
    info!(
        %session_id,
        config_file = %cli.config.display(),
        script_file = %cfg.script_file.display(),
        exchanges = cli.exchanges.len(),
        "proxy-scripts starting"
    );

    run_session(&cli, &cfg, session_id).await
}

/// Steps 4-8: everything that runs with the audit journal open. Once the
/// journal has started it is drained on every exit path.
async fn run_session(cli: &Cli, cfg: &Config, session_id: Uuid) -> Result<ExitCode> {
    // 4. Start audit logger.
    let (audit, audit_handle) = AuditSink::start(&cfg.logging.audit_log_path)
        .await
        .context("failed to start audit logger")?;

    audit
        .log(AuditEntry::new(
            AuditEventType::SessionStarted,
            session_source(session_id),
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config_file": cli.config.display().to_string(),
            }),
        ))
        .await;

    // 5-7. Load the script and replay the fixtures.
    let outcome = replay_session(cli, cfg, session_id, &audit).await;

    // 8. Log shutdown and wait for the audit journal to drain.
    let details = match &outcome {
        Ok(summary) => {
            info!(exchanges = summary.exchanges, failed = summary.failed, "proxy-scripts finished");
            serde_json::json!({
                "exchanges": summary.exchanges,
                "failed": summary.failed,
                "shared_state_keys": summary.state_keys,
            })
        }
        Err(err) => serde_json::json!({ "error": format!("{err:#}") }),
    };
    audit
        .log(AuditEntry::new(
            AuditEventType::SessionStopped,
            session_source(session_id),
            details,
        ))
        .await;

    drop(audit);
    audit_handle
        .await
        .context("audit writer task failed")?;

    let failed = outcome?.failed;
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
