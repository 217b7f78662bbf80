//! Runs a handful of intercepted agent actions through the OrchestraGuard
//! pipeline and prints each verdict.
//!
//! By default a scripted oracle answers locally so the demo needs no model
//! server. Pass `--live` to consult the OpenAI-compatible endpoint from the
//! configuration instead.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use orchestra_guard::audit::{AuditSink, JournalAuditSink, MemoryAuditSink};
use orchestra_guard::config::GuardConfig;
use orchestra_guard::engine::{DecisionEngine, Oracle, OracleRequest, OracleResult};
use orchestra_guard::notify::{HyperTransport, NotificationDispatcher};
use orchestra_guard::policy::{PolicyCache, PolicyRecord, StaticPolicyStore};
use orchestra_guard::primitives::Action;
use orchestra_guard::telemetry::init_tracing;
use serde_json::{Value, json};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "intercept-demo", about = "Screen sample agent actions with OrchestraGuard")]
struct Args {
    /// JSON configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Consult the configured HTTP oracle instead of the scripted one.
    #[arg(long)]
    live: bool,

    /// Append audit records to this newline-delimited JSON file.
    #[arg(long)]
    journal: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GuardConfig::load(path).await?,
        None => GuardConfig::default(),
    }
    .with_env_overrides()?;
    init_tracing(&config.telemetry_config())?;

    info!("=== OrchestraGuard: intercept demo ===");

    let store = Arc::new(StaticPolicyStore::new(sample_policies()));
    let cache = Arc::new(PolicyCache::new(store, config.cache_config()));

    let oracle: Arc<dyn Oracle> = if args.live {
        Arc::new(config.build_oracle()?)
    } else {
        Arc::new(ScriptedOracle)
    };

    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::new(HyperTransport::new()),
        config.dispatcher_config(),
    ));
    let webhooks = config.register_webhooks(&dispatcher)?;
    info!(webhooks, "notification receivers registered");

    let journal = match &args.journal {
        Some(path) => Some(Arc::new(
            JournalAuditSink::open(path)
                .await
                .with_context(|| format!("opening audit journal {}", path.display()))?,
        )),
        None => None,
    };
    let audit: Arc<dyn AuditSink> = match &journal {
        Some(sink) => Arc::clone(sink) as Arc<dyn AuditSink>,
        None => Arc::new(MemoryAuditSink::default()),
    };

    let engine = DecisionEngine::builder(cache, oracle)
        .with_config(config.engine_config())
        .with_dispatcher(dispatcher)
        .with_audit_sink(audit)
        .build()?;

    let report = engine.warm_up().await?;
    info!(
        records = report.records,
        patterns = report.patterns,
        skipped = report.skipped,
        "policy cache warmed"
    );

    for action in sample_actions()? {
        let verdict = engine.evaluate(action).await;
        info!(
            tool = verdict.target_tool(),
            decision = %verdict.decision(),
            "verdict rendered"
        );
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    }

    println!("{}", serde_json::to_string_pretty(&engine.snapshot())?);

    if let Some(journal) = &journal {
        let recorded = journal.tail(10).await?;
        info!(
            path = %journal.path().display(),
            recorded = recorded.len(),
            "audit journal written"
        );
    }

    let drained = engine.shutdown().await;
    info!(
        completed = drained.completed,
        abandoned = drained.abandoned,
        "shutdown complete"
    );
    Ok(())
}

fn sample_policies() -> Vec<PolicyRecord> {
    vec![
        PolicyRecord::new(
            "policy-slack",
            "Slack data hygiene",
            json!({
                "rule_id": "SL-001",
                "description": "Confidential material must not be posted to public channels",
                "target_pattern": "Slack_API_.*",
                "condition_text": "channel starts with '#' and message mentions confidential data",
                "severity": "HIGH",
                "action_on_violation": "BLOCK"
            }),
        ),
        PolicyRecord::new(
            "policy-github",
            "Repository safety",
            json!({
                "rule_id": "GH-001",
                "description": "Force pushes to protected branches need human review",
                "target_pattern": "GitHub_.*",
                "condition_text": "force is true and branch is main or release/*",
                "severity": "MEDIUM",
                "action_on_violation": "FLAG"
            }),
        ),
        PolicyRecord::new(
            "policy-legacy",
            "Retired mail rule",
            json!({
                "rule_id": "ML-001",
                "description": "Outbound mail to external domains is reviewed",
                "target_pattern": "Mail_.*",
                "condition_text": "recipient domain is not the company domain"
            }),
        )
        .inactive(),
        PolicyRecord::new(
            "policy-broken",
            "Malformed rule",
            json!({ "rule_id": "broken", "description": "too short" }),
        ),
    ]
}

fn sample_actions() -> Result<Vec<Action>> {
    Ok(vec![
        Action::builder("marketing-agent", "Slack_API_PostMessage")
            .argument("channel", "#general")
            .argument("message", "Attaching the confidential Q3 revenue forecast")
            .build()?,
        Action::builder("support-agent", "Slack_API_PostMessage")
            .argument("channel", "@dana")
            .argument("message", "Your ticket has been resolved")
            .build()?,
        Action::builder("release-agent", "GitHub_Push")
            .argument("branch", "main")
            .argument("force", true)
            .build()?,
        Action::builder("triage-agent", "Jira_CreateIssue")
            .argument("project", "OPS")
            .build()?,
    ])
}

/// Answers like a small local model would, including the usual noise
/// around the JSON object.
struct ScriptedOracle;

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn consult(&self, request: &OracleRequest) -> OracleResult<String> {
        let context = request.action_context();
        let tool = context["target_tool"].as_str().unwrap_or_default();
        let args = &context["tool_arguments"];
        let text = |key: &str| args[key].as_str().unwrap_or_default().to_lowercase();

        let reply = if tool.starts_with("Slack")
            && text("channel").starts_with('#')
            && text("message").contains("confidential")
        {
            "I checked the rules.\n```json\n{\"decision\": \"BLOCK\", \"rationale\": \"Confidential forecast posted to a public channel\", \"applied_rules\": [\"SL-001\"]}\n```".to_owned()
        } else if tool.starts_with("GitHub") && args["force"] == Value::Bool(true) {
            "Force push onto main. Output: {\"decision\": \"FLAG\", \"rationale\": \"Force push to a protected branch\", \"severity\": \"MEDIUM\"}".to_owned()
        } else {
            json!({
                "decision": "ALLOW",
                "rationale": "No rule condition applies",
                "severity": null,
                "applied_rules": []
            })
            .to_string()
        };
        Ok(reply)
    }
}
