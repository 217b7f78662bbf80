use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use guard_audit::{AuditSink, MemoryAuditSink};
use guard_engine::{
    DecisionEngine, EngineConfig, Oracle, OracleError, OracleRequest, OracleResult, Outcome,
};
use guard_notify::{
    DispatcherConfig, NotificationCategory, NotificationDispatcher, NotifyResult, WebhookRequest,
    WebhookTransport,
};
use guard_policy::{CacheConfig, PolicyCache, PolicyRecord, StaticPolicyStore};
use guard_primitives::{Action, Decision, Severity};
use serde_json::json;
use tokio::time::Instant;

const BLOCK_URL: &str = "https://hooks.example.com/block";
const FLAG_URL: &str = "https://hooks.example.com/flag";
const SYSTEM_URL: &str = "https://hooks.example.com/system";

enum Step {
    Reply(&'static str),
    Fail,
    Hang,
    Panic,
}

struct ScriptedOracle {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn consult(&self, request: &OracleRequest) -> OracleResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(request.system_prompt().contains("Rule ID:"));
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(text)) => Ok(text.to_owned()),
            Some(Step::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Some(Step::Panic) => panic!("oracle client exploded"),
            Some(Step::Fail) | None => Err(OracleError::unavailable("connection refused")),
        }
    }
}

#[derive(Default)]
struct RecordingTransport {
    requests: Mutex<Vec<WebhookRequest>>,
}

impl RecordingTransport {
    fn count(&self, category: NotificationCategory) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.category == category)
            .count()
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn deliver(&self, request: WebhookRequest) -> NotifyResult<()> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

fn slack_rule(id: &str, severity: &str) -> PolicyRecord {
    PolicyRecord::new(
        "policy-slack",
        "Slack hygiene",
        json!({
            "rule_id": id,
            "description": "Confidential data must not reach public channels",
            "target_pattern": "Slack_API_.*",
            "condition_text": "channel starts with # and message is confidential",
            "severity": severity,
            "action_on_violation": "BLOCK"
        }),
    )
}

struct Harness {
    engine: DecisionEngine,
    oracle: Arc<ScriptedOracle>,
    transport: Arc<RecordingTransport>,
    audit: Arc<MemoryAuditSink>,
}

fn harness(records: Vec<PolicyRecord>, steps: Vec<Step>) -> Harness {
    let store = Arc::new(StaticPolicyStore::new(records));
    let cache = Arc::new(PolicyCache::new(store, CacheConfig::default()));
    let oracle = ScriptedOracle::new(steps);
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        transport.clone(),
        DispatcherConfig::default(),
    ));
    dispatcher.register(NotificationCategory::BlockAlert, BLOCK_URL).unwrap();
    dispatcher.register(NotificationCategory::FlagAlert, FLAG_URL).unwrap();
    dispatcher.register(NotificationCategory::SystemAlert, SYSTEM_URL).unwrap();
    let audit = Arc::new(MemoryAuditSink::default());

    let engine = DecisionEngine::builder(cache, oracle.clone())
        .with_dispatcher(dispatcher)
        .with_audit_sink(audit.clone() as Arc<dyn AuditSink>)
        .with_config(EngineConfig::default())
        .build()
        .unwrap();

    Harness {
        engine,
        oracle,
        transport,
        audit,
    }
}

fn slack_action() -> Action {
    Action::builder("marketing-agent", "Slack_API_PostMessage")
        .argument("channel", "#general")
        .build()
        .unwrap()
}

#[tokio::test]
async fn scenario_a_block_with_medium_severity() {
    let h = harness(
        vec![slack_rule("SL-001", "HIGH")],
        vec![Step::Reply(
            r#"{"decision":"BLOCK","rationale":"public channel","severity":"MEDIUM"}"#,
        )],
    );

    let evaluation = h.engine.evaluate_detailed(slack_action()).await;
    let verdict = &evaluation.verdict;

    assert_eq!(evaluation.outcome, Outcome::Finalized);
    assert_eq!(verdict.decision(), Decision::Block);
    assert_eq!(verdict.severity(), Some(Severity::Medium));
    assert_eq!(verdict.applied_rules(), ["SL-001".to_owned()]);
    assert_eq!(h.transport.count(NotificationCategory::BlockAlert), 1);

    let audits = h.audit.recent(10).await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].metadata.tool_arguments["channel"], "#general");
    assert_eq!(h.engine.snapshot().stats.block, 1);
}

#[tokio::test]
async fn scenario_b_prose_reply_fails_closed_and_still_notifies() {
    let h = harness(
        vec![slack_rule("SL-001", "MEDIUM")],
        vec![Step::Reply("Sure, I think this is fine")],
    );

    let evaluation = h.engine.evaluate_detailed(slack_action()).await;
    let verdict = &evaluation.verdict;

    assert_eq!(evaluation.outcome, Outcome::SafeBlock);
    assert_eq!(verdict.decision(), Decision::Block);
    assert_eq!(verdict.severity(), Some(Severity::High));
    assert_eq!(verdict.applied_rules(), ["PARSE-ERROR".to_owned()]);
    assert_eq!(h.transport.count(NotificationCategory::BlockAlert), 1);
}

#[tokio::test]
async fn invalid_enum_is_a_validation_block() {
    let h = harness(
        vec![slack_rule("SL-001", "MEDIUM")],
        vec![Step::Reply(r#"{"decision":"MAYBE","rationale":"unsure"}"#)],
    );

    let verdict = h.engine.evaluate(slack_action()).await;
    assert_eq!(verdict.decision(), Decision::Block);
    assert_eq!(verdict.applied_rules(), ["VALIDATION-ERROR".to_owned()]);
}

#[tokio::test]
async fn unmatched_tool_is_allowed_without_consulting_the_oracle() {
    let h = harness(vec![slack_rule("SL-001", "MEDIUM")], Vec::new());
    let action = Action::builder("calendar-agent", "Calendar_CreateEvent")
        .build()
        .unwrap();

    let evaluation = h.engine.evaluate_detailed(action).await;

    assert_eq!(evaluation.outcome, Outcome::AllowDefault);
    assert_eq!(evaluation.verdict.decision(), Decision::Allow);
    assert!(evaluation.verdict.applied_rules().is_empty());
    assert_eq!(evaluation.verdict.severity(), None);
    assert_eq!(h.oracle.calls(), 0);
    assert!(h.transport.requests.lock().unwrap().is_empty());
    assert_eq!(h.audit.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn two_failures_then_success_waits_one_then_two_seconds() {
    let h = harness(
        vec![slack_rule("SL-001", "MEDIUM")],
        vec![
            Step::Fail,
            Step::Reply("   "),
            Step::Reply(r#"{"decision":"ALLOW","rationale":"internal channel"}"#),
        ],
    );

    let started = Instant::now();
    let verdict = h.engine.evaluate(slack_action()).await;

    assert_eq!(h.oracle.calls(), 3);
    assert_eq!(verdict.decision(), Decision::Allow);
    assert_eq!(verdict.rationale(), "internal channel");
    assert_eq!(verdict.applied_rules(), ["SL-001".to_owned()]);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_end_in_emergency_block() {
    let h = harness(
        vec![slack_rule("SL-001", "LOW")],
        vec![Step::Fail, Step::Fail, Step::Fail],
    );

    let started = Instant::now();
    let evaluation = h.engine.evaluate_detailed(slack_action()).await;
    let verdict = &evaluation.verdict;

    assert_eq!(h.oracle.calls(), 3);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    assert_eq!(evaluation.outcome, Outcome::EmergencyBlock);
    assert_eq!(verdict.decision(), Decision::Block);
    assert_eq!(verdict.severity(), Some(Severity::High));
    assert_eq!(verdict.applied_rules(), ["SYSTEM-ERROR".to_owned()]);
    assert!(verdict
        .rationale()
        .starts_with("System error in policy evaluation:"));
    assert_eq!(h.transport.count(NotificationCategory::BlockAlert), 1);

    h.engine.shutdown().await;
    assert_eq!(h.transport.count(NotificationCategory::SystemAlert), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_oracle_attempts_time_out() {
    let h = harness(
        vec![slack_rule("SL-001", "MEDIUM")],
        vec![
            Step::Hang,
            Step::Reply(r#"{"decision":"BLOCK","rationale":"violates SL-001"}"#),
        ],
    );

    let started = Instant::now();
    let verdict = h.engine.evaluate(slack_action()).await;

    assert_eq!(h.oracle.calls(), 2);
    assert_eq!(verdict.decision(), Decision::Block);
    assert_eq!(verdict.severity(), Some(Severity::Medium));
    assert!(started.elapsed() >= Duration::from_secs(31));
}

#[tokio::test]
async fn panicking_oracle_is_contained() {
    let h = harness(vec![slack_rule("SL-001", "MEDIUM")], vec![Step::Panic]);

    let evaluation = h.engine.evaluate_detailed(slack_action()).await;

    assert_eq!(evaluation.outcome, Outcome::EmergencyBlock);
    assert_eq!(evaluation.verdict.severity(), Some(Severity::High));
    assert!(evaluation.verdict.rationale().contains("oracle client exploded"));
}

#[tokio::test]
async fn flag_goes_to_the_background_tier() {
    let h = harness(
        vec![slack_rule("SL-001", "MEDIUM")],
        vec![Step::Reply(
            "Analysis done.\n```json\n{\"decision\":\"FLAG\",\"rationale\":\"borderline\",\"applied_rules\":[\"sl-001\",\"XX-404\"]}\n```",
        )],
    );

    let verdict = h.engine.evaluate(slack_action()).await;
    assert_eq!(verdict.decision(), Decision::Flag);
    assert_eq!(verdict.applied_rules(), ["SL-001".to_owned()]);
    assert_eq!(h.transport.count(NotificationCategory::BlockAlert), 0);

    let report = h.engine.shutdown().await;
    assert_eq!(report.abandoned, 0);
    assert_eq!(h.transport.count(NotificationCategory::FlagAlert), 1);
}

#[tokio::test]
async fn block_always_carries_a_severity() {
    let replies = [
        r#"{"decision":"BLOCK","rationale":"no severity given"}"#,
        r#"{"decision":"BLOCK","rationale":"null severity","severity":null}"#,
        r#"{"decision":"ALLOW","rationale":"fine","severity":"HIGH"}"#,
        r#"{"decision":"block","rationale":"lowercase","severity":"low"}"#,
    ];
    let h = harness(
        vec![slack_rule("SL-001", "MEDIUM"), slack_rule("SL-002", "HIGH")],
        replies.iter().map(|r| Step::Reply(*r)).collect(),
    );

    for _ in replies {
        let verdict = h.engine.evaluate(slack_action()).await;
        match verdict.decision() {
            Decision::Block => assert!(verdict.severity().is_some()),
            Decision::Allow => assert_eq!(verdict.severity(), None),
            Decision::Flag => {}
        }
    }

    let snapshot = h.engine.snapshot();
    assert_eq!(snapshot.stats.total, 4);
    assert_eq!(snapshot.stats.block, 3);
    assert_eq!(snapshot.cache.entries, 2);
}
