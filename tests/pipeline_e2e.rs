//! End-to-end pipeline tests over a scripted transport.

mod common;

use std::sync::Arc;

use kestrel::constants::NO_KNOWLEDGE_REPLY;
use kestrel::llm::{MockReply, MockTransport, NetworkState};
use kestrel::pipeline::{CaseOutcome, ReplyKind, SupportCase, SupportPipeline};
use kestrel::routing::RouteClass;
use serde_json::json;
use tempfile::TempDir;

use common::fixtures::{BILLING_RULE, SLA_RULE, pipeline_config, write_json};

fn pipeline(dir: &TempDir, transport: &Arc<MockTransport>) -> SupportPipeline {
    SupportPipeline::from_config_with_transport(&pipeline_config(dir.path()), transport.clone())
        .expect("pipeline should build")
}

#[tokio::test]
async fn test_batch_file_end_to_end() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::new());
    let pipeline = pipeline(&dir, &transport);

    let input = dir.path().join("cases.json");
    write_json(
        &input,
        &json!([
            {"case_id": "c1", "user_query": "你好"},
            {
                "case_id": "c2",
                "user_query": "调用计费规则",
                "api_status": "ERROR 502",
                "monitor_log": "INFO worker started\nERROR upstream timeout\nINFO retrying"
            },
            {"user_query": "如何开具增值税发票"}
        ]),
    );
    let output = dir.path().join("out").join("results.json");

    let summary = pipeline.run_batch_file(&input, &output).await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.success, 3);

    let outcomes: Vec<CaseOutcome> =
        serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
    assert_eq!(outcomes.len(), 3);

    assert_eq!(outcomes[0].case_id, "c1");
    assert_eq!(outcomes[0].mode, Some(RouteClass::Simple));
    assert_eq!(outcomes[0].reply_kind, ReplyKind::Generated);
    assert!(outcomes[0].alerts.is_empty());

    assert_eq!(outcomes[1].case_id, "c2");
    assert_eq!(outcomes[1].mode, Some(RouteClass::Complex));
    assert_eq!(outcomes[1].reply_kind, ReplyKind::Generated);
    assert_eq!(outcomes[1].alerts.len(), 1);

    assert!(outcomes[2].case_id.starts_with("req_"));
    assert_eq!(outcomes[2].reply_kind, ReplyKind::NoKnowledge);
    assert_eq!(outcomes[2].reply, NO_KNOWLEDGE_REPLY);

    // The unanswerable case never reaches the model.
    assert_eq!(transport.call_count(), 2);
    let rag = transport
        .requests()
        .into_iter()
        .find(|r| r.model == pipeline.client().config().complex_model)
        .expect("complex request");
    let prompt = &rag.messages.last().unwrap().content;
    assert!(prompt.contains(BILLING_RULE));
    assert!(prompt.contains("API: ERROR 502"));
}

#[tokio::test]
async fn test_repeated_failures_degrade_to_offline() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::new());
    transport.set_default(MockReply::status(500));
    let pipeline = pipeline(&dir, &transport);
    let max_failures = pipeline.client().config().max_failures as usize;

    for query in ["你好", "谢谢", "再见", "好的"].iter().cycle().take(max_failures + 1) {
        let outcome = pipeline.process_case(SupportCase::new(*query)).await;
        assert_eq!(outcome.reply_kind, ReplyKind::Offline);
        assert!(outcome.is_success());
        assert!(!outcome.reply.is_empty());
    }

    // Once degraded, no further calls go out.
    assert_eq!(transport.call_count(), max_failures);
    let status = pipeline.system_status();
    assert_eq!(status.network.state, NetworkState::Degraded);
    assert_eq!(status.network.offline_replies, max_failures as u64 + 1);

    let health = pipeline.check_health().await;
    assert!(!health.healthy);
    assert!(!health.components["llm"].ready);
    assert!(health.components["retriever"].ready);

    // Recovery after an operator reset.
    transport.set_default(MockReply::content("恢复正常"));
    pipeline.client().reset_network_state();
    let outcome = pipeline.process_case(SupportCase::new("你好")).await;
    assert_eq!(outcome.reply_kind, ReplyKind::Generated);
    assert_eq!(outcome.reply, "恢复正常");
}

#[tokio::test]
async fn test_directory_knowledge_source() {
    let dir = TempDir::new().unwrap();
    let mut config = pipeline_config(dir.path());
    let kb_dir = dir.path().join("kb");
    write_json(&kb_dir.join("01_billing.json"), &json!({"rules": BILLING_RULE}));
    write_json(&kb_dir.join("02_sla.json"), &json!({"sla": SLA_RULE}));
    config.retrieval.source_path = kb_dir;

    let transport = Arc::new(MockTransport::new());
    let pipeline =
        SupportPipeline::from_config_with_transport(&config, transport.clone()).unwrap();

    let outcome = pipeline
        .process_case(SupportCase::new("故障响应时间").with_id("sla-1"))
        .await;

    assert_eq!(outcome.mode, Some(RouteClass::Complex));
    assert_eq!(outcome.reply_kind, ReplyKind::Generated);
    let prompt = transport.requests()[0].messages.last().unwrap().content.clone();
    assert!(prompt.contains(SLA_RULE));
    assert!(!prompt.contains(BILLING_RULE));
}

#[tokio::test]
async fn test_warmup_then_benchmark() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::new());
    let pipeline = pipeline(&dir, &transport);

    let warmup = pipeline.warmup().await;
    assert_eq!(warmup.succeeded, warmup.attempted);

    let cases: Vec<_> = (0..12)
        .map(|i| SupportCase::new(format!("接口调用计费规则{i}")))
        .chain((0..4).map(|_| SupportCase::new("你好")))
        .collect();
    let report = pipeline.run_benchmark(cases, 4).await.unwrap();

    assert_eq!(report.samples, 16);
    assert_eq!(report.concurrency, 4);
    assert_eq!(report.success_rate, 1.0);
    assert!(report.latency.min_ms <= report.latency.p95_ms);
    assert!(report.latency.p95_ms <= report.latency.max_ms);

    let status = pipeline.system_status();
    assert_eq!(status.requests, 16);
    assert_eq!(status.admission.simple.usage_count, 4);
    assert_eq!(status.admission.complex.usage_count, 12);
    assert_eq!(status.admission.simple.in_use, 0);
    assert_eq!(status.admission.complex.in_use, 0);
}

#[tokio::test]
async fn test_health_check_reports_every_component() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::new());
    let pipeline = pipeline(&dir, &transport);

    let health = pipeline.check_health().await;

    assert!(health.healthy, "{health:?}");
    let body = serde_json::to_value(&health).unwrap();
    assert_eq!(body["status"], "healthy");
    for component in ["cache", "llm", "retriever", "router"] {
        assert_eq!(body["components"][component]["ready"], true, "{component}");
    }

    pipeline.shutdown();
    assert!(pipeline.is_shut_down());
}
