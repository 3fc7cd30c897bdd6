//! Retrieval through the async front over the default encoder and reranker.

mod common;

use std::sync::Arc;

use kestrel::knowledge::{
    KnowledgeEngine, KnowledgeError, RetrievalConfig, SNAPSHOT_FILENAME, ScoreSource,
};
use kestrel::pipeline::AsyncRetriever;
use serde_json::json;
use tempfile::TempDir;

use common::fixtures::write_json;

const BILLING: &str = "计费规则：按调用次数计费，每千次调用0.5元";

fn write_source(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("knowledge_base.json");
    write_json(
        &path,
        &json!({
            "billing": {"rules": BILLING},
            "sla": ["系统可用性99.9%，全年无休", "故障响应时间小于15分钟"]
        }),
    );
    path
}

fn default_engine(dir: &TempDir) -> Arc<KnowledgeEngine> {
    let config = RetrievalConfig::new(write_source(dir), dir.path().join("index"));
    Arc::new(KnowledgeEngine::new(config).expect("engine"))
}

#[tokio::test]
async fn test_two_stage_retrieval_through_async_front() {
    let dir = TempDir::new().unwrap();
    let retriever = AsyncRetriever::new(default_engine(&dir));

    let hits = retriever.retrieve("计费规则").await;

    assert!(!hits.is_empty());
    assert!(hits[0].text().contains("计费规则"));
    assert!(hits.iter().all(|h| h.source == ScoreSource::Reranked));

    let again = retriever.retrieve("计费规则").await;
    assert_eq!(again, hits);
    assert_eq!(retriever.cached_queries(), 1);
    // The second call never reached the engine.
    assert_eq!(retriever.engine().stats().total_searches, 1);
}

#[tokio::test]
async fn test_concurrent_retrievals_build_index_once() {
    let dir = TempDir::new().unwrap();
    let retriever = AsyncRetriever::new(default_engine(&dir));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let retriever = retriever.clone();
            tokio::spawn(async move { retriever.retrieve_uncached("计费规则").await })
        })
        .collect();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap().unwrap());
    }

    assert!(results.windows(2).all(|w| w[0] == w[1]));
    let stats = retriever.engine().stats();
    assert!(stats.initialized);
    assert_eq!(stats.total_searches, 8);
    assert!(dir.path().join("index").join(SNAPSHOT_FILENAME).exists());
}

#[tokio::test]
async fn test_missing_source_reports_through_uncached_path() {
    let dir = TempDir::new().unwrap();
    let config = RetrievalConfig::new(dir.path().join("absent.json"), dir.path().join("index"));
    let retriever = AsyncRetriever::new(Arc::new(KnowledgeEngine::new(config).unwrap()));

    assert!(retriever.retrieve("计费规则").await.is_empty());
    assert_eq!(retriever.cached_queries(), 0);

    let err = retriever.retrieve_uncached("计费规则").await.unwrap_err();
    assert!(matches!(err, KnowledgeError::KnowledgeBaseNotFound { .. }));
}

#[tokio::test]
async fn test_reload_serves_new_content_after_clear() {
    let dir = TempDir::new().unwrap();
    let config =
        RetrievalConfig::new(write_source(&dir), dir.path().join("index")).lexical_only();
    let retriever = AsyncRetriever::new(Arc::new(KnowledgeEngine::new(config).unwrap()));
    let before = retriever.retrieve("故障响应").await;
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].source, ScoreSource::TextMatchFallback);

    write_json(
        &dir.path().join("knowledge_base.json"),
        &json!({"sla": ["故障响应时间小于5分钟，7x24小时值守", "故障响应由值班工程师负责处理"]}),
    );
    retriever.engine().reload().unwrap();

    // The async front still holds the old hits.
    assert_eq!(retriever.retrieve("故障响应").await, before);

    retriever.clear_cache();
    let after = retriever.retrieve("故障响应").await;
    assert_eq!(after.len(), 2);
    assert!(after.iter().all(|h| !h.text().contains("15分钟")));
}
