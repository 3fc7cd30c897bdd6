use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::embedding::{NgramEncoder, Reranker, RerankerError, TextEncoder};
use crate::error::{Classified, ErrorKind};
use crate::health::HealthCheckable;

#[derive(Debug)]
struct FailingScorer;

impl RelevanceScorer for FailingScorer {
    fn score_pairs(&self, _query: &str, _candidates: &[&str]) -> Result<Vec<f32>, RerankerError> {
        Err(RerankerError::scoring("scorer offline"))
    }

    fn is_model_backed(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct FailingEncoder;

impl TextEncoder for FailingEncoder {
    fn backend(&self) -> &'static str {
        "failing"
    }

    fn dim(&self) -> usize {
        8
    }

    fn encode(&self, text: &str) -> Result<Vec<half::f16>, crate::embedding::EmbeddingError> {
        // Index building succeeds so the failure surfaces at query time.
        if text.contains("计费") && text.chars().count() < 6 {
            return Err(crate::embedding::EmbeddingError::Inference {
                reason: "encoder crashed".to_string(),
            });
        }
        Ok(vec![half::f16::from_f32(0.5); 8])
    }
}

fn knowledge_json() -> serde_json::Value {
    json!({
        "billing": {
            "rules": "计费规则：按调用次数计费，每千次调用0.5元"
        },
        "sla": [
            "系统可用性99.9%，全年无休",
            "故障响应时间小于15分钟"
        ]
    })
}

fn write_source(dir: &TempDir, value: &serde_json::Value) -> std::path::PathBuf {
    let path = dir.path().join("knowledge_base.json");
    std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
    path
}

fn test_config(dir: &TempDir, source: std::path::PathBuf) -> RetrievalConfig {
    RetrievalConfig::new(source, dir.path().join("index"))
}

fn ngram_engine(config: RetrievalConfig, scorer: Option<Arc<dyn RelevanceScorer>>) -> KnowledgeEngine {
    KnowledgeEngine::with_models(config, Some(Arc::new(NgramEncoder::default())), scorer)
        .expect("engine")
}

fn scored(text: &str) -> ScoredChunk {
    ScoredChunk {
        chunk: chunk_documents(&flatten(&json!(text)), 300, 50)
            .pop()
            .expect("one chunk"),
        similarity: 1.0,
        rerank_score: None,
        source: ScoreSource::TextMatchFallback,
    }
}

// Chunker

#[test]
fn test_flatten_records_paths_and_indices() {
    let docs = flatten(&json!({
        "faq": {"billing": "按次计费"},
        "items": ["first", {"inner": 42}],
        "missing": null,
        "flag": true
    }));

    let billing = docs.iter().find(|d| d.content == "按次计费").unwrap();
    assert_eq!(billing.key_path.as_deref(), Some("faq/billing"));
    assert_eq!(billing.list_index, None);

    let first = docs.iter().find(|d| d.content == "first").unwrap();
    assert_eq!(first.key_path.as_deref(), Some("items"));
    assert_eq!(first.list_index, Some(0));

    let inner = docs.iter().find(|d| d.content == "42").unwrap();
    assert_eq!(inner.key_path.as_deref(), Some("items/inner"));
    assert_eq!(inner.list_index, Some(1));

    assert!(docs.iter().any(|d| d.content == "true"));
    assert_eq!(docs.len(), 4);
}

#[test]
fn test_flatten_skips_blank_strings() {
    let docs = flatten(&json!(["   ", "", "kept"]));
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].list_index, Some(2));
}

#[test]
fn test_short_document_is_single_chunk() {
    let chunks = chunk_documents(&flatten(&json!(["系统可用性99.9%"])), 300, 50);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "系统可用性99.9%");
    assert_eq!(chunks[0].original_doc, chunks[0].text);
    assert_eq!(chunks[0].metadata.length, None);
}

#[test]
fn test_tiny_documents_are_skipped() {
    let chunks = chunk_documents(&flatten(&json!(["你好", "ok", "有效的内容"])), 300, 50);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].metadata.doc_index, 2);
    assert_eq!(chunks[0].metadata.chunk_id, 0);
}

#[test]
fn test_long_document_sliding_window() {
    let doc: String = "计".repeat(700);
    let chunks = chunk_documents(&flatten(&json!([doc])), 300, 50);

    let lengths: Vec<_> = chunks.iter().map(|c| c.metadata.length).collect();
    assert_eq!(lengths, vec![Some(300), Some(300), Some(200)]);
    assert!(chunks.iter().all(|c| c.original_doc.ends_with("...")));
    assert_eq!(chunks[0].original_doc.chars().count(), 203);
    assert_eq!(
        chunks.iter().map(|c| c.metadata.chunk_id).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
}

#[test]
fn test_short_trailing_window_dropped() {
    let doc: String = "abcdefghij".repeat(3) + "xy";
    let chunks = chunk_documents(&flatten(&json!([doc])), 20, 5);

    // Windows start at 0, 15, 30; the last holds two characters.
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.text.trim().chars().count() >= 10));
}

// Index

#[test]
fn test_index_threshold_is_exclusive_and_ordered() {
    let encoder = NgramEncoder::default();
    let chunks = chunk_documents(
        &flatten(&json!(["计费规则说明文档", "计费规则说明文档", "系统可用性很高"])),
        300,
        50,
    );
    let index = VectorIndex::build(chunks, Some(&encoder), 2).unwrap();
    let query = encoder.encode("计费规则说明文档").unwrap();

    let hits = index.search(&query, 0.35, 10);
    assert_eq!(hits.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1]);
    assert!(hits.iter().all(|(_, s)| *s > 0.35));

    let exact = hits[0].1;
    assert!(index.search(&query, exact, 10).is_empty());
}

#[test]
fn test_index_text_match_case_insensitive() {
    let chunks = chunk_documents(
        &flatten(&json!(["API计费说明：按次收费", "系统可用性99.9%"])),
        300,
        50,
    );
    let index = VectorIndex::build(chunks, None, 64).unwrap();

    assert!(!index.has_embeddings());
    assert_eq!(index.text_match("api计费", 3), vec![0]);
    assert!(index.text_match("不存在", 3).is_empty());
}

#[test]
fn test_snapshot_roundtrip() {
    let dir = TempDir::new().unwrap();
    let encoder = NgramEncoder::default();
    let chunks = chunk_documents(&flatten(&knowledge_json()), 300, 50);
    let index = VectorIndex::build(chunks.clone(), Some(&encoder), 64).unwrap();
    index.save(dir.path()).unwrap();

    let loaded = VectorIndex::load(dir.path(), None, index.encoder()).unwrap();
    assert_eq!(loaded.chunks(), chunks.as_slice());
    assert!(loaded.has_embeddings());

    let query = encoder.encode("计费规则").unwrap();
    assert_eq!(loaded.search(&query, 0.35, 5), index.search(&query, 0.35, 5));
}

#[test]
fn test_snapshot_rejected_when_stale_or_mismatched() {
    let dir = TempDir::new().unwrap();
    let chunks = chunk_documents(&flatten(&knowledge_json()), 300, 50);
    let index = VectorIndex::build(chunks, None, 64).unwrap();
    index.save(dir.path()).unwrap();

    let future = SystemTime::now() + Duration::from_secs(3600);
    assert_eq!(
        VectorIndex::load(dir.path(), Some(future), "none").unwrap_err(),
        index::SnapshotStatus::Stale
    );
    assert_eq!(
        VectorIndex::load(dir.path(), None, "ngram:512").unwrap_err(),
        index::SnapshotStatus::VersionMismatch
    );
}

#[test]
fn test_corrupt_snapshot_detected() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(SNAPSHOT_FILENAME), b"not an archive").unwrap();

    assert_eq!(
        VectorIndex::load(dir.path(), None, "none").unwrap_err(),
        index::SnapshotStatus::Corrupt
    );
    assert_eq!(
        VectorIndex::load(&dir.path().join("missing"), None, "none").unwrap_err(),
        index::SnapshotStatus::Missing
    );
}

// Query cache

#[test]
fn test_query_cache_hit_and_expiry() {
    let cache = QueryCache::new(Duration::from_secs(60), 10);
    let now = Instant::now();
    cache.insert_at([1; 32], vec![scored("计费规则说明")], now);

    assert!(cache.get_at(&[1; 32], now + Duration::from_secs(30)).is_some());
    assert!(cache.get_at(&[1; 32], now + Duration::from_secs(61)).is_none());
    assert!(cache.is_empty());
}

#[test]
fn test_query_cache_skips_empty_results() {
    let cache = QueryCache::new(Duration::from_secs(60), 10);
    cache.insert([2; 32], Vec::new());
    assert!(cache.is_empty());
}

#[test]
fn test_query_cache_evicts_expired_first() {
    let cache = QueryCache::new(Duration::from_secs(10), 3);
    let start = Instant::now();
    cache.insert_at([1; 32], vec![scored("第一条记录内容")], start);
    cache.insert_at([2; 32], vec![scored("第二条记录内容")], start);

    let later = start + Duration::from_secs(20);
    cache.insert_at([3; 32], vec![scored("第三条记录内容")], later);
    cache.insert_at([4; 32], vec![scored("第四条记录内容")], later);

    assert_eq!(cache.len(), 2);
    assert!(cache.get_at(&[3; 32], later).is_some());
    assert!(cache.get_at(&[4; 32], later).is_some());
}

#[test]
fn test_query_cache_evicts_oldest_fifth() {
    let cache = QueryCache::new(Duration::from_secs(3600), 10);
    let start = Instant::now();
    for i in 0..11u8 {
        cache.insert_at(
            [i; 32],
            vec![scored("缓存的检索结果")],
            start + Duration::from_secs(i as u64),
        );
    }

    let now = start + Duration::from_secs(20);
    assert_eq!(cache.len(), 9);
    assert!(cache.get_at(&[0; 32], now).is_none());
    assert!(cache.get_at(&[1; 32], now).is_none());
    assert!(cache.get_at(&[2; 32], now).is_some());
    assert!(cache.get_at(&[10; 32], now).is_some());
}

// Engine

#[test]
fn test_lexical_fallback_scenario() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &json!(["API计费说明：按调用次数收费", "系统可用性99.9%，全年无休"]));
    let engine = KnowledgeEngine::new(test_config(&dir, source).lexical_only()).unwrap();

    let results = engine.search("计费", None).unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].text().contains("计费"));
    assert_eq!(results[0].source, ScoreSource::TextMatchFallback);
    assert_eq!(results[0].similarity, 1.0);
    assert_eq!(engine.stats().fallback_searches, 1);
}

#[test]
fn test_empty_directory_yields_no_results() {
    let dir = TempDir::new().unwrap();
    let kb_dir = dir.path().join("kb");
    std::fs::create_dir_all(&kb_dir).unwrap();
    let engine = ngram_engine(test_config(&dir, kb_dir), Some(Arc::new(Reranker::lexical())));

    let results = engine.search("anything", None).unwrap();
    assert!(results.is_empty());
    assert_eq!(engine.stats().index_size, 0);
}

#[test]
fn test_directory_source_reads_json_files_in_order() {
    let dir = TempDir::new().unwrap();
    let kb_dir = dir.path().join("kb");
    std::fs::create_dir_all(&kb_dir).unwrap();
    std::fs::write(kb_dir.join("b.json"), r#"["第二个文件的内容"]"#).unwrap();
    std::fs::write(kb_dir.join("a.json"), r#"["第一个文件的内容"]"#).unwrap();
    std::fs::write(kb_dir.join("notes.txt"), "被忽略的文本文件").unwrap();

    let engine = KnowledgeEngine::new(test_config(&dir, kb_dir).lexical_only()).unwrap();
    let results = engine.search("文件的内容", Some(5)).unwrap();

    let texts: Vec<_> = results.iter().map(ScoredChunk::text).collect();
    assert_eq!(texts, vec!["第一个文件的内容", "第二个文件的内容"]);
}

#[test]
fn test_missing_source_is_knowledge_base_not_found() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, dir.path().join("nope.json"));

    let eager = KnowledgeEngine::new(config.clone().with_lazy_load(false));
    let err = eager.unwrap_err();
    assert!(matches!(err, KnowledgeError::KnowledgeBaseNotFound { .. }));
    assert_eq!(err.kind(), ErrorKind::KnowledgeBaseNotFound);

    let lazy = KnowledgeEngine::new(config).unwrap();
    assert!(lazy.search("计费", None).is_err());
}

#[test]
fn test_invalid_json_is_index_build_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    let engine = KnowledgeEngine::new(test_config(&dir, path).lexical_only()).unwrap();
    let err = engine.search("计费", None).unwrap_err();

    assert!(matches!(err, KnowledgeError::InvalidSource { .. }));
    assert_eq!(err.kind(), ErrorKind::VectorIndexBuild);
}

#[test]
fn test_two_stage_results_are_reranked() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &knowledge_json());
    let engine = ngram_engine(test_config(&dir, source), Some(Arc::new(Reranker::lexical())));

    let results = engine.search("计费规则", None).unwrap();

    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.source == ScoreSource::Reranked));
    assert!(results.iter().all(|r| r.rerank_score.unwrap() > 0.5));
    assert!(
        results
            .windows(2)
            .all(|w| w[0].rerank_score >= w[1].rerank_score)
    );
    assert!(results[0].text().contains("计费规则"));

    let stats = engine.stats();
    assert_eq!(stats.vector_searches, 1);
    assert_eq!(stats.rerank_triggered, 1);
    assert!(stats.has_embedding_model);
    assert!(!stats.has_reranker_model);
}

#[test]
fn test_rerank_failure_falls_back_to_vector_results() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &knowledge_json());
    let engine = ngram_engine(test_config(&dir, source), Some(Arc::new(FailingScorer)));

    let results = engine.search("计费规则", None).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source, ScoreSource::VectorFallback);
    assert!(results[0].rerank_score.is_none());
    assert!(engine.stats().last_error.is_some());
}

#[test]
fn test_without_reranker_returns_vector_results() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &knowledge_json());
    let engine = ngram_engine(test_config(&dir, source).with_top_k(1), None);

    let results = engine.search("计费规则", None).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source, ScoreSource::Vector);
    assert!(results[0].similarity > 0.35);
}

#[test]
fn test_encoder_failure_uses_text_match() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &knowledge_json());
    let engine = KnowledgeEngine::with_models(
        test_config(&dir, source),
        Some(Arc::new(FailingEncoder)),
        None,
    )
    .unwrap();

    let results = engine.search("计费", None).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source, ScoreSource::TextMatchFallback);
    assert!(engine.stats().last_error.unwrap().contains("encoder crashed"));
}

#[test]
fn test_query_cache_serves_repeat_searches() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &knowledge_json());
    let engine = ngram_engine(test_config(&dir, source), Some(Arc::new(Reranker::lexical())));

    let first = engine.search("计费规则", None).unwrap();
    let second = engine.search("计费规则", None).unwrap();

    assert_eq!(first, second);
    let stats = engine.stats();
    assert_eq!(stats.total_searches, 2);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_size, 1);

    engine.clear_cache();
    assert_eq!(engine.stats().cache_size, 0);
}

#[test]
fn test_top_k_changes_cache_identity() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &json!(["计费说明一", "计费说明二", "计费说明三"]));
    let engine = KnowledgeEngine::new(test_config(&dir, source).lexical_only()).unwrap();

    assert_eq!(engine.search("计费说明", Some(1)).unwrap().len(), 1);
    assert_eq!(engine.search("计费说明", Some(3)).unwrap().len(), 3);
    assert_eq!(engine.stats().cache_hits, 0);
}

#[test]
fn test_empty_query_returns_nothing() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &knowledge_json());
    let engine = KnowledgeEngine::new(test_config(&dir, source).lexical_only()).unwrap();

    assert!(engine.search("   ", None).unwrap().is_empty());
    assert_eq!(engine.stats().total_searches, 0);
    assert!(!engine.is_initialized());
}

#[test]
fn test_snapshot_reused_by_next_engine() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &knowledge_json());
    let config = test_config(&dir, source.clone());

    let first = ngram_engine(config.clone().with_lazy_load(false), None);
    assert!(dir.path().join("index").join(SNAPSHOT_FILENAME).exists());
    let expected = first.search("计费规则", None).unwrap();

    // Source removed: the snapshot still serves queries.
    std::fs::remove_file(&source).unwrap();
    let second = ngram_engine(config, None);
    assert_eq!(second.search("计费规则", None).unwrap(), expected);
}

#[test]
fn test_reload_picks_up_new_content() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &json!(["旧的知识条目内容"]));
    let engine = KnowledgeEngine::new(test_config(&dir, source.clone()).lexical_only()).unwrap();
    assert_eq!(engine.search("知识条目", None).unwrap().len(), 1);

    write_source(&dir, &json!(["新的知识条目内容", "另一个知识条目"]));
    engine.reload().unwrap();

    assert_eq!(engine.search("知识条目", None).unwrap().len(), 2);
}

#[test]
fn test_warmup_populates_cache() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &knowledge_json());
    let engine = KnowledgeEngine::new(test_config(&dir, source).lexical_only()).unwrap();

    let succeeded = engine.warmup(&["计费", "系统可用性", ""]);

    assert_eq!(succeeded, 3);
    assert_eq!(engine.stats().cache_size, 2);
}

#[tokio::test]
async fn test_health_reflects_index_state() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, &knowledge_json());
    let engine = KnowledgeEngine::new(test_config(&dir, source).lexical_only()).unwrap();

    assert!(engine.check_health().await.ready);
    engine.initialize().unwrap();
    let report = engine.check_health().await;
    assert!(report.ready);
    assert_eq!(report.detail["index_size"], 3);

    let missing = KnowledgeEngine::new(test_config(&dir, dir.path().join("gone.json"))).unwrap();
    assert!(!missing.check_health().await.ready);
}
