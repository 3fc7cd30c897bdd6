use super::*;

fn dot(a: &[f16], b: &[f16]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x.to_f32() * y.to_f32()).sum()
}

fn norm(v: &[f16]) -> f32 {
    dot(v, v).sqrt()
}

#[test]
fn test_ngram_output_dimension() {
    let encoder = NgramEncoder::new(128).expect("valid dim");
    let v = encoder.encode("系统可用性").expect("encode");
    assert_eq!(v.len(), 128);
    assert_eq!(encoder.dim(), 128);
}

#[test]
fn test_ngram_rejects_zero_dim() {
    assert!(NgramEncoder::new(0).is_err());
}

#[test]
fn test_ngram_is_deterministic() {
    let encoder = NgramEncoder::default();
    let a = encoder.encode("API计费说明").expect("encode");
    let b = encoder.encode("API计费说明").expect("encode");
    assert_eq!(a, b);
}

#[test]
fn test_ngram_vectors_are_normalized() {
    let encoder = NgramEncoder::default();
    let v = encoder.encode("如何配置 webhook 告警").expect("encode");
    assert!((norm(&v) - 1.0).abs() < 0.01);
}

#[test]
fn test_ngram_empty_text_is_zero_vector() {
    let encoder = NgramEncoder::default();
    let v = encoder.encode("  ，。！ ").expect("encode");
    assert!(v.iter().all(|x| x.to_f32() == 0.0));
}

#[test]
fn test_ngram_case_insensitive() {
    let encoder = NgramEncoder::default();
    let upper = encoder.encode("API").expect("encode");
    let lower = encoder.encode("api").expect("encode");
    assert_eq!(upper, lower);
}

#[test]
fn test_ngram_related_text_scores_higher() {
    let encoder = NgramEncoder::default();
    let query = encoder.encode("计费规则").expect("encode");
    let related = encoder.encode("计费规则：按调用次数计费").expect("encode");
    let unrelated = encoder.encode("系统可用性99.9%").expect("encode");

    assert!(dot(&query, &related) > dot(&query, &unrelated));
    assert!(dot(&query, &related) > 0.35);
}

#[test]
fn test_batch_matches_single() {
    let encoder = NgramEncoder::default();
    let batch = encoder.encode_batch(&["你好", "部署"]).expect("batch");
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0], encoder.encode("你好").expect("encode"));
    assert_eq!(batch[1], encoder.encode("部署").expect("encode"));
}

#[test]
fn test_load_encoder_disabled() {
    let encoder = load_encoder(&EncoderConfig::Disabled).expect("load");
    assert!(encoder.is_none());
}

#[test]
fn test_load_encoder_default_is_ngram() {
    let encoder = load_encoder(&EncoderConfig::default())
        .expect("load")
        .expect("some encoder");
    assert_eq!(encoder.backend(), "ngram");
}

#[test]
fn test_bert_missing_files() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let result = BertEncoder::load(dir.path(), ENCODER_MAX_SEQ_LEN);
    assert!(matches!(result, Err(EmbeddingError::MissingFile { .. })));
}

#[test]
fn test_config_validate() {
    assert!(EncoderConfig::default().validate().is_ok());
    assert!(EncoderConfig::Ngram { dim: 0 }.validate().is_err());
    assert!(EncoderConfig::bert("").validate().is_err());
    assert!(EncoderConfig::Disabled.validate().is_ok());
}
