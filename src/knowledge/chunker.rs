//! Flattens a JSON knowledge tree into documents and splits them into chunks.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{MIN_CHUNK_LENGTH, MIN_DOCUMENT_LENGTH, ORIGINAL_DOC_EXCERPT_CHARS};

/// A scalar leaf of the knowledge tree with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatDocument {
    pub content: String,
    /// Slash-joined object keys leading to this leaf.
    pub key_path: Option<String>,
    /// Index within the innermost enclosing array.
    pub list_index: Option<usize>,
}

#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
pub struct ChunkMetadata {
    /// Position in the chunk sequence.
    pub chunk_id: usize,
    /// Position of the source document in the flattened sequence.
    pub doc_index: usize,
    /// Character length of a windowed chunk. `None` for whole documents.
    pub length: Option<usize>,
    pub key_path: Option<String>,
    pub list_index: Option<usize>,
}

/// Retrieval unit. Immutable once the index is built.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize,
)]
pub struct KnowledgeChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Whole document for short chunks, or a leading excerpt ending in `...` for windows.
    pub original_doc: String,
}

/// Recursively flattens `value` into scalar documents.
///
/// Nulls and blank strings are skipped. Booleans and numbers use their JSON text.
pub fn flatten(value: &Value) -> Vec<FlatDocument> {
    let mut documents = Vec::new();
    flatten_into(value, None, None, &mut documents);
    documents
}

fn flatten_into(
    value: &Value,
    key_path: Option<&str>,
    list_index: Option<usize>,
    out: &mut Vec<FlatDocument>,
) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let joined = match key_path {
                    Some(parent) => format!("{parent}/{key}"),
                    None => key.clone(),
                };
                let joined = joined.trim_matches('/');
                flatten_into(child, Some(joined), list_index, out);
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                flatten_into(child, key_path, Some(idx), out);
            }
        }
        Value::Null => {}
        scalar => {
            let text = match scalar {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            if !text.is_empty() {
                out.push(FlatDocument {
                    content: text,
                    key_path: key_path.filter(|p| !p.is_empty()).map(str::to_string),
                    list_index,
                });
            }
        }
    }
}

/// Splits documents into chunks of at most `chunk_size` characters.
///
/// Documents longer than `chunk_size` are cut by a sliding window advancing
/// `chunk_size - chunk_overlap` characters; windows shorter than
/// [`MIN_CHUNK_LENGTH`] after trimming are dropped.
pub fn chunk_documents(
    documents: &[FlatDocument],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<KnowledgeChunk> {
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks: Vec<KnowledgeChunk> = Vec::new();

    for (doc_index, doc) in documents.iter().enumerate() {
        let chars: Vec<char> = doc.content.chars().collect();
        if chars.len() < MIN_DOCUMENT_LENGTH {
            continue;
        }

        if chars.len() <= chunk_size {
            chunks.push(KnowledgeChunk {
                text: doc.content.clone(),
                metadata: ChunkMetadata {
                    chunk_id: chunks.len(),
                    doc_index,
                    length: None,
                    key_path: doc.key_path.clone(),
                    list_index: doc.list_index,
                },
                original_doc: doc.content.clone(),
            });
            continue;
        }

        let excerpt: String = chars.iter().take(ORIGINAL_DOC_EXCERPT_CHARS).collect();
        let excerpt = format!("{excerpt}...");

        let mut start = 0;
        while start < chars.len() {
            let end = (start + chunk_size).min(chars.len());
            let window: String = chars[start..end].iter().collect();
            let length = end - start;
            start += step;

            if window.trim().chars().count() < MIN_CHUNK_LENGTH {
                continue;
            }

            chunks.push(KnowledgeChunk {
                metadata: ChunkMetadata {
                    chunk_id: chunks.len(),
                    doc_index,
                    length: Some(length),
                    key_path: doc.key_path.clone(),
                    list_index: doc.list_index,
                },
                text: window,
                original_doc: excerpt.clone(),
            });
        }
    }

    chunks
}
