//! Exact inner-product index over chunk embeddings, with an rkyv snapshot on disk.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use half::f16;
use rkyv::rancor::Error as RkyvError;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::chunker::KnowledgeChunk;
use super::error::{KnowledgeError, KnowledgeResult};
use crate::embedding::TextEncoder;

pub const SNAPSHOT_FILENAME: &str = "vector_index.rkyv";
const SNAPSHOT_TEMP_FILENAME: &str = "vector_index.rkyv.tmp";

/// Bumped whenever the snapshot layout or chunking rules change.
pub const SNAPSHOT_VERSION: &str = "kestrel-index-v1";

/// Encoder tag recorded for indexes built without embeddings.
pub const LEXICAL_ONLY_TAG: &str = "none";

#[derive(Archive, Serialize, Deserialize, Debug)]
struct IndexSnapshot {
    version: String,
    encoder: String,
    built_at: i64,
    chunks: Vec<KnowledgeChunk>,
    /// `f16` bit patterns, one row per chunk.
    embeddings: Vec<Vec<u16>>,
}

/// Encoder identity baked into snapshots. Changing backend or dimension forces a rebuild.
pub fn encoder_tag(encoder: Option<&dyn TextEncoder>) -> String {
    match encoder {
        Some(encoder) => format!("{}:{}", encoder.backend(), encoder.dim()),
        None => LEXICAL_ONLY_TAG.to_string(),
    }
}

/// Why a snapshot could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStatus {
    Missing,
    Stale,
    VersionMismatch,
    Corrupt,
}

/// Ordered chunks plus their normalized embeddings (empty in lexical-only mode).
#[derive(Debug, Default)]
pub struct VectorIndex {
    chunks: Vec<KnowledgeChunk>,
    embeddings: Vec<Vec<f16>>,
    encoder: String,
}

impl VectorIndex {
    /// Embeds every chunk in batches of `batch_size`.
    pub fn build(
        chunks: Vec<KnowledgeChunk>,
        encoder: Option<&dyn TextEncoder>,
        batch_size: usize,
    ) -> KnowledgeResult<Self> {
        let tag = encoder_tag(encoder);
        let Some(encoder) = encoder else {
            info!(chunks = chunks.len(), "Built lexical-only index");
            return Ok(Self {
                chunks,
                embeddings: Vec::new(),
                encoder: tag,
            });
        };

        let mut embeddings = Vec::with_capacity(chunks.len());
        for (batch_no, batch) in chunks.chunks(batch_size.max(1)).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = encoder
                .encode_batch(&texts)
                .map_err(|e| KnowledgeError::IndexBuild {
                    reason: e.to_string(),
                })?;
            embeddings.extend(vectors);
            debug!(batch = batch_no, embedded = embeddings.len(), "Embedding progress");
        }

        info!(
            chunks = chunks.len(),
            dim = encoder.dim(),
            encoder = %tag,
            "Built vector index"
        );

        Ok(Self {
            chunks,
            embeddings,
            encoder: tag,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn has_embeddings(&self) -> bool {
        !self.embeddings.is_empty()
    }

    pub fn encoder(&self) -> &str {
        &self.encoder
    }

    pub fn chunks(&self) -> &[KnowledgeChunk] {
        &self.chunks
    }

    pub fn chunk(&self, idx: usize) -> Option<&KnowledgeChunk> {
        self.chunks.get(idx)
    }

    /// Returns `(chunk index, similarity)` for scores strictly above `threshold`,
    /// highest first, insertion order on exact ties, at most `k` entries.
    pub fn search(&self, query: &[f16], threshold: f32, k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .embeddings
            .iter()
            .enumerate()
            .map(|(idx, row)| (idx, inner_product(query, row)))
            .filter(|(_, score)| *score > threshold)
            .collect();

        // Stable sort keeps insertion order for equal scores.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
    }

    /// Case-insensitive substring match, in chunk order, at most `k` hits.
    pub fn text_match(&self, query: &str, k: usize) -> Vec<usize> {
        let needle = query.to_lowercase();
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| chunk.text.to_lowercase().contains(&needle))
            .map(|(idx, _)| idx)
            .take(k)
            .collect()
    }

    /// Writes the snapshot atomically (temp file, then rename).
    pub fn save(&self, index_dir: &Path) -> KnowledgeResult<()> {
        fs::create_dir_all(index_dir)?;

        let snapshot = IndexSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            encoder: self.encoder.clone(),
            built_at: chrono::Utc::now().timestamp(),
            chunks: self.chunks.clone(),
            embeddings: self
                .embeddings
                .iter()
                .map(|row| bytemuck::cast_slice::<f16, u16>(row).to_vec())
                .collect(),
        };

        let bytes = rkyv::to_bytes::<RkyvError>(&snapshot).map_err(|e| KnowledgeError::Snapshot {
            reason: e.to_string(),
        })?;

        let temp_path = index_dir.join(SNAPSHOT_TEMP_FILENAME);
        let final_path = index_dir.join(SNAPSHOT_FILENAME);
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &final_path)?;

        info!(path = %final_path.display(), bytes = bytes.len(), "Index snapshot written");
        Ok(())
    }

    /// Loads the snapshot if it is present, not older than `source_mtime`, and
    /// built with the current version and `expected_encoder`.
    pub fn load(
        index_dir: &Path,
        source_mtime: Option<SystemTime>,
        expected_encoder: &str,
    ) -> Result<Self, SnapshotStatus> {
        let path = index_dir.join(SNAPSHOT_FILENAME);
        let Ok(meta) = fs::metadata(&path) else {
            return Err(SnapshotStatus::Missing);
        };

        if let (Some(source), Ok(snapshot_mtime)) = (source_mtime, meta.modified())
            && source > snapshot_mtime
        {
            debug!("Knowledge source newer than snapshot");
            return Err(SnapshotStatus::Stale);
        }

        let raw = fs::read(&path).map_err(|_| SnapshotStatus::Corrupt)?;
        let mut aligned = AlignedVec::<16>::with_capacity(raw.len());
        aligned.extend_from_slice(&raw);

        let snapshot = match rkyv::from_bytes::<IndexSnapshot, RkyvError>(&aligned) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt index snapshot");
                return Err(SnapshotStatus::Corrupt);
            }
        };

        if snapshot.version != SNAPSHOT_VERSION || snapshot.encoder != expected_encoder {
            warn!(
                found_version = %snapshot.version,
                found_encoder = %snapshot.encoder,
                expected_encoder,
                "Index snapshot version mismatch"
            );
            return Err(SnapshotStatus::VersionMismatch);
        }

        let has_rows = !snapshot.embeddings.is_empty();
        if has_rows && snapshot.embeddings.len() != snapshot.chunks.len() {
            warn!("Index snapshot row count does not match chunk count");
            return Err(SnapshotStatus::Corrupt);
        }

        let embeddings = snapshot
            .embeddings
            .iter()
            .map(|row| bytemuck::cast_slice::<u16, f16>(row).to_vec())
            .collect();

        info!(
            chunks = snapshot.chunks.len(),
            built_at = snapshot.built_at,
            "Loaded index snapshot"
        );

        Ok(Self {
            chunks: snapshot.chunks,
            embeddings,
            encoder: snapshot.encoder,
        })
    }
}

/// Inner product accumulated in `f32`.
pub fn inner_product(a: &[f16], b: &[f16]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x.to_f32() * y.to_f32()).sum()
}
