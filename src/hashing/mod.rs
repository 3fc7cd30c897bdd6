//! BLAKE3 digests used as cache keys across tiers.

use blake3::Hasher;

/// Full 32-byte digest of an arbitrary cache key.
#[inline]
pub fn digest_key(key: &str) -> [u8; 32] {
    *blake3::hash(key.as_bytes()).as_bytes()
}

/// Lowercase hex form of [`digest_key`], used for file names and shared-tier keys.
#[inline]
pub fn digest_hex(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

/// Hex-encodes an existing digest.
pub fn to_hex(digest: &[u8; 32]) -> String {
    blake3::Hash::from_bytes(*digest).to_hex().to_string()
}

/// Parses a 64-char hex digest back into bytes.
pub fn from_hex(hex: &str) -> Option<[u8; 32]> {
    blake3::Hash::from_hex(hex).ok().map(|h| *h.as_bytes())
}

/// Computes a 64-bit hash of `data`, truncated from the 256-bit BLAKE3 output.
///
/// Fine for in-process map keys. Anything persisted should use the full digest.
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(bytes)
}

/// Identity of a retrieval query in the engine's query cache.
pub fn hash_query(query: &str, top_k: usize) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(query.as_bytes());
    hasher.update(b"|");
    hasher.update(&(top_k as u64).to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// Identity of a chat-completion request: `(model, messages, temperature)`.
///
/// Fields are length-prefixed so that `("ab", "c")` and `("a", "bc")` differ.
pub fn hash_request<'a, I>(model: &str, messages: I, temperature: f32) -> [u8; 32]
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut hasher = Hasher::new();
    update_prefixed(&mut hasher, model.as_bytes());
    for (role, content) in messages {
        update_prefixed(&mut hasher, role.as_bytes());
        update_prefixed(&mut hasher, content.as_bytes());
    }
    hasher.update(&temperature.to_bits().to_le_bytes());
    *hasher.finalize().as_bytes()
}

fn update_prefixed(hasher: &mut Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
