//! Embedding computation and vector utilities.
//!
//! An [`Embedder`] is constructed once at startup and shared by the watcher
//! and the query engine, so every stored vector and every query vector come
//! from the same path. Two paths exist:
//!
//! - **Local model** (feature `local-embeddings`) — fastembed
//!   `all-minilm-l6-v2`, 384 dims, loaded once and reused.
//! - **`token-hash-v1` fallback** — a deterministic 64-dim token-count
//!   vector, always available. Used when the model feature is off or the
//!   model fails to load.
//!
//! All produced vectors are unit-norm; the all-zero vector stands in for
//! empty input. The model identifier travels with every stored vector so a
//! mixed store remains detectable; similarity across different models is not
//! defined and scores as zero.
//!
//! Vector utilities mirror the storage encoding:
//! - [`vec_to_blob`] — little-endian f32 bytes for SQLite BLOB storage
//! - [`blob_to_vec`] — the inverse
//! - [`cosine_similarity`] — 0.0 on length mismatch or empty input

use sha2::{Digest, Sha256};

/// Model identifier of the deterministic fallback scheme.
pub const FALLBACK_MODEL_ID: &str = "token-hash-v1";
/// Dimensionality of the fallback vectors.
pub const FALLBACK_DIMS: usize = 64;

/// Model identifier of the local sentence-embedding model.
pub const LOCAL_MODEL_ID: &str = "all-minilm-l6-v2";
/// Dimensionality of the local model's vectors.
pub const LOCAL_MODEL_DIMS: usize = 384;

/// Process-wide embedding handle.
pub struct Embedder {
    #[cfg(feature = "local-embeddings")]
    model: Option<std::sync::Mutex<fastembed::TextEmbedding>>,
    model_id: String,
    dims: usize,
}

impl Embedder {
    /// Construct the embedder, preferring the local model when it loads.
    ///
    /// A model-load failure is not fatal: the fallback takes over and a
    /// warning is logged.
    pub fn new() -> Self {
        #[cfg(feature = "local-embeddings")]
        {
            match fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
                    .with_show_download_progress(false),
            ) {
                Ok(model) => {
                    return Self {
                        model: Some(std::sync::Mutex::new(model)),
                        model_id: LOCAL_MODEL_ID.to_string(),
                        dims: LOCAL_MODEL_DIMS,
                    };
                }
                Err(e) => {
                    tracing::warn!("embedding model unavailable, using {}: {}", FALLBACK_MODEL_ID, e);
                }
            }
        }

        Self::fallback()
    }

    /// Construct an embedder pinned to the `token-hash-v1` fallback.
    pub fn fallback() -> Self {
        Self {
            #[cfg(feature = "local-embeddings")]
            model: None,
            model_id: FALLBACK_MODEL_ID.to_string(),
            dims: FALLBACK_DIMS,
        }
    }

    /// The identifier stored alongside every vector this handle produces.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Whether this build can serve the named sentence-embedding model.
    pub fn is_model_available(model_name: &str) -> bool {
        cfg!(feature = "local-embeddings") && model_name == LOCAL_MODEL_ID
    }

    /// Compute a unit-norm vector for `text`, returning `(vector, model_id)`.
    ///
    /// Empty input yields the all-zero vector. A model failure mid-flight
    /// falls back to `token-hash-v1` for this call.
    pub fn embed(&self, text: &str) -> (Vec<f32>, String) {
        if text.is_empty() {
            return (vec![0.0; self.dims], self.model_id.clone());
        }

        #[cfg(feature = "local-embeddings")]
        if let Some(model) = &self.model {
            let mut guard = model.lock().expect("embedding model lock");
            match guard.embed(vec![text.to_string()], None) {
                Ok(mut vectors) if !vectors.is_empty() => {
                    let mut vector = vectors.remove(0);
                    normalize(&mut vector);
                    return (vector, self.model_id.clone());
                }
                Ok(_) => {
                    tracing::warn!("embedding model returned no vector, falling back");
                }
                Err(e) => {
                    tracing::warn!("embedding failed, falling back to {}: {}", FALLBACK_MODEL_ID, e);
                }
            }
            return (
                hash_embedding(text, FALLBACK_DIMS),
                FALLBACK_MODEL_ID.to_string(),
            );
        }

        (
            hash_embedding(text, FALLBACK_DIMS),
            FALLBACK_MODEL_ID.to_string(),
        )
    }
}

impl Default for Embedder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lower-cased alphanumeric runs of length >= 2.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            if current.chars().count() >= 2 {
                tokens.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    if current.chars().count() >= 2 {
        tokens.push(current);
    }
    tokens
}

/// Map a token to a bucket with a stable hash (first 8 bytes of SHA-256).
fn token_bucket(token: &str, dims: usize) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(bytes) % dims as u64) as usize
}

/// The `token-hash-v1` scheme: per-bucket token counts, unit-normalized.
///
/// Deterministic; empty input yields the all-zero vector.
pub fn hash_embedding(text: &str, dims: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dims];
    for token in tokenize(text) {
        vector[token_bucket(&token, dims)] += 1.0;
    }
    normalize(&mut vector);
    vector
}

/// Scale to unit length; the zero vector is left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical_unit_vectors() {
        let v = vec![0.6, 0.8];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_returns_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[]), 0.0);
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
    }

    #[test]
    fn test_cosine_different_lengths_returns_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_tokenize_filters_short_tokens() {
        let tokens = tokenize("I am a big fox");
        assert!(!tokens.contains(&"i".to_string()));
        assert!(!tokens.contains(&"a".to_string()));
        assert!(tokens.contains(&"am".to_string()));
        assert!(tokens.contains(&"big".to_string()));
        assert!(tokens.contains(&"fox".to_string()));
    }

    #[test]
    fn test_tokenize_lowercases_and_splits_on_punctuation() {
        let tokens = tokenize("Hello-World! Test123");
        assert!(tokens.contains(&"hello".to_string()));
        assert!(tokens.contains(&"world".to_string()));
        assert!(tokens.contains(&"test123".to_string()));
    }

    #[test]
    fn test_hash_embedding_unit_norm() {
        let vector = hash_embedding("hello world", FALLBACK_DIMS);
        assert_eq!(vector.len(), FALLBACK_DIMS);
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embedding_empty_is_zero_vector() {
        let vector = hash_embedding("", FALLBACK_DIMS);
        assert_eq!(vector.len(), FALLBACK_DIMS);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_hash_embedding_deterministic() {
        assert_eq!(
            hash_embedding("kubernetes cluster", FALLBACK_DIMS),
            hash_embedding("kubernetes cluster", FALLBACK_DIMS)
        );
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let mut zero = vec![0.0, 0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_fallback_embedder_reports_token_hash_model() {
        let embedder = Embedder::fallback();
        let (vector, model) = embedder.embed("hello world");
        assert_eq!(model, FALLBACK_MODEL_ID);
        assert_eq!(vector.len(), FALLBACK_DIMS);
    }

    #[test]
    fn test_fallback_embedder_empty_text_zero_vector() {
        let embedder = Embedder::fallback();
        let (vector, model) = embedder.embed("");
        assert_eq!(model, FALLBACK_MODEL_ID);
        assert_eq!(vector.len(), FALLBACK_DIMS);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[cfg(not(feature = "local-embeddings"))]
    #[test]
    fn test_model_unavailable_without_feature() {
        assert!(!Embedder::is_model_available(LOCAL_MODEL_ID));
    }

    #[test]
    fn test_overlapping_text_scores_higher_than_unrelated() {
        let a = hash_embedding("postgres backup compression", FALLBACK_DIMS);
        let b = hash_embedding("postgres backup strategy", FALLBACK_DIMS);
        let c = hash_embedding("unrelated words entirely different", FALLBACK_DIMS);
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }
}
