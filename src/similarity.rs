// 🔍 Similarity - Text pair → score in [0, 1]
//
// Primary path: sentence embeddings + cosine. Fallback: Jaccard overlap of
// lower-cased word sets. The fallback never fails, so scoring never fails.

use crate::config::EmbeddingConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::EmbeddingError;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Anything that scores a pair of texts.
///
/// Closures implement it too, which keeps merge tests free of models.
pub trait Similarity {
    fn score(&self, a: &str, b: &str) -> f64;
}

impl<F> Similarity for F
where
    F: Fn(&str, &str) -> f64,
{
    fn score(&self, a: &str, b: &str) -> f64 {
        self(a, b)
    }
}

// ============================================================================
// SCORE FUNCTIONS
// ============================================================================

/// Cosine similarity between two vectors.
/// Returns 0.0 for mismatched, empty or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut mag_a, mut mag_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f64::EPSILON {
        0.0
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}

/// Jaccard similarity of lower-cased whitespace token sets.
/// Returns 0.0 if either side has no tokens.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let tokens_a = word_set(a);
    let tokens_b = word_set(b);

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();

    intersection as f64 / union as f64
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

// ============================================================================
// SCORER
// ============================================================================

type ProviderLoader = Box<dyn Fn() -> Result<Box<dyn EmbeddingProvider>, EmbeddingError> + Send + Sync>;

/// Embedding-backed scorer with a lexical fallback.
///
/// The provider is loaded on first use, exactly once per scorer, even when
/// several threads score concurrently. A failed load is remembered and every
/// later call goes straight to the fallback.
pub struct SimilarityScorer {
    loader: ProviderLoader,
    provider: OnceLock<Option<Box<dyn EmbeddingProvider>>>,
}

impl SimilarityScorer {
    /// Scorer whose provider is built lazily by `loader`.
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Box<dyn EmbeddingProvider>, EmbeddingError> + Send + Sync + 'static,
    {
        SimilarityScorer {
            loader: Box::new(loader),
            provider: OnceLock::new(),
        }
    }

    /// Scorer around an already-built provider.
    pub fn with_provider(provider: Box<dyn EmbeddingProvider>) -> Self {
        SimilarityScorer {
            loader: Box::new(|| Err(EmbeddingError::Unavailable("provider already set".to_string()))),
            provider: OnceLock::from(Some(provider)),
        }
    }

    /// Scorer that only ever uses the lexical fallback.
    pub fn lexical_only() -> Self {
        Self::with_loader(|| Err(EmbeddingError::Unavailable("no embedding model configured".to_string())))
    }

    /// Scorer for the configured model, if any.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let Some(model_path) = config.model_path.clone() else {
            return Self::lexical_only();
        };

        #[cfg(feature = "onnx")]
        {
            let dimensions = config.dimensions;
            Self::with_loader(move || {
                let provider = crate::embedding::OnnxProvider::load(&model_path, dimensions)?;
                Ok(Box::new(provider) as Box<dyn EmbeddingProvider>)
            })
        }

        #[cfg(not(feature = "onnx"))]
        {
            Self::with_loader(move || {
                Err(EmbeddingError::Unavailable(format!(
                    "model {} configured but the `onnx` feature is disabled",
                    model_path.display()
                )))
            })
        }
    }

    fn provider(&self) -> Option<&dyn EmbeddingProvider> {
        self.provider
            .get_or_init(|| match (self.loader)() {
                Ok(provider) => {
                    info!(provider = provider.name(), "embedding provider ready");
                    Some(provider)
                }
                Err(e) => {
                    warn!(error = %e, "embedding provider unavailable, using lexical similarity");
                    None
                }
            })
            .as_deref()
    }

    /// True once a provider has loaded successfully.
    pub fn is_semantic(&self) -> bool {
        self.provider().is_some()
    }
}

impl Similarity for SimilarityScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        let (a, b) = (a.trim(), b.trim());
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let Some(provider) = self.provider() else {
            return jaccard_similarity(a, b);
        };

        match provider.encode(&[a, b]) {
            Ok(vectors) if vectors.len() == 2 => {
                // Below zero means "unrelated", same as zero
                cosine_similarity(&vectors[0], &vectors[1]).clamp(0.0, 1.0)
            }
            Ok(vectors) => {
                warn!(
                    provider = provider.name(),
                    returned = vectors.len(),
                    "embedding provider returned wrong batch size, using lexical similarity"
                );
                jaccard_similarity(a, b)
            }
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "encoding failed, using lexical similarity");
                jaccard_similarity(a, b)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Maps each text to a fixed vector by its first word.
    struct StubProvider;

    impl EmbeddingProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts
                .iter()
                .map(|text| match text.split_whitespace().next() {
                    Some("drill") => vec![1.0, 0.0],
                    Some("driver") => vec![0.8, 0.6],
                    _ => vec![-1.0, 0.0],
                })
                .collect())
        }
    }

    struct BrokenProvider;

    impl EmbeddingProvider for BrokenProvider {
        fn name(&self) -> &str {
            "broken"
        }

        fn encode(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::InferenceFailed {
                reason: "boom".to_string(),
            })
        }
    }

    #[test]
    fn test_cosine_basics() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard_similarity("Red Pen", "red pen"), 1.0);
        assert_eq!(jaccard_similarity("red pen", "blue pen"), 1.0 / 3.0);
        assert_eq!(jaccard_similarity("red", "   "), 0.0);
        assert_eq!(jaccard_similarity("", ""), 0.0);
    }

    #[test]
    fn test_empty_input_scores_zero() {
        let scorer = SimilarityScorer::with_provider(Box::new(StubProvider));
        assert_eq!(scorer.score("", "drill"), 0.0);
        assert_eq!(scorer.score("drill", "  "), 0.0);
    }

    #[test]
    fn test_semantic_score_is_clamped() {
        let scorer = SimilarityScorer::with_provider(Box::new(StubProvider));

        assert!((scorer.score("drill a", "drill b") - 1.0).abs() < 1e-6);
        assert!((scorer.score("drill", "driver") - 0.8).abs() < 1e-6);
        // Opposite vectors: cosine -1, reported as 0
        assert_eq!(scorer.score("drill", "hammer"), 0.0);
    }

    #[test]
    fn test_encoding_failure_falls_back_to_jaccard() {
        let scorer = SimilarityScorer::with_provider(Box::new(BrokenProvider));
        assert_eq!(scorer.score("red pen", "blue pen"), 1.0 / 3.0);
    }

    #[test]
    fn test_lexical_only() {
        let scorer = SimilarityScorer::lexical_only();
        assert!(!scorer.is_semantic());
        assert_eq!(scorer.score("Cordless Drill", "cordless drill"), 1.0);
    }

    #[test]
    fn test_missing_model_degrades_to_lexical() {
        let config = EmbeddingConfig {
            model_path: Some("/nonexistent/model.onnx".into()),
            dimensions: 384,
        };
        let scorer = SimilarityScorer::from_config(&config);

        assert!(!scorer.is_semantic());
        assert_eq!(scorer.score("red pen", "red pen"), 1.0);
    }

    #[test]
    fn test_loader_runs_once_across_threads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let scorer = Arc::new(SimilarityScorer::with_loader(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubProvider) as Box<dyn EmbeddingProvider>)
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scorer = Arc::clone(&scorer);
                std::thread::spawn(move || scorer.score("drill", "driver"))
            })
            .collect();

        for handle in handles {
            let score = handle.join().unwrap();
            assert!((score - 0.8).abs() < 1e-6);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_load_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let scorer = SimilarityScorer::with_loader(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(EmbeddingError::Unavailable("nope".to_string()))
        });

        scorer.score("a", "a");
        scorer.score("b", "b");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closure_is_a_similarity() {
        let always_half = |_: &str, _: &str| 0.5;
        assert_eq!(always_half.score("x", "y"), 0.5);
    }
}
