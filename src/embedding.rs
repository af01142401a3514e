//! Embedding providers used by the similarity scorer.
//!
//! The ONNX provider is compiled only with the `onnx` feature. Without it the
//! scorer runs on the lexical fallback alone.

use crate::error::EmbeddingError;

/// Text → dense vector encoder.
pub trait EmbeddingProvider: Send + Sync {
    /// Human-readable provider name for logs.
    fn name(&self) -> &str;

    /// Encode a batch of texts, one vector per input, in input order.
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxProvider;

#[cfg(feature = "onnx")]
mod onnx {
    use super::EmbeddingProvider;
    use crate::error::EmbeddingError;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::path::Path;
    use std::sync::Mutex;
    use tracing::debug;

    /// Sentence-embedding model run through ONNX Runtime.
    ///
    /// `Session::run` needs `&mut self`, hence the mutex.
    pub struct OnnxProvider {
        session: Mutex<Session>,
        dimensions: usize,
        model_name: String,
    }

    impl OnnxProvider {
        pub fn load(model_path: &Path, dimensions: usize) -> Result<Self, EmbeddingError> {
            let load_failed = |reason: String| EmbeddingError::ModelLoadFailed {
                path: model_path.display().to_string(),
                reason,
            };

            if !model_path.exists() {
                return Err(load_failed("model file not found".to_string()));
            }

            let session = Session::builder()
                .map_err(|e| load_failed(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e| load_failed(e.to_string()))?
                .commit_from_file(model_path)
                .map_err(|e| load_failed(e.to_string()))?;

            let model_name = model_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("onnx-model")
                .to_string();

            debug!(model = %model_name, dims = dimensions, "embedding model loaded");

            Ok(Self {
                session: Mutex::new(session),
                dimensions,
                model_name,
            })
        }

        fn infer(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let inference_failed = |reason: String| EmbeddingError::InferenceFailed { reason };

            let input_ids: Vec<i64> = tokenize(text).into_iter().map(i64::from).collect();
            let seq_len = input_ids.len();
            let attention_mask = vec![1i64; seq_len];

            let ids_tensor = Tensor::from_array((vec![1i64, seq_len as i64], input_ids))
                .map_err(|e| inference_failed(format!("tensor creation error: {e}")))?;
            let mask_tensor = Tensor::from_array((vec![1i64, seq_len as i64], attention_mask))
                .map_err(|e| inference_failed(format!("tensor creation error: {e}")))?;

            let mut session = self
                .session
                .lock()
                .map_err(|e| inference_failed(format!("session lock poisoned: {e}")))?;

            let outputs = session
                .run(ort::inputs![ids_tensor, mask_tensor])
                .map_err(|e| inference_failed(e.to_string()))?;

            let (_name, output) = outputs
                .iter()
                .next()
                .ok_or_else(|| inference_failed("no output tensor".to_string()))?;

            let (shape, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| inference_failed(format!("tensor extraction failed: {e}")))?;

            let mut embedding = match shape.len() {
                // [1, seq, dims]: mean pool over the sequence
                3 => {
                    let seq = shape[1] as usize;
                    let dims = shape[2] as usize;
                    let mut pooled = vec![0.0f32; dims];
                    for s in 0..seq {
                        for (d, slot) in pooled.iter_mut().enumerate() {
                            *slot += data[s * dims + d];
                        }
                    }
                    pooled.iter_mut().for_each(|v| *v /= seq.max(1) as f32);
                    pooled
                }
                // [1, dims]: already pooled
                2 => data[..shape[1] as usize].to_vec(),
                _ => return Err(inference_failed(format!("unexpected output shape: {shape:?}"))),
            };

            let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > f32::EPSILON {
                embedding.iter_mut().for_each(|v| *v /= norm);
            }

            embedding.resize(self.dimensions, 0.0);
            Ok(embedding)
        }
    }

    /// Lower-cased words hashed (FNV-1a) into a 30k vocabulary, wrapped in CLS/SEP.
    fn tokenize(text: &str) -> Vec<u32> {
        let mut ids = vec![101u32];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let mut h: u32 = 0x811c9dc5;
            for b in word.to_lowercase().as_bytes() {
                h ^= *b as u32;
                h = h.wrapping_mul(0x01000193);
            }
            ids.push(1 + (h % 29999));
        }
        ids.push(102);
        ids
    }

    impl EmbeddingProvider for OnnxProvider {
        fn name(&self) -> &str {
            &self.model_name
        }

        fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|text| self.infer(text)).collect()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_tokenize_is_case_insensitive() {
            assert_eq!(tokenize("Red Pen"), tokenize("red pen"));
            assert_eq!(tokenize(""), vec![101, 102]);
        }

        #[test]
        fn test_missing_model_fails_to_load() {
            let result = OnnxProvider::load(Path::new("/nonexistent/model.onnx"), 384);
            assert!(matches!(result, Err(EmbeddingError::ModelLoadFailed { .. })));
        }
    }
}
