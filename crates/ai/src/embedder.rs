use std::sync::Arc;

use crate::result::AiError;

/// A dense vector produced by an embedding model.
pub type Embedding = Vec<f32>;

/// Embedding provider.
///
/// Batch calls amortize provider round-trips. Results are positional and
/// independent: one failed text does not invalidate the others.
pub trait Embedder: Send + Sync + 'static {
    /// Model identifier stored alongside each vector.
    fn model(&self) -> &str;

    fn embed_batch(&self, texts: &[&str]) -> Vec<Result<Embedding, AiError>>;
}

impl<E> Embedder for Arc<E>
where
    E: Embedder + ?Sized,
{
    fn model(&self) -> &str {
        (**self).model()
    }

    fn embed_batch(&self, texts: &[&str]) -> Vec<Result<Embedding, AiError>> {
        (**self).embed_batch(texts)
    }
}
