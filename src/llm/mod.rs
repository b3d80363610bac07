//! The language-model completion boundary.
//!
//! The engine never manages model selection, credentials, or transport.
//! Callers supply a [`CompletionProvider`] — either a concrete
//! implementation or a bare async function wrapped in [`CompletionFn`] —
//! and own the timeout/retry policy. An error return aborts that unit of
//! work without internal retry.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// A caller-supplied completion callback: `complete(prompt) -> text`.
#[async_trait]
pub trait CompletionProvider: Send + Sync + std::fmt::Debug {
    /// Generate a completion for the given prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Adapter turning a bare async function into a [`CompletionProvider`],
/// so callers can pass either dispatch form and the engine treats both
/// uniformly.
#[derive(Clone)]
pub struct CompletionFn {
    f: Arc<dyn Fn(String) -> BoxFuture<'static, Result<String>> + Send + Sync>,
}

impl CompletionFn {
    /// Wrap an async closure of matching arity.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |prompt| Box::pin(f(prompt))),
        }
    }
}

impl std::fmt::Debug for CompletionFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionFn").finish_non_exhaustive()
    }
}

#[async_trait]
impl CompletionProvider for CompletionFn {
    async fn complete(&self, prompt: &str) -> Result<String> {
        (self.f)(prompt.to_string()).await
    }
}
