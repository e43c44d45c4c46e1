//! Pluggable metadata/video providers.
//!
//! Each provider implements [`VideoSource`] and is registered explicitly in
//! a [`SourceRegistry`]; the discovery coordinator walks the registry in
//! configured priority order. Adapters are thin clients: they turn one
//! artist query into candidates and classify their own failures, nothing
//! more.

pub mod imvdb;
pub mod youtube;

pub use imvdb::ImvdbSource;
pub use youtube::YouTubeSource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::error::SourceError;
use crate::model::{Artist, SourceId, VideoCandidate};

/// One external metadata/video provider.
///
/// All methods take `&self`; implementations are stateless or use interior
/// mutability. `search` must not block past the configured timeout — the
/// caller enforces the bound, a well-behaved adapter stays under it.
#[async_trait]
pub trait VideoSource: Send + Sync {
    /// Stable source identifier, used as the external-id map key.
    fn id(&self) -> SourceId;

    /// Human-readable name for logs.
    fn display_name(&self) -> &str;

    /// Query the provider for music videos by this artist.
    ///
    /// `since` narrows the search to items published after the given
    /// instant where the provider supports it; providers that cannot
    /// filter server-side return everything and let the dedup engine
    /// discard what is already known.
    async fn search(
        &self,
        artist: &Artist,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<VideoCandidate>, SourceError>;
}

/// Registry of available sources.
pub struct SourceRegistry {
    sources: Vec<Arc<dyn VideoSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self { sources: Vec::new() }
    }

    pub fn register(&mut self, source: Arc<dyn VideoSource>) {
        self.sources.push(source);
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Sources in the given priority order; unlisted sources follow in
    /// registration order.
    pub fn ordered(&self, priority: &[SourceId]) -> Vec<Arc<dyn VideoSource>> {
        let mut out: Vec<Arc<dyn VideoSource>> = Vec::with_capacity(self.sources.len());
        for wanted in priority {
            if let Some(source) = self.sources.iter().find(|s| &s.id() == wanted) {
                out.push(Arc::clone(source));
            }
        }
        for source in &self.sources {
            if !out.iter().any(|s| s.id() == source.id()) {
                out.push(Arc::clone(source));
            }
        }
        out
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
