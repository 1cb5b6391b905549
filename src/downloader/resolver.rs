// Metadata resolver - shallow and deep resolution through the service

use std::sync::Arc;
use tracing::{info, warn};
use tokio_util::sync::CancellationToken;

use super::errors::{EngineError, ServiceError};
use super::models::{ResolveDepth, ResolvedInfo, SingleItem};
use super::traits::MediaService;

/// Wraps the media-extraction service behind the two resolution modes.
///
/// The token is checked once before dispatch. A call already in flight
/// cannot be interrupted; it runs to completion or failure.
#[derive(Clone)]
pub struct MetadataResolver {
    service: Arc<dyn MediaService>,
}

impl MetadataResolver {
    pub fn new(service: Arc<dyn MediaService>) -> Self {
        Self { service }
    }

    /// Enumerate playlist entries without per-entry formats. A single video
    /// comes back as a full single-item result.
    pub async fn resolve_shallow(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<ResolvedInfo, EngineError> {
        self.dispatch(url, ResolveDepth::Shallow, token).await
    }

    /// Full metadata and formats for exactly one item
    pub async fn resolve_deep(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<SingleItem, EngineError> {
        match self.dispatch(url, ResolveDepth::Deep, token).await? {
            ResolvedInfo::Single(item) => Ok(item),
            ResolvedInfo::Playlist { .. } => Err(EngineError::ResolutionFailed(ServiceError::Parse(
                format!("expected a single item for {}, got a playlist", url),
            ))),
        }
    }

    async fn dispatch(
        &self,
        url: &str,
        depth: ResolveDepth,
        token: &CancellationToken,
    ) -> Result<ResolvedInfo, EngineError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(EngineError::invalid("URL is empty"));
        }
        if token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        info!(target: "resolver", %url, %depth, service = self.service.name(), "resolving");
        match self.service.resolve(url, depth).await {
            Ok(resolved) => {
                match &resolved {
                    ResolvedInfo::Single(item) => {
                        info!(target: "resolver", %url, title = %item.title, formats = item.formats.len(), "resolved item")
                    }
                    ResolvedInfo::Playlist { entries, .. } => {
                        info!(target: "resolver", %url, entries = entries.len(), "resolved playlist")
                    }
                }
                Ok(resolved)
            }
            Err(e) => {
                warn!(target: "resolver", %url, %depth, error = %e, "resolution failed");
                Err(EngineError::ResolutionFailed(e))
            }
        }
    }
}
