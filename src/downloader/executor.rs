// Download executor - runs one job on a worker task

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tokio_util::sync::CancellationToken;

use super::errors::{EngineError, ServiceError};
use super::format_selector::QualityProfile;
use super::models::{DownloadRequest, Job, ProgressSample, RawProgress};
use super::progress::ProgressReporter;
use super::traits::{HookAction, MediaService};

/// Messages a running job sends back to the control path.
/// `Completed` is always the last one.
#[derive(Debug, Clone)]
pub enum ExecutorEvent {
    Progress(ProgressSample),
    Completed(Result<Option<PathBuf>, EngineError>),
}

/// Downloads single jobs through the media-extraction service
#[derive(Clone)]
pub struct DownloadExecutor {
    service: Arc<dyn MediaService>,
}

impl DownloadExecutor {
    pub fn new(service: Arc<dyn MediaService>) -> Self {
        Self { service }
    }

    /// Download `job` into `folder`. Progress goes to `emit`, the final
    /// path (when the service knows it) is returned.
    ///
    /// The token is checked before dispatch and on every progress record.
    /// Partial files are left for the service to deal with.
    pub async fn run(
        &self,
        job: &Job,
        quality: QualityProfile,
        folder: &Path,
        token: &CancellationToken,
        mut emit: impl FnMut(ExecutorEvent) + Send,
    ) -> Result<Option<PathBuf>, EngineError> {
        if token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let request = DownloadRequest {
            url: job.url.clone(),
            quality_expr: quality.format_expr(),
            output_folder: folder.to_path_buf(),
        };
        info!(
            target: "executor",
            url = %request.url,
            %quality,
            folder = %folder.display(),
            "starting download"
        );

        let mut reporter = ProgressReporter::new();
        let result = {
            let mut hook = |raw: RawProgress| {
                if token.is_cancelled() {
                    return HookAction::Abort;
                }
                if let Some(sample) = reporter.accept(&raw) {
                    emit(ExecutorEvent::Progress(sample));
                }
                HookAction::Continue
            };
            self.service.download(&request, &mut hook).await
        };

        match result {
            Ok(outcome) => {
                let sample = reporter.finish(outcome.final_path);
                let path = sample.final_file_path.clone();
                emit(ExecutorEvent::Progress(sample));
                info!(target: "executor", url = %request.url, path = ?path, "download finished");
                Ok(path)
            }
            Err(ServiceError::Aborted) => {
                info!(target: "executor", url = %request.url, "download aborted");
                Err(EngineError::DownloadFailed(ServiceError::Aborted.to_string()))
            }
            Err(e) => {
                warn!(target: "executor", url = %request.url, error = %e, "download failed");
                Err(EngineError::DownloadFailed(e.to_string()))
            }
        }
    }

    /// Run on a tokio task. `sink` sees every progress sample followed by
    /// exactly one `Completed`.
    pub fn spawn<F>(
        &self,
        job: Job,
        quality: QualityProfile,
        folder: PathBuf,
        token: CancellationToken,
        mut sink: F,
    ) -> JoinHandle<()>
    where
        F: FnMut(ExecutorEvent) + Send + 'static,
    {
        let executor = self.clone();
        tokio::spawn(async move {
            let result = executor
                .run(&job, quality, &folder, &token, &mut sink)
                .await;
            sink(ExecutorEvent::Completed(result));
        })
    }
}
