// Orchestrator - resolve, download, advance, stop and persist

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use super::backends::YtDlpService;
use super::config::EngineConfig;
use super::errors::{EngineError, ServiceError};
use super::executor::{DownloadExecutor, ExecutorEvent};
use super::format_selector::{FormatSelector, QualityProfile};
use super::models::{FormatDescriptor, Job, Metadata, ProgressPhase, ProgressSample, ResolvedInfo, SingleItem};
use super::playlist::PlaylistController;
use super::resolver::MetadataResolver;
use super::session::{SessionState, SessionStore};
use super::traits::MediaService;

/// Engine state.
///
/// `Advancing`, `Stopped` and `Failed` are transient: they are reported
/// through `Event::StateChanged` and immediately followed by the next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Resolving,
    Ready,
    Downloading,
    Advancing,
    /// Stop requested, waiting for the worker to reach a checkpoint
    Stopping,
    Stopped,
    Failed,
}

/// Notifications for the control path, in the order they happened
#[derive(Debug, Clone)]
pub enum Event {
    StateChanged(EngineState),
    /// A resolution was committed: new queue, formats and metadata
    Resolved {
        jobs: Vec<Job>,
        cursor: usize,
        metadata: Metadata,
        formats: Vec<FormatDescriptor>,
    },
    JobStarted(Job),
    /// `job` is the queue index the sample belongs to
    Progress { job: usize, sample: ProgressSample },
    JobFinished { job: usize, path: Option<PathBuf> },
    /// The last job of the queue finished
    QueueFinished,
    Failed(EngineError),
    Stopped,
}

enum Resolution {
    Shallow(ResolvedInfo),
    Deep(SingleItem),
}

/// Worker to control-path messages. Workers never touch engine state.
enum Message {
    Resolved {
        op: u64,
        result: Result<Resolution, EngineError>,
    },
    Download {
        op: u64,
        event: ExecutorEvent,
    },
    StopRequested,
}

enum OpKind {
    Resolve { url: String },
    Download,
}

struct ActiveOp {
    id: u64,
    kind: OpKind,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Playlist listing waiting for the deep resolve of its current entry.
/// Nothing is committed until that succeeds.
struct PendingResolution {
    url: String,
    queue: PlaylistController,
}

/// Requests a stop from another task (a Ctrl-C handler, say)
#[derive(Clone)]
pub struct StopHandle {
    tx: UnboundedSender<Message>,
}

impl StopHandle {
    /// Ask the engine to stop. Ignored when nothing is running.
    pub fn stop(&self) {
        let _ = self.tx.send(Message::StopRequested);
    }
}

/// Owns the queue, the workers and the session.
///
/// Commands (`resolve`, `download`, `select`, `request_stop`) return at once;
/// the work happens on tokio tasks that report back through a channel. All
/// state changes happen inside `next_event`/`stop` while that channel is
/// drained, so the caller must keep calling `next_event` while an operation
/// is running. At most one operation runs at a time.
pub struct Orchestrator {
    resolver: MetadataResolver,
    executor: DownloadExecutor,
    store: SessionStore,

    state: EngineState,
    queue: PlaylistController,
    last_url: String,
    formats: Vec<FormatDescriptor>,
    metadata: Metadata,
    output_folder: Option<PathBuf>,
    quality: Option<QualityProfile>,

    active: Option<ActiveOp>,
    pending: Option<PendingResolution>,
    next_op: u64,
    events: VecDeque<Event>,
    tx: UnboundedSender<Message>,
    rx: UnboundedReceiver<Message>,
}

impl Orchestrator {
    /// Build an engine and restore the previous session from `store`
    pub fn new(service: Arc<dyn MediaService>, store: SessionStore) -> Self {
        let session = store.load();
        debug!(
            target: "orchestrator",
            session = %store.path().display(),
            jobs = session.queue.len(),
            cursor = session.cursor,
            "engine created"
        );
        let (tx, rx) = unbounded_channel();

        Self {
            resolver: MetadataResolver::new(service.clone()),
            executor: DownloadExecutor::new(service),
            store,
            state: EngineState::Idle,
            queue: PlaylistController::restore(session.queue, session.cursor),
            last_url: session.last_url,
            formats: session.last_formats,
            metadata: session.last_metadata,
            output_folder: session.output_folder,
            quality: session.quality,
            active: None,
            pending: None,
            next_op: 0,
            events: VecDeque::new(),
            tx,
            rx,
        }
    }

    /// yt-dlp backed engine using the configured session file
    pub fn from_config(config: &EngineConfig) -> Self {
        let service = Arc::new(YtDlpService::new(config.clone()));
        Self::new(service, SessionStore::new(&config.session_file))
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn jobs(&self) -> &[Job] {
        self.queue.jobs()
    }

    pub fn cursor(&self) -> usize {
        self.queue.cursor()
    }

    pub fn current_job(&self) -> Option<&Job> {
        self.queue.current()
    }

    pub fn formats(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn last_url(&self) -> &str {
        &self.last_url
    }

    pub fn output_folder(&self) -> Option<&Path> {
        self.output_folder.as_deref()
    }

    pub fn quality(&self) -> Option<QualityProfile> {
        self.quality
    }

    pub fn is_downloading(&self) -> bool {
        matches!(
            self.active,
            Some(ActiveOp {
                kind: OpKind::Download,
                ..
            })
        )
    }

    /// Profiles worth offering for the current format list
    pub fn available_profiles(&self) -> Vec<QualityProfile> {
        FormatSelector::available_profiles(&self.formats)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.tx.clone(),
        }
    }

    /// Start resolving `url`. A playlist is listed shallowly, then its first
    /// entry is resolved deeply before the result is committed.
    pub fn resolve(&mut self, url: &str) -> Result<(), EngineError> {
        self.ensure_idle()?;
        let url = url.trim();
        if url.is_empty() {
            return Err(EngineError::invalid("URL is empty"));
        }

        self.drain_stale();
        self.pending = None;
        self.set_state(EngineState::Resolving);
        self.spawn_resolve(url.to_string(), false);
        Ok(())
    }

    /// Point the cursor at another queue entry and fetch its formats.
    /// The cursor only moves once that resolve succeeds.
    pub fn select(&mut self, index: usize) -> Result<(), EngineError> {
        self.ensure_idle()?;
        let mut queue = self.queue.clone();
        let url = match queue.select(index) {
            Some(job) => job.url.clone(),
            None => return Err(EngineError::invalid(format!("no job at index {}", index))),
        };

        self.drain_stale();
        self.pending = Some(PendingResolution {
            url: self.last_url.clone(),
            queue,
        });
        self.set_state(EngineState::Resolving);
        self.spawn_resolve(url, true);
        Ok(())
    }

    /// Download the current job, then keep going through the rest of the
    /// queue. Inputs are checked before any worker starts.
    pub fn download(&mut self) -> Result<(), EngineError> {
        self.ensure_idle()?;
        let folder = match &self.output_folder {
            Some(folder) if folder.is_dir() => folder.clone(),
            Some(folder) => {
                return Err(EngineError::invalid(format!(
                    "output folder {} does not exist",
                    folder.display()
                )))
            }
            None => return Err(EngineError::invalid("no output folder selected")),
        };
        let quality = self
            .quality
            .ok_or_else(|| EngineError::invalid("no quality selected"))?;
        let job = self
            .current_job()
            .cloned()
            .ok_or_else(|| EngineError::invalid("nothing to download"))?;

        self.drain_stale();
        self.set_state(EngineState::Downloading);
        self.start_job(job, quality, folder);
        Ok(())
    }

    /// Change the output folder and persist the session
    pub fn set_output_folder(&mut self, folder: impl Into<PathBuf>) -> Result<(), EngineError> {
        self.ensure_idle()?;
        let folder = folder.into();
        if folder.as_os_str().is_empty() {
            return Err(EngineError::invalid("output folder is empty"));
        }

        info!(target: "orchestrator", folder = %folder.display(), "output folder changed");
        self.output_folder = Some(folder);
        self.persist();
        Ok(())
    }

    /// Quality for the next job started. Persisted with the next save.
    pub fn set_quality(&mut self, quality: QualityProfile) {
        self.quality = Some(quality);
    }

    /// Cancel whatever is running. Returns `false` when nothing is.
    ///
    /// The worker only notices at its next checkpoint; keep draining
    /// `next_event` (or call `stop`) to see the `Stopped` transition.
    pub fn request_stop(&mut self) -> bool {
        let Some(op) = &self.active else {
            return false;
        };
        op.token.cancel();
        if self.state != EngineState::Stopping {
            info!(target: "orchestrator", op = op.id, "stop requested");
            self.set_state(EngineState::Stopping);
        }
        true
    }

    /// Cancel whatever is running and wait for it to unwind
    pub async fn stop(&mut self) -> bool {
        if !self.request_stop() {
            return false;
        }
        while self.active.is_some() {
            self.pump_one().await;
        }
        true
    }

    /// Next event, driving workers as needed. `None` once nothing is running
    /// and every event has been handed out.
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }
            if self.active.is_none() {
                return None;
            }
            self.pump_one().await;
        }
    }

    fn ensure_idle(&self) -> Result<(), EngineError> {
        match &self.active {
            Some(ActiveOp {
                kind: OpKind::Download,
                ..
            }) => Err(EngineError::invalid("a download is in progress")),
            Some(_) => Err(EngineError::invalid("a resolution is in progress")),
            None => Ok(()),
        }
    }

    fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            debug!(target: "orchestrator", from = ?self.state, to = ?state, "state change");
            self.state = state;
            self.events.push_back(Event::StateChanged(state));
        }
    }

    /// Drop messages left over from finished operations. User commands
    /// only: during auto-advance a queued stop still applies to the next job.
    fn drain_stale(&mut self) {
        debug_assert!(self.active.is_none());
        while self.rx.try_recv().is_ok() {}
    }

    fn begin_op(&mut self) -> (u64, CancellationToken) {
        self.next_op += 1;
        (self.next_op, CancellationToken::new())
    }

    fn spawn_resolve(&mut self, url: String, deep: bool) {
        let (id, token) = self.begin_op();
        let resolver = self.resolver.clone();
        let tx = self.tx.clone();
        let worker_token = token.clone();
        let target = url.clone();

        let handle = tokio::spawn(async move {
            let result = if deep {
                resolver
                    .resolve_deep(&target, &worker_token)
                    .await
                    .map(Resolution::Deep)
            } else {
                resolver
                    .resolve_shallow(&target, &worker_token)
                    .await
                    .map(Resolution::Shallow)
            };
            let _ = tx.send(Message::Resolved { op: id, result });
        });

        self.active = Some(ActiveOp {
            id,
            kind: OpKind::Resolve { url },
            token,
            handle,
        });
    }

    fn start_job(&mut self, job: Job, quality: QualityProfile, folder: PathBuf) {
        let (id, token) = self.begin_op();
        let tx = self.tx.clone();
        info!(
            target: "orchestrator",
            position = self.queue.cursor(),
            of = self.queue.len(),
            title = %job.title,
            "starting job"
        );

        self.events.push_back(Event::JobStarted(job.clone()));
        let handle = self
            .executor
            .spawn(job, quality, folder, token.clone(), move |event| {
                let _ = tx.send(Message::Download { op: id, event });
            });

        self.active = Some(ActiveOp {
            id,
            kind: OpKind::Download,
            token,
            handle,
        });
    }

    /// Handle one worker message, or the loss of the worker
    async fn pump_one(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };

        let message = tokio::select! {
            biased;
            message = self.rx.recv() => message,
            _ = &mut active.handle => None,
        };

        match message {
            Some(Message::StopRequested) => {
                self.request_stop();
            }
            Some(Message::Resolved { op, result }) if self.is_current(op) => {
                self.on_resolved(result).await;
            }
            Some(Message::Download { op, event }) if self.is_current(op) => {
                self.on_download_event(event).await;
            }
            Some(_) => debug!(target: "orchestrator", "dropping message from a finished operation"),
            None => self.on_worker_lost(),
        }
    }

    fn is_current(&self, op: u64) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == op)
    }

    /// Detach the finished operation and wait for its task to exit
    async fn finish_op(&mut self) -> Option<ActiveOp> {
        let mut op = self.active.take()?;
        let _ = (&mut op.handle).await;
        Some(op)
    }

    async fn on_resolved(&mut self, result: Result<Resolution, EngineError>) {
        let Some(op) = self.finish_op().await else {
            return;
        };
        let cancelled = op.token.is_cancelled();

        let resolution = match result {
            Ok(_) if cancelled => {
                self.pending = None;
                self.end_stopped();
                return;
            }
            Ok(resolution) => resolution,
            Err(e) => {
                self.pending = None;
                if cancelled || matches!(e, EngineError::Cancelled) {
                    self.end_stopped();
                } else {
                    self.fail(e);
                }
                return;
            }
        };

        match resolution {
            Resolution::Shallow(info) => {
                let url = match op.kind {
                    OpKind::Resolve { url } => url,
                    OpKind::Download => self.last_url.clone(),
                };
                let queue = PlaylistController::from_resolved(&info, &url);
                match info {
                    ResolvedInfo::Single(item) => self.commit(url, queue, item),
                    ResolvedInfo::Playlist { .. } => {
                        let Some(first) = queue.current().map(|job| job.url.clone()) else {
                            self.fail(EngineError::ResolutionFailed(ServiceError::Parse(
                                "playlist has no downloadable entries".to_string(),
                            )));
                            return;
                        };
                        info!(target: "orchestrator", entries = queue.len(), "playlist listed, resolving first entry");
                        self.pending = Some(PendingResolution { url, queue });
                        self.spawn_resolve(first, true);
                    }
                }
            }
            Resolution::Deep(item) => {
                let pending = self.pending.take().unwrap_or_else(|| PendingResolution {
                    url: self.last_url.clone(),
                    queue: self.queue.clone(),
                });
                self.commit(pending.url, pending.queue, item);
            }
        }
    }

    fn commit(&mut self, url: String, queue: PlaylistController, item: SingleItem) {
        self.last_url = url;
        self.queue = queue;
        self.formats = item.formats;
        self.metadata = item.metadata;

        info!(
            target: "orchestrator",
            jobs = self.queue.len(),
            cursor = self.queue.cursor(),
            formats = self.formats.len(),
            "resolution committed"
        );
        self.events.push_back(Event::Resolved {
            jobs: self.queue.jobs().to_vec(),
            cursor: self.queue.cursor(),
            metadata: self.metadata.clone(),
            formats: self.formats.clone(),
        });
        self.set_state(EngineState::Ready);
        self.persist();
    }

    async fn on_download_event(&mut self, event: ExecutorEvent) {
        let job = self.queue.cursor();
        match event {
            ExecutorEvent::Progress(sample) => {
                if self.state == EngineState::Stopping && sample.phase != ProgressPhase::Finished {
                    return;
                }
                self.events.push_back(Event::Progress { job, sample });
            }
            ExecutorEvent::Completed(result) => {
                let Some(op) = self.finish_op().await else {
                    return;
                };
                let cancelled = op.token.is_cancelled();

                match result {
                    Ok(path) => {
                        info!(target: "orchestrator", position = job, path = ?path, "job finished");
                        self.events.push_back(Event::JobFinished { job, path });

                        if cancelled {
                            self.persist();
                            self.end_stopped();
                        } else if let Some(next) = self.queue.advance().cloned() {
                            self.persist();
                            self.set_state(EngineState::Advancing);
                            self.set_state(EngineState::Downloading);
                            match (self.quality, self.output_folder.clone()) {
                                (Some(quality), Some(folder)) => self.start_job(next, quality, folder),
                                _ => self.fail(EngineError::invalid("download settings were cleared")),
                            }
                        } else {
                            info!(target: "orchestrator", jobs = self.queue.len(), "queue finished");
                            self.events.push_back(Event::QueueFinished);
                            self.persist();
                            self.set_state(EngineState::Idle);
                        }
                    }
                    Err(e) => {
                        self.persist();
                        if cancelled {
                            info!(target: "orchestrator", position = job, "job stopped");
                            self.end_stopped();
                        } else {
                            warn!(target: "orchestrator", position = job, error = %e, "job failed");
                            self.fail(e);
                        }
                    }
                }
            }
        }
    }

    // The task ended without sending its terminal message
    fn on_worker_lost(&mut self) {
        let Some(op) = self.active.take() else {
            return;
        };
        self.pending = None;
        warn!(target: "orchestrator", op = op.id, "worker exited without a result");

        if op.token.is_cancelled() {
            self.end_stopped();
            return;
        }
        let error = match op.kind {
            OpKind::Resolve { .. } => EngineError::ResolutionFailed(ServiceError::Execution(
                "resolver task ended unexpectedly".to_string(),
            )),
            OpKind::Download => {
                self.persist();
                EngineError::DownloadFailed("download task ended unexpectedly".to_string())
            }
        };
        self.fail(error);
    }

    fn end_stopped(&mut self) {
        self.set_state(EngineState::Stopped);
        self.events.push_back(Event::Stopped);
        self.set_state(EngineState::Idle);
    }

    fn fail(&mut self, error: EngineError) {
        self.set_state(EngineState::Failed);
        self.events.push_back(Event::Failed(error));
        self.set_state(EngineState::Idle);
    }

    /// Best effort. A failed write is logged and otherwise ignored.
    fn persist(&self) {
        let state = SessionState {
            last_url: self.last_url.clone(),
            output_folder: self.output_folder.clone(),
            quality: self.quality,
            last_formats: self.formats.clone(),
            last_metadata: self.metadata.clone(),
            queue: self.queue.jobs().to_vec(),
            cursor: self.queue.cursor(),
        };
        if let Err(e) = self.store.save(&state) {
            warn!(target: "orchestrator", error = %e, "session not saved");
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(op) = &self.active {
            op.token.cancel();
        }
    }
}
