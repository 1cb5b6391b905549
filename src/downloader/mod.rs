// Downloader module - download orchestration engine

pub mod backends;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod executor;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod playlist;
pub mod progress;
pub mod resolver;
pub mod session;
pub mod traits;
pub mod utils;

pub use tokio_util::sync::CancellationToken;
pub use config::EngineConfig;
pub use errors::{EngineError, ServiceError};
pub use format_selector::{FormatSelector, QualityProfile};
pub use models::{FormatDescriptor, Job, Metadata, ProgressPhase, ProgressSample};
pub use orchestrator::{EngineState, Event, Orchestrator, StopHandle};
pub use session::{SessionState, SessionStore};
pub use traits::MediaService;
