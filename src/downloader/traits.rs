// Media-extraction service trait definition

use async_trait::async_trait;

use super::errors::ServiceError;
use super::models::{DownloadOutcome, DownloadRequest, RawProgress, ResolveDepth, ResolvedInfo};

/// What the progress hook tells the service after each raw sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Continue,
    /// Stop the transfer, release files and return `ServiceError::Aborted`
    Abort,
}

/// Progress callback handed to `MediaService::download`
pub type ProgressHook<'a> = &'a mut (dyn FnMut(RawProgress) -> HookAction + Send);

/// External media-extraction service (yt-dlp or a test double)
#[async_trait]
pub trait MediaService: Send + Sync {
    /// Name of the service (for logging)
    fn name(&self) -> &'static str;

    /// Resolve a URL into a single item or a playlist
    async fn resolve(&self, url: &str, depth: ResolveDepth) -> Result<ResolvedInfo, ServiceError>;

    /// Download one item. The hook is called for every raw progress record;
    /// when it answers `Abort` the service must unwind and return
    /// `ServiceError::Aborted`.
    async fn download(
        &self,
        request: &DownloadRequest,
        on_progress: ProgressHook<'_>,
    ) -> Result<DownloadOutcome, ServiceError>;
}

#[cfg(test)]
pub mod stub {
    use super::*;
    use crate::downloader::models::{
        output_file_name, FormatDescriptor, Metadata, PlaylistEntry, RawStatus, SingleItem,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted in-memory service
    pub struct ServiceStub {
        resolutions: HashMap<(String, bool), ResolvedInfo>,
        titles: HashMap<String, String>,
        failing_downloads: Vec<String>,
        pub resolve_delay: Duration,
        pub chunk_delay: Duration,
        pub chunks: u64,
        pub total_bytes: u64,
        /// Keep reporting progress until aborted
        pub endless: bool,
        pub calls: Mutex<Vec<String>>,
    }

    impl ServiceStub {
        pub fn new() -> Self {
            Self {
                resolutions: HashMap::new(),
                titles: HashMap::new(),
                failing_downloads: Vec::new(),
                resolve_delay: Duration::ZERO,
                chunk_delay: Duration::ZERO,
                chunks: 4,
                total_bytes: 4096,
                endless: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn video_url(id: &str) -> String {
            format!("https://www.youtube.com/watch?v={}", id)
        }

        pub fn item(id: &str) -> SingleItem {
            SingleItem {
                title: format!("Video {}", id),
                url: Self::video_url(id),
                formats: vec![
                    FormatDescriptor {
                        id: "18".to_string(),
                        extension: "mp4".to_string(),
                        resolution: "640x360".to_string(),
                        size_bytes: Some(1_000_000),
                    },
                    FormatDescriptor {
                        id: "22".to_string(),
                        extension: "mp4".to_string(),
                        resolution: "1280x720".to_string(),
                        size_bytes: None,
                    },
                ],
                metadata: Metadata {
                    title: format!("Video {}", id),
                    uploader: "Uploader".to_string(),
                    upload_date: "20240101".to_string(),
                    description: format!("About {}", id),
                },
            }
        }

        /// Register a video that resolves the same way shallow and deep
        pub fn with_video(mut self, id: &str) -> Self {
            let item = Self::item(id);
            let url = item.url.clone();
            self.titles.insert(url.clone(), item.title.clone());
            self.resolutions
                .insert((url.clone(), false), ResolvedInfo::Single(item.clone()));
            self.resolutions.insert((url, true), ResolvedInfo::Single(item));
            self
        }

        /// Register a playlist whose entries are videos with the given ids
        pub fn with_playlist(self, url: &str, ids: &[&str]) -> Self {
            let mut stub = self.with_shallow_playlist(url, ids);
            for id in ids {
                stub = stub.with_video(id);
            }
            stub
        }

        /// Register only the flat listing; the entries themselves do not resolve
        pub fn with_shallow_playlist(mut self, url: &str, ids: &[&str]) -> Self {
            let entries = ids
                .iter()
                .map(|id| PlaylistEntry {
                    title: format!("Video {}", id),
                    url: Some(Self::video_url(id)),
                    id: Some(id.to_string()),
                })
                .collect();
            self.resolutions.insert(
                (url.to_string(), false),
                ResolvedInfo::Playlist {
                    title: Some("Playlist".to_string()),
                    entries,
                },
            );
            self
        }

        pub fn failing_download(mut self, url: &str) -> Self {
            self.failing_downloads.push(url.to_string());
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    fn height_from_expr(expr: &str) -> Option<u32> {
        let start = expr.find("height<=")? + "height<=".len();
        let digits: String = expr[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }

    #[async_trait]
    impl MediaService for ServiceStub {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn resolve(&self, url: &str, depth: ResolveDepth) -> Result<ResolvedInfo, ServiceError> {
            self.record(format!("resolve:{}:{}", depth, url));
            if !self.resolve_delay.is_zero() {
                tokio::time::sleep(self.resolve_delay).await;
            }
            let deep = depth == ResolveDepth::Deep;
            self.resolutions
                .get(&(url.to_string(), deep))
                .cloned()
                .ok_or_else(|| format!("ERROR: Unsupported URL: {}", url).into())
        }

        async fn download(
            &self,
            request: &DownloadRequest,
            on_progress: ProgressHook<'_>,
        ) -> Result<DownloadOutcome, ServiceError> {
            self.record(format!("download:{}", request.url));
            let mut step = 0;
            loop {
                step += 1;
                if !self.endless && step > self.chunks {
                    break;
                }
                let downloaded = if self.endless {
                    (step * 16).min(self.total_bytes)
                } else {
                    self.total_bytes * step / self.chunks
                };
                let raw = RawProgress {
                    status: RawStatus::Downloading,
                    downloaded_bytes: Some(downloaded),
                    total_bytes: Some(self.total_bytes),
                    speed: Some(1024.0),
                    eta: Some(((self.total_bytes - downloaded) / 1024) as f64),
                    ..RawProgress::default()
                };
                if on_progress(raw) == HookAction::Abort {
                    return Err(ServiceError::Aborted);
                }
                if !self.chunk_delay.is_zero() {
                    tokio::time::sleep(self.chunk_delay).await;
                } else {
                    tokio::task::yield_now().await;
                }
            }

            if self.failing_downloads.contains(&request.url) {
                return Err("ERROR: HTTP Error 403: Forbidden".to_string().into());
            }

            let title = self
                .titles
                .get(&request.url)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string());
            let name = output_file_name(&title, height_from_expr(&request.quality_expr), "mp4");
            let path = request.output_folder.join(name);
            let finished = RawProgress {
                status: RawStatus::Finished,
                downloaded_bytes: Some(self.total_bytes),
                total_bytes: Some(self.total_bytes),
                filename: Some(path.to_string_lossy().to_string()),
                ..RawProgress::default()
            };
            if on_progress(finished) == HookAction::Abort {
                return Err(ServiceError::Aborted);
            }

            Ok(DownloadOutcome {
                final_path: Some(path),
            })
        }
    }
}
