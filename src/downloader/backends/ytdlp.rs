// yt-dlp command-line backend

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::downloader::config::EngineConfig;
use crate::downloader::errors::ServiceError;
use crate::downloader::models::{
    DownloadOutcome, DownloadRequest, FormatDescriptor, Metadata, PlaylistEntry, RawProgress,
    ResolveDepth, ResolvedInfo, SingleItem, OUTPUT_TEMPLATE,
};
use crate::downloader::traits::{HookAction, MediaService, ProgressHook};
use crate::downloader::utils::{cookie_args, network_args};

lazy_static! {
    static ref PROGRESS_RE: Regex = Regex::new(r"^\[progress\](\{.*\})\s*$").unwrap();
    static ref FILEPATH_RE: Regex = Regex::new(r"^\[filepath\](.+)$").unwrap();
    static ref DEST_RE: Regex = Regex::new(r"\[download\]\s+Destination:\s+(.+)").unwrap();
    static ref MERGE_RE: Regex = Regex::new(r#"\[Merger\]\s+Merging formats into "(.+)""#).unwrap();
    static ref ALREADY_RE: Regex =
        Regex::new(r"\[download\]\s+(.+) has already been downloaded").unwrap();
}

/// One interesting line of yt-dlp download output
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    /// JSON progress dictionary from `--progress-template`
    Progress(RawProgress),
    /// Path printed after all post-processing
    FinalPath(PathBuf),
    /// Destination, merge target or an already-downloaded file
    Destination(PathBuf),
}

pub fn parse_line(line: &str) -> Option<OutputLine> {
    let line = line.trim_end();

    if let Some(caps) = PROGRESS_RE.captures(line) {
        return match serde_json::from_str(&caps[1]) {
            Ok(raw) => Some(OutputLine::Progress(raw)),
            Err(e) => {
                debug!(target: "yt-dlp", error = %e, "unparseable progress line");
                None
            }
        };
    }

    if let Some(caps) = FILEPATH_RE.captures(line) {
        return Some(OutputLine::FinalPath(PathBuf::from(caps[1].trim())));
    }

    [&*DEST_RE, &*MERGE_RE, &*ALREADY_RE]
        .iter()
        .find_map(|re| re.captures(line))
        .map(|caps| OutputLine::Destination(PathBuf::from(caps[1].trim())))
}

/// Arguments for `-J` metadata extraction
pub fn resolve_args(config: &EngineConfig, url: &str, depth: ResolveDepth) -> Vec<String> {
    let mut args = vec![
        "-J".to_string(),
        match depth {
            ResolveDepth::Shallow => "--flat-playlist",
            ResolveDepth::Deep => "--no-playlist",
        }
        .to_string(),
        "--no-warnings".to_string(),
    ];

    if let Some(agent) = &config.user_agent {
        args.push("--user-agent".to_string());
        args.push(agent.clone());
    }

    args.extend(cookie_args(config));
    args.extend(network_args(config));
    args.push(url.to_string());
    args
}

/// Arguments for a download with machine-readable progress
pub fn download_args(config: &EngineConfig, request: &DownloadRequest) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        request.quality_expr.clone(),
        "--no-playlist".to_string(),
        "--newline".to_string(),
        "--progress".to_string(),
        "--progress-template".to_string(),
        "download:[progress]%(progress)j".to_string(),
        "--print".to_string(),
        "after_move:[filepath]%(filepath)s".to_string(),
        "--no-simulate".to_string(),
        "-P".to_string(),
        request.output_folder.to_string_lossy().to_string(),
        "-o".to_string(),
        OUTPUT_TEMPLATE.to_string(),
    ];

    // audio-only selections are left in their native container
    if request.quality_expr.contains("bestvideo") {
        args.push("--merge-output-format".to_string());
        args.push("mp4".to_string());
    }

    if is_youtube(&request.url) {
        if let Some(client) = &config.player_client {
            args.push("--extractor-args".to_string());
            args.push(format!("youtube:player_client={}", client));
        }
    }

    args.extend(cookie_args(config));
    args.extend(network_args(config));
    args.push(request.url.clone());
    args
}

fn is_youtube(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("youtube.com") || lower.contains("youtu.be")
}

/// Turn `-J` output into a single item or a playlist
pub fn parse_resolved(json: &Value, input_url: &str) -> Result<ResolvedInfo, ServiceError> {
    if !json.is_object() {
        return Err(ServiceError::Parse("expected a JSON object".to_string()));
    }

    let is_playlist = json["_type"].as_str() == Some("playlist") || json["entries"].is_array();
    if is_playlist {
        let entries = json["entries"]
            .as_array()
            .map(|entries| entries.iter().filter_map(parse_entry).collect())
            .unwrap_or_default();
        return Ok(ResolvedInfo::Playlist {
            title: json["title"].as_str().map(str::to_string),
            entries,
        });
    }

    let title = json["title"].as_str().unwrap_or("Unknown").to_string();
    let url = ["webpage_url", "original_url"]
        .iter()
        .find_map(|key| json[*key].as_str())
        .unwrap_or(input_url)
        .to_string();

    Ok(ResolvedInfo::Single(SingleItem {
        metadata: Metadata {
            title: title.clone(),
            uploader: json["uploader"].as_str().unwrap_or("Unknown").to_string(),
            upload_date: json["upload_date"].as_str().unwrap_or("Unknown").to_string(),
            description: json["description"].as_str().unwrap_or("").to_string(),
        },
        formats: parse_formats(json),
        title,
        url,
    }))
}

// Null and non-object entries are dropped
fn parse_entry(entry: &Value) -> Option<PlaylistEntry> {
    if !entry.is_object() {
        return None;
    }
    let text = |key: &str| {
        entry[key]
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Some(PlaylistEntry {
        title: text("title").unwrap_or_else(|| "Untitled".to_string()),
        url: text("url").or_else(|| text("webpage_url")),
        id: text("id"),
    })
}

fn parse_formats(json: &Value) -> Vec<FormatDescriptor> {
    let Some(formats) = json["formats"].as_array() else {
        return Vec::new();
    };

    formats
        .iter()
        .filter(|f| f.is_object())
        .map(|f| {
            let resolution = f["resolution"]
                .as_str()
                .map(str::to_string)
                .or_else(|| f["height"].as_u64().map(|h| h.to_string()))
                .unwrap_or_else(|| "N/A".to_string());
            FormatDescriptor {
                id: f["format_id"].as_str().unwrap_or("").to_string(),
                extension: f["ext"].as_str().unwrap_or("").to_string(),
                resolution,
                size_bytes: f["filesize"]
                    .as_u64()
                    .or_else(|| f["filesize_approx"].as_u64())
                    .or_else(|| f["filesize_approx"].as_f64().map(|s| s as u64)),
            }
        })
        .collect()
}

/// How long yt-dlp gets to remove its `.part` files after an interrupt
const INTERRUPT_GRACE: Duration = Duration::from_secs(3);

/// Interrupt the child the way Ctrl-C would, then kill it if it is still
/// running after `grace`. Returns `true` when the interrupt was enough.
async fn interrupt_then_kill(child: &mut Child, grace: Duration) -> bool {
    if send_interrupt(child).await {
        if let Ok(Ok(_)) = tokio::time::timeout(grace, child.wait()).await {
            return true;
        }
        debug!(target: "yt-dlp", "no exit after interrupt, killing");
    }
    let _ = child.kill().await;
    false
}

#[cfg(unix)]
async fn send_interrupt(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    Command::new("kill")
        .args(["-INT", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

// No SIGINT for an arbitrary child here, go straight to the kill
#[cfg(not(unix))]
async fn send_interrupt(_child: &Child) -> bool {
    false
}

/// `MediaService` backed by the yt-dlp executable
pub struct YtDlpService {
    config: EngineConfig,
}

impl YtDlpService {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.config.ytdlp_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl MediaService for YtDlpService {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve(&self, url: &str, depth: ResolveDepth) -> Result<ResolvedInfo, ServiceError> {
        let args = resolve_args(&self.config, url, depth);
        debug!(target: "yt-dlp", %url, %depth, ?args, "running");

        let output = self.command(&args).output().await?;
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !stderr.trim().is_empty() {
            debug!(target: "yt-dlp", %stderr, "stderr");
        }

        if !output.status.success() {
            if stderr.trim().is_empty() {
                return Err(ServiceError::Execution(format!("yt-dlp exited with {}", output.status)));
            }
            return Err(stderr.into());
        }

        let json: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| ServiceError::Parse(format!("Failed to parse JSON: {}", e)))?;
        parse_resolved(&json, url)
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        on_progress: ProgressHook<'_>,
    ) -> Result<DownloadOutcome, ServiceError> {
        let args = download_args(&self.config, request);
        info!(target: "yt-dlp", url = %request.url, folder = %request.output_folder.display(), "starting yt-dlp");
        debug!(target: "yt-dlp", ?args, "running");

        let mut child = self.command(&args).spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ServiceError::Execution("Failed to capture stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ServiceError::Execution("Failed to capture stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut final_path = None;
        let mut last_destination = None;
        let mut lines = BufReader::new(stdout).lines();

        while let Some(line) = lines.next_line().await? {
            match parse_line(&line) {
                Some(OutputLine::Progress(raw)) => {
                    if on_progress(raw) == HookAction::Abort {
                        info!(target: "yt-dlp", url = %request.url, "abort requested, interrupting yt-dlp");
                        let graceful = interrupt_then_kill(&mut child, INTERRUPT_GRACE).await;
                        debug!(target: "yt-dlp", graceful, "yt-dlp terminated");
                        stderr_task.abort();
                        return Err(ServiceError::Aborted);
                    }
                }
                Some(OutputLine::FinalPath(path)) => final_path = Some(path),
                Some(OutputLine::Destination(path)) => {
                    debug!(target: "yt-dlp", destination = %path.display());
                    last_destination = Some(path);
                }
                None => {}
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if status.success() {
            return Ok(DownloadOutcome {
                final_path: final_path.or(last_destination),
            });
        }

        warn!(target: "yt-dlp", url = %request.url, %status, "yt-dlp failed");
        if stderr.trim().is_empty() {
            Err(ServiceError::Execution(format!("yt-dlp exited with {}", status)))
        } else {
            Err(stderr.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::format_selector::QualityProfile;
    use crate::downloader::models::RawStatus;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn config() -> EngineConfig {
        EngineConfig::default()
            .with_ytdlp_path("yt-dlp")
            .with_cookie_file(None)
    }

    #[test]
    fn test_parse_progress_line() {
        let line = r#"[progress]{"status": "downloading", "downloaded_bytes": 2048, "total_bytes": 8192, "speed": 1024.5, "eta": 6}"#;
        assert_matches!(
            parse_line(line),
            Some(OutputLine::Progress(RawProgress {
                status: RawStatus::Downloading,
                downloaded_bytes: Some(2048),
                total_bytes: Some(8192),
                ..
            }))
        );
    }

    #[test]
    fn test_parse_path_lines() {
        assert_eq!(
            parse_line("[filepath]/tmp/out/Clip_720p.mp4"),
            Some(OutputLine::FinalPath(PathBuf::from("/tmp/out/Clip_720p.mp4")))
        );
        assert_eq!(
            parse_line("[download] Destination: /tmp/out/Clip_720p.f137.mp4"),
            Some(OutputLine::Destination(PathBuf::from("/tmp/out/Clip_720p.f137.mp4")))
        );
        assert_eq!(
            parse_line(r#"[Merger] Merging formats into "/tmp/out/Clip_720p.mp4""#),
            Some(OutputLine::Destination(PathBuf::from("/tmp/out/Clip_720p.mp4")))
        );
        assert_eq!(
            parse_line("[download] /tmp/out/Clip_720p.mp4 has already been downloaded"),
            Some(OutputLine::Destination(PathBuf::from("/tmp/out/Clip_720p.mp4")))
        );
        assert_eq!(parse_line("[youtube] Extracting URL"), None);
        assert_eq!(parse_line("[progress]{broken"), None);
    }

    #[test]
    fn test_resolve_args() {
        let args = resolve_args(&config(), "https://youtu.be/x", ResolveDepth::Shallow);
        assert_eq!(args[..2], ["-J", "--flat-playlist"]);
        assert_eq!(args.last().map(String::as_str), Some("https://youtu.be/x"));

        let args = resolve_args(&config(), "https://youtu.be/x", ResolveDepth::Deep);
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(!args.contains(&"--flat-playlist".to_string()));
    }

    #[test]
    fn test_download_args() {
        let request = DownloadRequest {
            url: "https://www.youtube.com/watch?v=x".to_string(),
            quality_expr: QualityProfile::P720.format_expr(),
            output_folder: PathBuf::from("/tmp/out"),
        };
        let args = download_args(&config(), &request);
        let joined = args.join(" ");
        assert!(joined.contains("-P /tmp/out"));
        assert!(joined.contains("-o %(title)s_%(height)sp.%(ext)s"));
        assert!(joined.contains("--progress-template download:[progress]%(progress)j"));
        assert!(joined.contains("youtube:player_client=android"));
        assert!(joined.contains("--merge-output-format mp4"));
        assert!(!joined.contains("--cookies"));

        let audio = DownloadRequest {
            url: "https://vimeo.com/1".to_string(),
            quality_expr: QualityProfile::AudioOnly.format_expr(),
            ..request
        };
        let joined = download_args(&config(), &audio).join(" ");
        assert!(!joined.contains("--merge-output-format"));
        assert!(!joined.contains("player_client"));
    }

    #[test]
    fn test_parse_playlist_drops_null_entries() {
        let value = json!({
            "_type": "playlist",
            "title": "Mix",
            "entries": [
                {"title": "A", "url": "https://www.youtube.com/watch?v=a", "id": "a"},
                null,
                {"title": "B", "id": "b"},
                "garbage"
            ]
        });
        let info = parse_resolved(&value, "https://www.youtube.com/playlist?list=PL").unwrap();
        assert_matches!(info, ResolvedInfo::Playlist { title: Some(ref t), ref entries } if t == "Mix" && entries.len() == 2);
        if let ResolvedInfo::Playlist { entries, .. } = info {
            assert_eq!(entries[1].url, None);
            assert_eq!(entries[1].id.as_deref(), Some("b"));
        }
    }

    #[test]
    fn test_parse_single_item() {
        let value = json!({
            "title": "Clip",
            "webpage_url": "https://www.youtube.com/watch?v=c",
            "uploader": "Someone",
            "upload_date": "20240101",
            "formats": [
                {"format_id": "140", "ext": "m4a", "resolution": "audio only", "filesize": 1000},
                {"format_id": "22", "ext": "mp4", "height": 720, "filesize_approx": 2000},
                {"format_id": "sb0", "ext": "mhtml"}
            ]
        });
        let info = parse_resolved(&value, "https://youtu.be/c").unwrap();
        let ResolvedInfo::Single(item) = info else {
            panic!("expected a single item");
        };
        assert_eq!(item.url, "https://www.youtube.com/watch?v=c");
        assert_eq!(item.metadata.uploader, "Someone");
        assert_eq!(item.metadata.description, "");
        let res: Vec<(&str, Option<u64>)> = item
            .formats
            .iter()
            .map(|f| (f.resolution.as_str(), f.size_bytes))
            .collect();
        assert_eq!(
            res,
            vec![("audio only", Some(1000)), ("720", Some(2000)), ("N/A", None)]
        );
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert_matches!(parse_resolved(&json!([1, 2]), "u"), Err(ServiceError::Parse(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupt_stops_child_without_kill() {
        let mut child = Command::new("sleep").arg("30").kill_on_drop(true).spawn().unwrap();
        assert!(interrupt_then_kill(&mut child, Duration::from_secs(5)).await);
        assert!(child.try_wait().unwrap().is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_ignoring_interrupt_is_killed() {
        let mut child = Command::new("sh")
            .args(["-c", "trap '' INT; exec sleep 30"])
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        // give the shell time to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!interrupt_then_kill(&mut child, Duration::from_millis(200)).await);
        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_not_found() {
        let service =
            YtDlpService::new(config().with_ytdlp_path("/nonexistent/bin/yt-dlp-missing"));
        let result = service
            .resolve("https://youtu.be/x", ResolveDepth::Deep)
            .await;
        assert_matches!(result, Err(ServiceError::ToolNotFound(_)));
    }
}
