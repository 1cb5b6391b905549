// Command-line control path

use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use crate::downloader::config::ENV_COOKIES;
use crate::downloader::utils::{default_output_folder, open_folder};
use crate::downloader::{
    EngineConfig, EngineError, EngineState, Event, FormatSelector, Orchestrator, ProgressPhase,
    QualityProfile,
};

/// Download a video or a whole playlist with yt-dlp
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Video or playlist URL (defaults to the last one used)
    pub url: Option<String>,

    /// Directory to store downloaded files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Quality: 144p, 240p, 360p, 480p, 720p, 1080p or audio
    #[arg(short, long)]
    pub quality: Option<QualityProfile>,

    /// Start at this playlist entry (1-based)
    #[arg(short, long)]
    pub start: Option<usize>,

    /// Only show metadata and formats, download nothing
    #[arg(long)]
    pub info_only: bool,

    /// Open the output folder when the queue is done
    #[arg(long)]
    pub open: bool,

    /// Browser-exported cookies.txt for restricted videos
    #[arg(long)]
    pub cookies: Option<PathBuf>,

    /// Proxy URL passed to yt-dlp (http://, socks5h://)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Socket timeout for yt-dlp, in seconds
    #[arg(long)]
    pub socket_timeout: Option<u32>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// How a command-line session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Stopped,
}

/// Build the yt-dlp engine, wire Ctrl-C to a stop request and run
pub async fn run(args: Args) -> Result<Outcome, EngineError> {
    let config = engine_config(&args);
    info!(target: "cli", ytdlp = %config.ytdlp_path, session = %config.session_file.display(), "starting");
    let mut engine = Orchestrator::from_config(&config);

    let stop = engine.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
        // a second Ctrl-C while unwinding quits for real
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    execute(&mut engine, &args).await
}

/// Environment settings with the command-line overrides applied
fn engine_config(args: &Args) -> EngineConfig {
    let mut config = EngineConfig::from_env();
    if let Some(path) = &args.cookies {
        config = config.with_cookie_file(Some(path.clone()));
    }
    if let Some(proxy) = &args.proxy {
        config = config.with_proxy(Some(proxy.clone()));
    }
    if let Some(seconds) = args.socket_timeout {
        config = config.with_timeout(Some(seconds));
    }
    config
}

/// Resolve, show, then download the queue
pub async fn execute(engine: &mut Orchestrator, args: &Args) -> Result<Outcome, EngineError> {
    let url = match &args.url {
        Some(url) => url.clone(),
        None if !engine.last_url().is_empty() => engine.last_url().to_string(),
        None => return Err(EngineError::invalid("no URL given and no previous session")),
    };

    if let Some(dir) = &args.output_dir {
        engine.set_output_folder(dir.clone())?;
    } else if engine.output_folder().is_none() {
        if let Some(dir) = default_output_folder() {
            engine.set_output_folder(dir)?;
        }
    }
    match args.quality {
        Some(quality) => engine.set_quality(quality),
        None if engine.quality().is_none() => engine.set_quality(QualityProfile::P720),
        None => {}
    }

    println!("Fetching info for {}", url);
    engine.resolve(&url)?;
    if drive(engine).await?.0 == Outcome::Stopped {
        return Ok(Outcome::Stopped);
    }

    if let Some(start) = args.start {
        let index = start
            .checked_sub(1)
            .ok_or_else(|| EngineError::invalid("playlist entries are numbered from 1"))?;
        if index != engine.cursor() {
            engine.select(index)?;
            if drive(engine).await?.0 == Outcome::Stopped {
                return Ok(Outcome::Stopped);
            }
        }
    }

    if args.info_only {
        return Ok(Outcome::Completed);
    }

    if let Some(quality) = engine.quality() {
        let offered = engine.available_profiles();
        if !engine.formats().is_empty() && !offered.contains(&quality) {
            println!("Note: {} is not listed for this item, yt-dlp will pick the closest match", quality);
        }
    }

    engine.download()?;
    let (outcome, last_file) = drive(engine).await?;

    if outcome == Outcome::Completed && args.open {
        if let Some(folder) = engine.output_folder() {
            open_folder(folder, last_file.as_deref());
        }
    }
    Ok(outcome)
}

/// Advice for failures the user can do something about
fn failure_hint(error: &EngineError) -> Option<String> {
    let cause = error.cause()?;
    if cause.cookies_might_help() {
        Some(format!(
            "Hint: {} may need a logged-in session. Export browser cookies to a cookies.txt file and pass it with --cookies or {}.",
            cause.description(),
            ENV_COOKIES
        ))
    } else if cause.is_permanent() {
        Some(format!("{} cannot be worked around with other settings.", cause.description()))
    } else {
        None
    }
}

/// Print events until the engine goes quiet. A failure ends the run.
/// Also hands back the path of the last file written.
async fn drive(engine: &mut Orchestrator) -> Result<(Outcome, Option<PathBuf>), EngineError> {
    let mut outcome = Outcome::Completed;
    let mut failure = None;
    let mut last_file = None;
    let mut total = engine.jobs().len().max(1);

    while let Some(event) = engine.next_event().await {
        match event {
            Event::StateChanged(EngineState::Stopping) => println!("\nstopping…"),
            Event::StateChanged(_) => {}
            Event::Resolved {
                jobs,
                cursor,
                metadata,
                formats,
            } => {
                total = jobs.len().max(1);
                if !metadata.is_empty() {
                    println!("{}", metadata.summary());
                }
                if jobs.len() > 1 {
                    println!("\nPlaylist: {} items", jobs.len());
                    for job in &jobs {
                        let marker = if job.position == cursor { ">" } else { " " };
                        println!("{} {:>3}. {}", marker, job.position + 1, job.title);
                    }
                }
                if !formats.is_empty() {
                    println!("\nFormats:");
                    for format in &formats {
                        println!("  {}", format.label());
                    }
                }
                let profiles: Vec<String> = FormatSelector::available_profiles(&formats)
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                println!("\nAvailable qualities: {}", profiles.join(", "));
            }
            Event::JobStarted(job) => {
                println!("[{}/{}] {}", job.position + 1, total, job.title);
            }
            Event::Progress { sample, .. } => {
                if sample.phase == ProgressPhase::Finished {
                    println!("\r{}", sample.status_line());
                } else {
                    print!("\r{:<80}", sample.status_line());
                    let _ = std::io::stdout().flush();
                }
            }
            Event::JobFinished { path, .. } => {
                if path.is_some() {
                    last_file = path;
                }
            }
            Event::QueueFinished => println!("All downloads finished."),
            Event::Failed(error) => {
                println!();
                if let Some(hint) = failure_hint(&error) {
                    println!("{}", hint);
                }
                failure = Some(error);
            }
            Event::Stopped => {
                println!("stopped");
                outcome = Outcome::Stopped;
            }
        }
    }

    match failure {
        Some(error) => Err(error),
        None => Ok((outcome, last_file)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::traits::stub::ServiceStub;
    use crate::downloader::SessionStore;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    const PLAYLIST: &str = "https://www.youtube.com/playlist?list=PL1";

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("playlist-downloader").chain(argv.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["https://youtu.be/x", "-o", "/tmp/out", "-q", "audio", "--info-only"]);
        assert_eq!(parsed.url.as_deref(), Some("https://youtu.be/x"));
        assert_eq!(parsed.output_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(parsed.quality, Some(QualityProfile::AudioOnly));
        assert!(parsed.info_only);

        assert!(Args::try_parse_from(["playlist-downloader", "-q", "4k"]).is_err());
    }

    #[test]
    fn test_network_flags_override_config() {
        let parsed = args(&[
            "https://youtu.be/x",
            "--cookies",
            "/tmp/cookies.txt",
            "--proxy",
            "socks5h://127.0.0.1:1080",
            "--socket-timeout",
            "15",
        ]);
        let config = engine_config(&parsed);
        assert_eq!(config.cookie_file, Some(PathBuf::from("/tmp/cookies.txt")));
        assert_eq!(config.proxy.as_deref(), Some("socks5h://127.0.0.1:1080"));
        assert_eq!(config.socket_timeout_secs, Some(15));
    }

    #[test]
    fn test_failure_hint() {
        let private = EngineError::ResolutionFailed("ERROR: Private video".to_string().into());
        assert!(failure_hint(&private).is_some_and(|h| h.contains("--cookies")));

        let drm = EngineError::DownloadFailed("ERROR: This video is DRM protected".to_string());
        assert!(failure_hint(&drm).is_some_and(|h| h.contains("cannot be worked around")));

        let timeout = EngineError::DownloadFailed("ERROR: Read timed out".to_string());
        assert_eq!(failure_hint(&timeout), None);
        assert_eq!(failure_hint(&EngineError::invalid("URL is empty")), None);
    }

    #[tokio::test]
    async fn test_drive_reports_last_file() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(ServiceStub::new().with_playlist(PLAYLIST, &["a", "b"]));
        let mut engine = Orchestrator::new(stub, SessionStore::new(dir.path().join("session.json")));

        engine.resolve(PLAYLIST).unwrap();
        drive(&mut engine).await.unwrap();
        engine.set_output_folder(dir.path()).unwrap();
        engine.set_quality(QualityProfile::P480);
        engine.download().unwrap();

        let (outcome, last_file) = drive(&mut engine).await.unwrap();
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(last_file, Some(dir.path().join("Video b_480p.mp4")));
    }

    #[tokio::test]
    async fn test_execute_downloads_whole_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(ServiceStub::new().with_playlist(PLAYLIST, &["a", "b"]));
        let mut engine =
            Orchestrator::new(stub.clone(), SessionStore::new(dir.path().join("session.json")));

        let folder = dir.path().to_string_lossy().to_string();
        let outcome = execute(&mut engine, &args(&[PLAYLIST, "-o", &folder, "-q", "480p"]))
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(engine.cursor(), 1);
        assert_eq!(
            stub.calls()
                .iter()
                .filter(|c| c.starts_with("download:"))
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_execute_info_only_with_start() {
        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(ServiceStub::new().with_playlist(PLAYLIST, &["a", "b", "c"]));
        let mut engine =
            Orchestrator::new(stub.clone(), SessionStore::new(dir.path().join("session.json")));

        let folder = dir.path().to_string_lossy().to_string();
        let outcome = execute(
            &mut engine,
            &args(&[PLAYLIST, "-o", &folder, "--start", "3", "--info-only"]),
        )
        .await
        .unwrap();

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(engine.cursor(), 2);
        assert_eq!(engine.metadata().title, "Video c");
        assert!(!stub.calls().iter().any(|c| c.starts_with("download:")));
    }

    #[tokio::test]
    async fn test_execute_surfaces_resolution_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Orchestrator::new(
            Arc::new(ServiceStub::new()),
            SessionStore::new(dir.path().join("session.json")),
        );
        let folder = dir.path().to_string_lossy().to_string();

        let result = execute(&mut engine, &args(&["https://nowhere.invalid/x", "-o", &folder])).await;
        assert_matches!(result, Err(EngineError::ResolutionFailed(_)));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn test_execute_needs_a_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Orchestrator::new(
            Arc::new(ServiceStub::new()),
            SessionStore::new(dir.path().join("session.json")),
        );
        assert_matches!(
            execute(&mut engine, &args(&[])).await,
            Err(EngineError::InvalidInput(_))
        );
    }
}
