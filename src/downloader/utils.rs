// Helper functions for the yt-dlp backend and the shell

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use super::config::EngineConfig;

/// Common paths where yt-dlp might be installed
const COMMON_YTDLP_PATHS: [&str; 3] = [
    "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
    "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac
    "/usr/bin/yt-dlp",          // System installation
];

/// Locate the yt-dlp binary. An explicit path always wins.
pub fn find_ytdlp(explicit: Option<&str>) -> String {
    if let Some(path) = explicit.map(str::trim).filter(|p| !p.is_empty()) {
        return path.to_string();
    }

    for path in COMMON_YTDLP_PATHS {
        if Path::new(path).exists() {
            return path.to_string();
        }
    }

    if let Ok(path) = which::which("yt-dlp") {
        return path.to_string_lossy().to_string();
    }

    // Last resort: hope it's in PATH at spawn time
    "yt-dlp".to_string()
}

/// `--cookies <file>` when the configured file exists. A missing file is
/// not an error, yt-dlp just runs unauthenticated.
pub fn cookie_args(config: &EngineConfig) -> Vec<String> {
    match &config.cookie_file {
        Some(path) if path.is_file() => {
            debug!(target: "yt-dlp", cookies = %path.display(), "using cookie file");
            vec!["--cookies".to_string(), path.to_string_lossy().to_string()]
        }
        _ => Vec::new(),
    }
}

/// Proxy and socket-timeout arguments
pub fn network_args(config: &EngineConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(proxy) = &config.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }

    if let Some(timeout) = config.socket_timeout_secs {
        args.push("--socket-timeout".to_string());
        args.push(timeout.to_string());
    }

    args
}

/// Program and arguments that open `folder` in the platform file browser,
/// selecting `highlight` when the platform supports it and the file exists
pub fn open_folder_command(folder: &Path, highlight: Option<&Path>) -> (String, Vec<String>) {
    let target = highlight.filter(|p| p.exists());

    if cfg!(target_os = "windows") {
        match target {
            Some(file) => (
                "explorer".to_string(),
                vec![format!("/select,{}", file.display())],
            ),
            None => ("explorer".to_string(), vec![folder.display().to_string()]),
        }
    } else if cfg!(target_os = "macos") {
        match target {
            Some(file) => (
                "open".to_string(),
                vec!["-R".to_string(), file.display().to_string()],
            ),
            None => ("open".to_string(), vec![folder.display().to_string()]),
        }
    } else {
        // xdg-open has no way to select a file
        ("xdg-open".to_string(), vec![folder.display().to_string()])
    }
}

/// Open the folder in the platform file browser. Failures are logged only.
pub fn open_folder(folder: &Path, highlight: Option<&Path>) {
    let (program, args) = open_folder_command(folder, highlight);
    debug!(target: "shell", %program, ?args, "opening folder");
    if let Err(e) = Command::new(&program).args(&args).spawn() {
        warn!(target: "shell", %program, folder = %folder.display(), error = %e, "could not open folder");
    }
}

/// Best guess for the user's download folder
pub fn default_output_folder() -> Option<PathBuf> {
    dirs::download_dir().or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
}
