// Engine configuration

use std::path::PathBuf;
use tracing::warn;

use super::utils::find_ytdlp;

pub const ENV_YTDLP: &str = "PLAYLIST_DOWNLOADER_YTDLP";
pub const ENV_COOKIES: &str = "PLAYLIST_DOWNLOADER_COOKIES";
pub const ENV_SESSION: &str = "PLAYLIST_DOWNLOADER_SESSION";
pub const ENV_PROXY: &str = "PLAYLIST_DOWNLOADER_PROXY";
pub const ENV_SOCKET_TIMEOUT: &str = "PLAYLIST_DOWNLOADER_SOCKET_TIMEOUT";
pub const ENV_PLAYER_CLIENT: &str = "PLAYLIST_DOWNLOADER_PLAYER_CLIENT";
pub const ENV_USER_AGENT: &str = "PLAYLIST_DOWNLOADER_USER_AGENT";

const APP_DIR: &str = "playlist-downloader";
const SESSION_FILE: &str = "session.json";

/// Settings shared by the yt-dlp backend and the session store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// yt-dlp binary
    pub ytdlp_path: String,
    /// Browser-exported cookies, used only when the file exists
    pub cookie_file: Option<PathBuf>,
    pub session_file: PathBuf,
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    pub socket_timeout_secs: Option<u32>,
    /// YouTube player client for downloads (android, web, tv)
    pub player_client: Option<String>,
    /// Sent with resolution requests
    pub user_agent: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: find_ytdlp(None),
            cookie_file: default_cookie_file(),
            session_file: default_session_file(),
            proxy: None,
            socket_timeout_secs: None,
            player_client: Some("android".to_string()),
            user_agent: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by the `PLAYLIST_DOWNLOADER_*` variables
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(path) = get(ENV_YTDLP) {
            config = config.with_ytdlp_path(find_ytdlp(Some(&path)));
        }
        if let Some(path) = get(ENV_COOKIES) {
            config = config.with_cookie_file(Some(PathBuf::from(path)));
        }
        if let Some(path) = get(ENV_SESSION) {
            config = config.with_session_file(path);
        }
        if let Some(proxy) = get(ENV_PROXY) {
            config = config.with_proxy(Some(proxy));
        }
        if let Some(raw) = get(ENV_SOCKET_TIMEOUT) {
            match raw.parse::<u32>() {
                Ok(seconds) => config = config.with_timeout(Some(seconds)),
                Err(e) => warn!(target: "config", value = %raw, error = %e, "ignoring bad socket timeout"),
            }
        }
        if let Some(client) = get(ENV_PLAYER_CLIENT) {
            // "default" leaves the choice to yt-dlp
            let client = (client != "default").then_some(client);
            config = config.with_player_client(client);
        }
        if let Some(agent) = get(ENV_USER_AGENT) {
            config = config.with_user_agent(Some(agent));
        }
        config
    }

    pub fn with_ytdlp_path(mut self, path: impl Into<String>) -> Self {
        self.ytdlp_path = path.into();
        self
    }

    pub fn with_cookie_file(mut self, path: Option<PathBuf>) -> Self {
        self.cookie_file = path;
        self
    }

    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = path.into();
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_timeout(mut self, seconds: Option<u32>) -> Self {
        self.socket_timeout_secs = seconds;
        self
    }

    pub fn with_player_client(mut self, client: Option<String>) -> Self {
        self.player_client = client;
        self
    }

    pub fn with_user_agent(mut self, agent: Option<String>) -> Self {
        self.user_agent = agent;
        self
    }
}

/// `~/Downloads/cookies.txt`
pub fn default_cookie_file() -> Option<PathBuf> {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .map(|d| d.join("cookies.txt"))
}

/// `<config dir>/playlist-downloader/session.json`, or `./session.json`
/// when the platform has no config directory
pub fn default_session_file() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR).join(SESSION_FILE))
        .unwrap_or_else(|| PathBuf::from(SESSION_FILE))
}
