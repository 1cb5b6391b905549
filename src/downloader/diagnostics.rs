// Failure diagnostics - classifies collaborator error text
//
// yt-dlp reports every failure as free-form stderr. We map the common
// patterns (geo-block, private video, age gate, ...) to a FailureCause so
// the control path can show something shorter than a stack of log lines.

use serde::{Deserialize, Serialize};

/// Known reasons a resolve or download can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCause {
    /// DRM-protected, paid or Premium-only content
    DrmProtected,

    /// Requires channel membership
    MembersOnly,

    /// Age-gated, needs a logged-in cookie file
    AgeRestricted,

    /// Private video requiring authorization
    PrivateVideo,

    /// Deleted or otherwise unavailable
    Unavailable,

    /// Not available in the caller's region
    GeoBlocked,

    /// HTTP 429 or similar throttling
    RateLimited,

    /// Bot / captcha challenge
    BotDetection,

    /// HTTP 403 without a more specific hint
    Forbidden,

    /// Timeout, refused or unreachable network
    NetworkTimeout,

    /// The URL is malformed or no extractor handles it
    UnsupportedUrl,

    /// Something went wrong but the text matched nothing we know
    Unknown,
}

impl FailureCause {
    /// Check if a cookie file might get past this
    pub fn cookies_might_help(&self) -> bool {
        matches!(
            self,
            Self::AgeRestricted
                | Self::PrivateVideo
                | Self::MembersOnly
                | Self::BotDetection
                | Self::Forbidden
        )
    }

    /// Check if this is a permanent restriction (no workaround)
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::DrmProtected | Self::Unavailable | Self::UnsupportedUrl)
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::DrmProtected => "DRM-protected content",
            Self::MembersOnly => "Members-only content",
            Self::AgeRestricted => "Age-restricted content",
            Self::PrivateVideo => "Private video",
            Self::Unavailable => "Video unavailable",
            Self::GeoBlocked => "Geographic restriction",
            Self::RateLimited => "Rate limited",
            Self::BotDetection => "Bot detection triggered",
            Self::Forbidden => "Access denied (HTTP 403)",
            Self::NetworkTimeout => "Network timeout",
            Self::UnsupportedUrl => "Unsupported or malformed URL",
            Self::Unknown => "Unknown failure",
        }
    }
}

/// Analyze error text and return the most specific cause.
/// Returns `None` only for empty input.
pub fn diagnose_error(error: &str) -> Option<FailureCause> {
    let lower = error.to_lowercase();

    if lower.contains("drm")
        || lower.contains("widevine")
        || lower.contains("youtube premium")
        || lower.contains("requires purchase")
        || lower.contains("this video requires payment")
    {
        return Some(FailureCause::DrmProtected);
    }

    if lower.contains("members only")
        || lower.contains("members-only")
        || lower.contains("join this channel")
        || lower.contains("available to members")
    {
        return Some(FailureCause::MembersOnly);
    }

    if lower.contains("age-restricted") || lower.contains("sign in to confirm your age") {
        return Some(FailureCause::AgeRestricted);
    }

    if lower.contains("private video")
        || lower.contains("video is private")
        || lower.contains("sign in if you've been granted access")
    {
        return Some(FailureCause::PrivateVideo);
    }

    if lower.contains("video unavailable")
        || lower.contains("video has been removed")
        || lower.contains("no longer available")
        || lower.contains("video is unavailable")
    {
        return Some(FailureCause::Unavailable);
    }

    if lower.contains("not available in your country")
        || lower.contains("blocked in your country")
        || lower.contains("geo restrict")
        || lower.contains("geo-restrict")
    {
        return Some(FailureCause::GeoBlocked);
    }

    if lower.contains("unsupported url")
        || lower.contains("is not a valid url")
        || lower.contains("invalid url")
    {
        return Some(FailureCause::UnsupportedUrl);
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(FailureCause::RateLimited);
    }

    if lower.contains("not a bot") || lower.contains("captcha") || lower.contains("unusual traffic") {
        return Some(FailureCause::BotDetection);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(FailureCause::Forbidden);
    }

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("network is unreachable")
        || lower.contains("name or service not known")
    {
        return Some(FailureCause::NetworkTimeout);
    }

    if !error.trim().is_empty() {
        return Some(FailureCause::Unknown);
    }

    None
}

/// First line worth showing to a user, usually the `ERROR:` line
pub fn headline(error: &str) -> &str {
    error
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| error.lines().map(str::trim).rev().find(|l| !l.is_empty()))
        .unwrap_or("")
}
