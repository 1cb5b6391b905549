// FormatSelector - quality profiles and format-selection expressions
//
// The user never picks a raw format id. They pick one of a fixed set of
// quality profiles, each mapped to a deterministic yt-dlp `-f` expression:
// a height-capped mp4 video stream plus an m4a audio stream (with looser
// fallbacks), or audio only.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::models::FormatDescriptor;

/// Enumerated quality profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityProfile {
    #[serde(rename = "144p")]
    P144,
    #[serde(rename = "240p")]
    P240,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "AudioOnly")]
    AudioOnly,
}

impl QualityProfile {
    pub const ALL: [QualityProfile; 7] = [
        Self::P144,
        Self::P240,
        Self::P360,
        Self::P480,
        Self::P720,
        Self::P1080,
        Self::AudioOnly,
    ];

    /// Stable identifier, also the persisted form
    pub fn id(&self) -> &'static str {
        match self {
            Self::P144 => "144p",
            Self::P240 => "240p",
            Self::P360 => "360p",
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::AudioOnly => "AudioOnly",
        }
    }

    /// Height cap in pixels, `None` for audio only
    pub fn max_height(&self) -> Option<u32> {
        match self {
            Self::P144 => Some(144),
            Self::P240 => Some(240),
            Self::P360 => Some(360),
            Self::P480 => Some(480),
            Self::P720 => Some(720),
            Self::P1080 => Some(1080),
            Self::AudioOnly => None,
        }
    }

    /// yt-dlp `-f` expression for this profile
    pub fn format_expr(&self) -> String {
        match self.max_height() {
            Some(h) => format!(
                "bestvideo[ext=mp4][height<={h}]+bestaudio[ext=m4a]/bestvideo[height<={h}]+bestaudio/best[height<={h}]"
            ),
            None => "bestaudio[ext=m4a]/bestaudio".to_string(),
        }
    }
}

impl fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for QualityProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        if matches!(wanted.as_str(), "audio" | "audio only" | "audioonly") {
            return Ok(Self::AudioOnly);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.id().to_lowercase() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|p| p.id()).collect();
                format!("Unknown quality '{}', expected one of: {}", s, known.join(", "))
            })
    }
}

/// Format selector over a resolved format list
pub struct FormatSelector;

impl FormatSelector {
    /// Profiles that have a matching video height (within 10%) in `formats`.
    /// Audio only is always offered.
    pub fn available_profiles(formats: &[FormatDescriptor]) -> Vec<QualityProfile> {
        let heights: Vec<u32> = formats.iter().filter_map(FormatDescriptor::height).collect();

        QualityProfile::ALL
            .iter()
            .copied()
            .filter(|profile| match profile.max_height() {
                Some(target) => heights
                    .iter()
                    .any(|&h| h >= target * 9 / 10 && h <= target * 11 / 10),
                None => true,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_format(id: &str, resolution: &str) -> FormatDescriptor {
        FormatDescriptor {
            id: id.to_string(),
            extension: "mp4".to_string(),
            resolution: resolution.to_string(),
            size_bytes: None,
        }
    }

    #[test]
    fn test_format_expr_caps_height() {
        let expr = QualityProfile::P720.format_expr();
        assert!(expr.starts_with("bestvideo[ext=mp4][height<=720]+bestaudio[ext=m4a]"));
        assert!(expr.ends_with("best[height<=720]"));
        assert_eq!(QualityProfile::AudioOnly.format_expr(), "bestaudio[ext=m4a]/bestaudio");
    }

    #[test]
    fn test_parse_ids() {
        for profile in QualityProfile::ALL {
            assert_eq!(profile.id().parse::<QualityProfile>(), Ok(profile));
        }
        assert_eq!("audio".parse::<QualityProfile>(), Ok(QualityProfile::AudioOnly));
        assert_eq!(" 1080P ".parse::<QualityProfile>(), Ok(QualityProfile::P1080));
        assert!("4k".parse::<QualityProfile>().is_err());
    }

    #[test]
    fn test_serde_uses_ids() {
        let json = serde_json::to_string(&QualityProfile::P360).unwrap();
        assert_eq!(json, "\"360p\"");
        let back: QualityProfile = serde_json::from_str("\"AudioOnly\"").unwrap();
        assert_eq!(back, QualityProfile::AudioOnly);
    }

    #[test]
    fn test_available_profiles() {
        let formats = vec![
            make_format("140", "audio only"),
            make_format("18", "640x360"),
            make_format("22", "1280x720"),
            make_format("137", "1080"),
        ];
        assert_eq!(
            FormatSelector::available_profiles(&formats),
            vec![
                QualityProfile::P360,
                QualityProfile::P720,
                QualityProfile::P1080,
                QualityProfile::AudioOnly,
            ]
        );
    }

    #[test]
    fn test_audio_only_always_offered() {
        assert_eq!(
            FormatSelector::available_profiles(&[]),
            vec![QualityProfile::AudioOnly]
        );
    }
}
