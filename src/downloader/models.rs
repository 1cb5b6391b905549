// Common data models for the download engine

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// One download job in the queue. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub url: String,
    pub title: String,
    /// Index of this job in its queue
    pub position: usize,
}

/// Format details of the currently selected item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub id: String,
    pub extension: String,
    /// `"1280x720"`, `"720"`, `"audio only"` or `"N/A"`
    pub resolution: String,
    pub size_bytes: Option<u64>,
}

impl FormatDescriptor {
    /// Video height parsed from the resolution string, if any
    pub fn height(&self) -> Option<u32> {
        let res = self.resolution.trim();
        let tail = match res.rsplit_once('x') {
            Some((_, h)) => h,
            None => res.strip_suffix('p').unwrap_or(res),
        };
        tail.parse().ok().filter(|h| *h > 0)
    }

    /// Size in megabytes with two decimals, or `"Unknown"`
    pub fn size_label(&self) -> String {
        match self.size_bytes {
            Some(bytes) if bytes > 0 => format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0),
            _ => "Unknown".to_string(),
        }
    }

    /// One-line listing entry
    pub fn label(&self) -> String {
        format!(
            "Ext: {} | Resolution: {} | Size: {}",
            self.extension,
            self.resolution,
            self.size_label()
        )
    }
}

/// Descriptive metadata of the currently selected item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    pub uploader: String,
    pub upload_date: String,
    pub description: String,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Multi-line text block: title, uploader, date, then description
    pub fn summary(&self) -> String {
        format!(
            "Title: {}\nUploader: {}\nUpload date: {}\n\nDescription:\n{}",
            self.title, self.uploader, self.upload_date, self.description
        )
    }
}

/// Deep result for exactly one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleItem {
    pub title: String,
    pub url: String,
    pub formats: Vec<FormatDescriptor>,
    pub metadata: Metadata,
}

/// Shallow playlist entry. `url` may be absolute, relative or missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub title: String,
    pub url: Option<String>,
    pub id: Option<String>,
}

/// What the media-extraction service returned for a URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResolvedInfo {
    Single(SingleItem),
    Playlist {
        title: Option<String>,
        entries: Vec<PlaylistEntry>,
    },
}

/// How much the service should fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveDepth {
    /// Enumerate playlist entries without per-entry formats
    Shallow,
    /// Full metadata and format list for one item
    Deep,
}

impl std::fmt::Display for ResolveDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shallow => write!(f, "shallow"),
            Self::Deep => write!(f, "deep"),
        }
    }
}

/// Status field of a raw progress record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawStatus {
    #[default]
    Downloading,
    Finished,
    #[serde(other)]
    Other,
}

/// Raw progress record as the service reports it (yt-dlp hook dictionary)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawProgress {
    #[serde(default)]
    pub status: RawStatus,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub downloaded_bytes: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_bytes: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_bytes_estimate: Option<u64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub eta: Option<f64>,
    #[serde(default)]
    pub filename: Option<String>,
}

// yt-dlp emits null, ints, floats or the odd string in these fields
fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite()))
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Ok(lenient_f64(d)?.filter(|v| *v >= 0.0).map(|v| v as u64))
}

/// Phase of a normalized sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    Downloading,
    Finished,
}

/// Normalized progress sample streamed to observers. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    pub phase: ProgressPhase,
    /// Whole percent done, `None` while the total is unknown
    pub percent: Option<u8>,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub speed_bytes_per_sec: Option<f64>,
    pub eta_seconds: Option<u64>,
    /// Set only on `Finished`
    pub final_file_path: Option<PathBuf>,
}

/// Request handed to the service's download entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    /// Opaque format-selection expression
    pub quality_expr: String,
    pub output_folder: PathBuf,
}

/// Successful download result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub final_path: Option<PathBuf>,
}

/// yt-dlp output template: `{title}_{height}p.{extension}`
pub const OUTPUT_TEMPLATE: &str = "%(title)s_%(height)sp.%(ext)s";

/// File name the output template produces. A missing height renders as
/// `NA`, which is what yt-dlp substitutes for absent fields.
pub fn output_file_name(title: &str, height: Option<u32>, extension: &str) -> String {
    let height = height.map_or_else(|| "NA".to_string(), |h| h.to_string());
    format!("{}_{}p.{}", title, height, extension)
}
