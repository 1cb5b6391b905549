// Progress reporting - turns raw service records into stable samples

use std::path::PathBuf;

use super::models::{ProgressPhase, ProgressSample, RawProgress, RawStatus};

const MIB: f64 = 1024.0 * 1024.0;

/// Normalize one raw record. Pure.
///
/// A `finished` record reports 100%: downloaded bytes are set to the total,
/// falling back to whatever byte count is known.
pub fn normalize(raw: &RawProgress) -> ProgressSample {
    let total = raw.total_bytes.or(raw.total_bytes_estimate);
    let eta_seconds = raw.eta.filter(|e| *e >= 0.0).map(|e| e.floor() as u64);

    match raw.status {
        RawStatus::Finished => {
            let total = total.or(raw.downloaded_bytes);
            ProgressSample {
                phase: ProgressPhase::Finished,
                percent: Some(100),
                downloaded_bytes: total.unwrap_or(0),
                total_bytes: total,
                speed_bytes_per_sec: raw.speed,
                eta_seconds: Some(0),
                final_file_path: raw.filename.as_ref().map(PathBuf::from),
            }
        }
        RawStatus::Downloading | RawStatus::Other => {
            let downloaded = raw.downloaded_bytes.unwrap_or(0);
            let total = total.filter(|t| *t > 0);
            ProgressSample {
                phase: ProgressPhase::Downloading,
                percent: percent_of(downloaded, total),
                downloaded_bytes: downloaded,
                total_bytes: total,
                speed_bytes_per_sec: raw.speed.filter(|s| *s >= 0.0),
                eta_seconds,
                final_file_path: None,
            }
        }
    }
}

/// `floor(downloaded * 100 / total)` clamped to 100
fn percent_of(downloaded: u64, total: Option<u64>) -> Option<u8> {
    let total = total.filter(|t| *t > 0)?;
    let pct = (downloaded as u128 * 100) / total as u128;
    Some(pct.min(100) as u8)
}

/// Compact ETA: `0s`, `1m 5s`, `1h 1m 1s`. Missing renders as `N/A`.
pub fn format_eta(seconds: Option<u64>) -> String {
    let Some(total) = seconds else {
        return "N/A".to_string();
    };

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

impl ProgressSample {
    pub fn eta_label(&self) -> String {
        format_eta(self.eta_seconds)
    }

    /// Single status line for a progress bar caption
    pub fn status_line(&self) -> String {
        if self.phase == ProgressPhase::Finished {
            return match &self.final_file_path {
                Some(path) => format!("Download finished: {}", path.display()),
                None => "Download finished.".to_string(),
            };
        }

        let downloaded = self.downloaded_bytes as f64 / MIB;
        let mut line = match (self.percent, self.total_bytes) {
            (Some(pct), Some(total)) => format!(
                "Downloading: {}% ({:.2} MB of {:.2} MB)",
                pct,
                downloaded,
                total as f64 / MIB
            ),
            _ => format!("Downloading: {:.2} MB", downloaded),
        };
        if let Some(speed) = self.speed_bytes_per_sec {
            line.push_str(&format!(" @ {:.2} MB/s", speed / MIB));
        }
        if self.eta_seconds.is_some() {
            line.push_str(&format!(" ETA {}", self.eta_label()));
        }
        line
    }
}

/// Per-job reporter that sits between the service hook and observers.
///
/// - byte counts accumulate across the separate streams of one job
///   (video then audio), so they never restart from zero;
/// - a determinate percentage never goes backwards: once the first stream
///   reaches 100%, later streams are reported at 100% with live byte,
///   speed and ETA figures;
/// - `finished` records for individual streams are held back, the only
///   Finished sample is the one built by `finish`.
#[derive(Debug, Default)]
pub struct ProgressReporter {
    completed_bytes: u64,
    seen_bytes: u64,
    high_water: Option<u8>,
    last_path: Option<PathBuf>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample to forward for this record, if any
    pub fn accept(&mut self, raw: &RawProgress) -> Option<ProgressSample> {
        let mut sample = normalize(raw);

        if sample.phase == ProgressPhase::Finished {
            self.completed_bytes += sample.downloaded_bytes;
            if sample.final_file_path.is_some() {
                self.last_path = sample.final_file_path;
            }
            return None;
        }

        sample.downloaded_bytes += self.completed_bytes;
        sample.total_bytes = sample.total_bytes.map(|t| t + self.completed_bytes);
        self.seen_bytes = self
            .seen_bytes
            .max(sample.total_bytes.unwrap_or(sample.downloaded_bytes));

        if let Some(pct) = percent_of(sample.downloaded_bytes, sample.total_bytes) {
            let pct = self.high_water.map_or(pct, |high| pct.max(high));
            self.high_water = Some(pct);
            sample.percent = Some(pct);
        }
        Some(sample)
    }

    /// Terminal sample. `final_path` wins over any path seen in the stream.
    pub fn finish(self, final_path: Option<PathBuf>) -> ProgressSample {
        let total = self.completed_bytes.max(self.seen_bytes);
        ProgressSample {
            phase: ProgressPhase::Finished,
            percent: Some(100),
            downloaded_bytes: total,
            total_bytes: Some(total),
            speed_bytes_per_sec: None,
            eta_seconds: Some(0),
            final_file_path: final_path.or(self.last_path),
        }
    }
}
