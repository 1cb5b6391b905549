// Playlist controller - the job queue and its cursor

use tracing::warn;

use super::models::{Job, PlaylistEntry, ResolvedInfo};

/// Canonical watch URL for an entry that only carries an id
pub const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Titles yt-dlp gives to playlist slots it cannot download
const UNAVAILABLE_TITLES: [&str; 2] = ["[Private video]", "[Deleted video]"];

/// Ordered jobs plus the index of the one downloading (or about to).
///
/// `cursor < jobs.len()` whenever the queue is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistController {
    jobs: Vec<Job>,
    cursor: usize,
}

impl PlaylistController {
    /// Build a fresh queue from a resolution. Deterministic; cursor is 0.
    pub fn from_resolved(info: &ResolvedInfo, input_url: &str) -> Self {
        let jobs = match info {
            ResolvedInfo::Single(item) => {
                let url = if item.url.trim().is_empty() {
                    input_url.to_string()
                } else {
                    item.url.clone()
                };
                vec![Job {
                    url,
                    title: item.title.clone(),
                    position: 0,
                }]
            }
            ResolvedInfo::Playlist { entries, .. } => entries
                .iter()
                .filter(|e| !UNAVAILABLE_TITLES.contains(&e.title.as_str()))
                .map(|e| (entry_url(e, input_url), e.title.clone()))
                .enumerate()
                .map(|(position, (url, title))| Job { url, title, position })
                .collect(),
        };

        Self { jobs, cursor: 0 }
    }

    /// Rebuild from persisted jobs. Positions are renumbered and an
    /// out-of-range cursor falls back to 0.
    pub fn restore(jobs: Vec<Job>, cursor: usize) -> Self {
        let jobs: Vec<Job> = jobs
            .into_iter()
            .enumerate()
            .map(|(position, job)| Job { position, ..job })
            .collect();
        let cursor = if cursor < jobs.len() { cursor } else { 0 };
        Self { jobs, cursor }
    }

    pub fn current(&self) -> Option<&Job> {
        self.jobs.get(self.cursor)
    }

    /// Move to the next job. At the end, returns `None` and leaves the
    /// cursor where it is.
    pub fn advance(&mut self) -> Option<&Job> {
        if self.cursor + 1 < self.jobs.len() {
            self.cursor += 1;
            self.jobs.get(self.cursor)
        } else {
            None
        }
    }

    /// Point the cursor at `index` if it exists
    pub fn select(&mut self, index: usize) -> Option<&Job> {
        if index < self.jobs.len() {
            self.cursor = index;
            self.jobs.get(index)
        } else {
            None
        }
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Direct URL if there is one, else a watch URL from the id, else the
/// input URL. The last resort can point several jobs at the same URL.
fn entry_url(entry: &PlaylistEntry, input_url: &str) -> String {
    let url = entry.url.as_deref().map(str::trim).filter(|u| !u.is_empty());

    if let Some(url) = url.filter(|u| u.starts_with("http://") || u.starts_with("https://")) {
        return url.to_string();
    }

    // flat extraction sometimes puts the bare id in `url`
    let id = entry
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .or(url);
    if let Some(id) = id {
        return format!("{}{}", WATCH_URL_PREFIX, id);
    }

    warn!(
        target: "playlist",
        title = %entry.title,
        "entry has neither url nor id, reusing input URL"
    );
    input_url.to_string()
}
