//! Single-flight job controller: wraps one pipeline run in a background task
//! and exposes a polling-readable status snapshot.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::pipeline::{ChannelScraper, RunOptions, RunResult};

/// Lifecycle of the (at most one) scrape job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Starting,
    Running,
    Completed,
    Error,
}

/// Snapshot served to polling clients. Mutated in place by the background
/// worker, always behind the controller's mutex, so readers never observe a
/// half-applied update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub active: bool,
    pub current: usize,
    pub total: usize,
    pub current_video: String,
    #[serde(rename = "status")]
    pub state: JobState,
    pub message: String,
    pub results: Option<RunResult>,
}

impl JobStatus {
    fn idle() -> Self {
        Self {
            active: false,
            current: 0,
            total: 0,
            current_video: String::new(),
            state: JobState::Idle,
            message: String::new(),
            results: None,
        }
    }
}

/// Owns the process-wide job status. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct JobController {
    status: Arc<Mutex<JobStatus>>,
}

impl Default for JobController {
    fn default() -> Self {
        Self::new()
    }
}

impl JobController {
    pub fn new() -> Self {
        Self {
            status: Arc::new(Mutex::new(JobStatus::idle())),
        }
    }

    /// Starts a scrape in the background. Returns `false` without touching
    /// anything when a job is already active; the check and the flip to
    /// active happen under one lock, so concurrent starts cannot both win.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, scraper: ChannelScraper, channel_url: String, opts: RunOptions) -> bool {
        {
            let mut status = self.status.lock();
            if status.active {
                return false;
            }
            *status = JobStatus {
                active: true,
                state: JobState::Starting,
                message: "Initializing scraper...".to_string(),
                ..JobStatus::idle()
            };
        }

        let status = self.status.clone();
        tokio::spawn(async move {
            status.lock().message = "Extracting video information...".to_string();

            let progress_status = status.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                // Item-level outcomes only move the counters; a failed item
                // does not change the job state.
                scraper.run(&channel_url, &opts, |current, total, title, _item| {
                    let mut status = progress_status.lock();
                    status.state = JobState::Running;
                    status.current = current;
                    status.total = total;
                    status.current_video = title.to_string();
                })
            })
            .await;

            let mut status = status.lock();
            status.active = false;
            match outcome {
                Ok(Ok(result)) => {
                    status.state = JobState::Completed;
                    status.message = result.message.clone();
                    status.results = Some(result);
                }
                Ok(Err(err)) => {
                    status.state = JobState::Error;
                    status.message = format!("Error: {err:#}");
                    status.results = None;
                }
                Err(err) => {
                    status.state = JobState::Error;
                    status.message = format!("Error: {err}");
                    status.results = None;
                }
            }
        });

        true
    }

    /// Read-only snapshot of the current status.
    pub fn status(&self) -> JobStatus {
        self.status.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{CaptionSource, ChannelLister, VideoEntry};
    use crate::store::{TranscriptSegment, TranscriptStore};
    use anyhow::Result;
    use std::time::Duration;
    use tempfile::tempdir;

    struct FixedLister {
        entries: Vec<VideoEntry>,
        delay: Duration,
    }

    impl ChannelLister for FixedLister {
        fn list_uploads(&self, _url: &str, _limit: Option<usize>) -> Result<Vec<VideoEntry>> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            Ok(self.entries.clone())
        }
    }

    struct AlwaysCaptions;

    impl CaptionSource for AlwaysCaptions {
        fn fetch_captions(&self, _video_id: &str) -> Result<Vec<TranscriptSegment>> {
            Ok(vec![TranscriptSegment {
                text: "line".into(),
                start: 0.0,
                duration: 1.0,
            }])
        }
    }

    fn quick_opts() -> RunOptions {
        RunOptions {
            delay: Duration::ZERO,
            ..RunOptions::default()
        }
    }

    async fn wait_until_terminal(controller: &JobController) -> JobStatus {
        for _ in 0..200 {
            let status = controller.status();
            if !status.active && status.state != JobState::Idle && status.state != JobState::Starting
            {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached a terminal state");
    }

    fn scraper(entries: Vec<VideoEntry>, delay: Duration, dir: &std::path::Path) -> ChannelScraper {
        ChannelScraper::new(
            Box::new(FixedLister { entries, delay }),
            Box::new(AlwaysCaptions),
            TranscriptStore::new(dir),
        )
    }

    #[tokio::test]
    async fn completed_run_leaves_terminal_status() {
        let dir = tempdir().unwrap();
        let controller = JobController::new();
        let entries = vec![VideoEntry {
            id: "a1".into(),
            title: "One".into(),
        }];

        assert!(controller.start(
            scraper(entries, Duration::ZERO, dir.path()),
            "https://www.youtube.com/@Chan".into(),
            quick_opts(),
        ));

        let status = wait_until_terminal(&controller).await;
        assert_eq!(status.state, JobState::Completed);
        assert!(!status.active);
        let results = status.results.unwrap();
        assert_eq!(results.successful, 1);
        assert_eq!(
            status.message,
            "Completed! Successfully downloaded 1 out of 1 transcripts."
        );
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_active() {
        let dir = tempdir().unwrap();
        let controller = JobController::new();
        let entries = vec![VideoEntry {
            id: "a1".into(),
            title: "One".into(),
        }];

        // A slow enumeration keeps the first job active long enough for the
        // second start to collide with it.
        assert!(controller.start(
            scraper(entries.clone(), Duration::from_millis(300), dir.path()),
            "https://www.youtube.com/@Chan".into(),
            quick_opts(),
        ));
        assert!(!controller.start(
            scraper(entries, Duration::ZERO, dir.path()),
            "https://www.youtube.com/@Chan".into(),
            quick_opts(),
        ));

        let status = wait_until_terminal(&controller).await;
        assert_eq!(status.state, JobState::Completed);

        // Once terminal, a new start is accepted again.
        let entries = vec![VideoEntry {
            id: "b2".into(),
            title: "Two".into(),
        }];
        assert!(controller.start(
            scraper(entries, Duration::ZERO, dir.path()),
            "https://www.youtube.com/@Chan".into(),
            quick_opts(),
        ));
        wait_until_terminal(&controller).await;
    }

    #[tokio::test]
    async fn empty_channel_ends_completed_not_error() {
        let dir = tempdir().unwrap();
        let controller = JobController::new();

        controller.start(
            scraper(Vec::new(), Duration::ZERO, dir.path()),
            "https://www.youtube.com/@Empty".into(),
            quick_opts(),
        );

        let status = wait_until_terminal(&controller).await;
        assert_eq!(status.state, JobState::Completed);
        assert!(!status.active);
        assert_eq!(status.message, "No videos found");
        let results = status.results.unwrap();
        assert!(!results.success);
        assert_eq!(results.total_found, 0);
    }

    #[tokio::test]
    async fn filesystem_failure_surfaces_as_error_state() {
        let dir = tempdir().unwrap();
        // Point the store at a path that cannot be created because a file
        // occupies it.
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, "not a directory").unwrap();

        let controller = JobController::new();
        let entries = vec![VideoEntry {
            id: "a1".into(),
            title: "One".into(),
        }];
        controller.start(
            ChannelScraper::new(
                Box::new(FixedLister {
                    entries,
                    delay: Duration::ZERO,
                }),
                Box::new(AlwaysCaptions),
                TranscriptStore::new(&blocked),
            ),
            "https://www.youtube.com/@Chan".into(),
            quick_opts(),
        );

        let status = wait_until_terminal(&controller).await;
        assert_eq!(status.state, JobState::Error);
        assert!(!status.active);
        assert!(status.message.starts_with("Error: "));
        assert!(status.results.is_none());
    }

    #[tokio::test]
    async fn progress_updates_are_visible_while_running() {
        let dir = tempdir().unwrap();
        let controller = JobController::new();
        let entries = vec![
            VideoEntry {
                id: "a1".into(),
                title: "One".into(),
            },
            VideoEntry {
                id: "b2".into(),
                title: "Two".into(),
            },
        ];
        controller.start(
            scraper(entries, Duration::ZERO, dir.path()),
            "https://www.youtube.com/@Chan".into(),
            quick_opts(),
        );

        let status = wait_until_terminal(&controller).await;
        assert_eq!(status.current, 2);
        assert_eq!(status.total, 2);
        assert_eq!(status.current_video, "Two");
        assert_eq!(status.state, JobState::Completed);
    }

    #[test]
    fn status_serializes_with_original_field_names() {
        let status = JobStatus::idle();
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["status"], "idle");
        assert!(value["active"].is_boolean());
        assert!(value.get("currentVideo").is_some());
        assert!(value.get("results").is_some());
    }
}
