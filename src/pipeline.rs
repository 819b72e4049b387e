//! The sequential scrape pipeline: enumerate uploads, fetch captions per
//! video, persist, skip what is already on disk.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::sanitize::export_title;
use crate::sources::{CaptionSource, ChannelLister, uploads_url, watch_url};
use crate::store::{TranscriptRecord, TranscriptStore};

/// One upload with its sanitized export title resolved.
#[derive(Debug, Clone)]
pub struct VideoRef {
    pub id: String,
    pub raw_title: String,
    pub clean_title: String,
}

/// Outcome reported for each item through the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Skipped,
    Success,
    Failed,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Knobs for one run. The delay is the inter-item throttle applied after each
/// fetched video (skipped items do not wait).
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_videos: Option<usize>,
    pub include_timestamps: bool,
    pub delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_videos: None,
            include_timestamps: false,
            delay: Duration::from_secs(1),
        }
    }
}

/// Summary produced once at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub success: bool,
    pub message: String,
    pub processed: usize,
    pub successful: usize,
    pub total_found: usize,
}

impl RunResult {
    fn empty() -> Self {
        Self {
            success: false,
            message: "No videos found".to_string(),
            processed: 0,
            successful: 0,
            total_found: 0,
        }
    }
}

/// Drives one scrape over a channel. Strictly sequential; the only
/// concurrency lives in the job controller wrapping this.
pub struct ChannelScraper {
    lister: Box<dyn ChannelLister>,
    captions: Box<dyn CaptionSource>,
    store: TranscriptStore,
}

impl ChannelScraper {
    pub fn new(
        lister: Box<dyn ChannelLister>,
        captions: Box<dyn CaptionSource>,
        store: TranscriptStore,
    ) -> Self {
        Self {
            lister,
            captions,
            store,
        }
    }

    pub fn store(&self) -> &TranscriptStore {
        &self.store
    }

    /// Runs the enumerate → fetch → skip-or-save loop.
    ///
    /// `on_progress(current, total, clean_title, status)` fires synchronously
    /// after each item's outcome is known. Enumeration failures behave as an
    /// empty channel; filesystem failures abort the run.
    pub fn run(
        &self,
        channel_url: &str,
        opts: &RunOptions,
        mut on_progress: impl FnMut(usize, usize, &str, ItemStatus),
    ) -> Result<RunResult> {
        let list_url = uploads_url(channel_url);
        println!("Extracting video information from: {list_url}");

        let entries = match self.lister.list_uploads(&list_url, opts.max_videos) {
            Ok(entries) => entries,
            Err(err) => {
                eprintln!("  Warning: could not list uploads: {err}");
                Vec::new()
            }
        };

        if entries.is_empty() {
            println!("No videos found.");
            return Ok(RunResult::empty());
        }

        let videos = resolve_titles(entries);
        let total = videos.len();
        println!("Found {total} videos");

        let mut processed = 0usize;
        let mut successful = 0usize;

        for (index, video) in videos.iter().enumerate() {
            let current = index + 1;
            println!("Processing video {current}/{total}: {}", video.raw_title);

            if self.store.export_exists(&video.clean_title) {
                println!("  Transcript already exists, skipping");
                processed += 1;
                successful += 1;
                on_progress(current, total, &video.clean_title, ItemStatus::Skipped);
                continue;
            }

            let segments = match self.captions.fetch_captions(&video.id) {
                Ok(segments) => segments,
                Err(err) => {
                    eprintln!("  Warning: caption fetch failed for {}: {err}", video.id);
                    Vec::new()
                }
            };

            if segments.is_empty() {
                eprintln!("  Warning: no transcript for: {}", video.raw_title);
                processed += 1;
                on_progress(current, total, &video.clean_title, ItemStatus::Failed);
            } else {
                let record = TranscriptRecord {
                    video_id: video.id.clone(),
                    title: video.raw_title.clone(),
                    clean_title: video.clean_title.clone(),
                    url: watch_url(&video.id),
                    scraped_at: Utc::now(),
                    transcript: segments,
                };
                self.store.save(&record, opts.include_timestamps)?;
                println!("  Saved transcript for: {}", video.raw_title);
                processed += 1;
                successful += 1;
                on_progress(current, total, &video.clean_title, ItemStatus::Success);
            }

            if !opts.delay.is_zero() {
                thread::sleep(opts.delay);
            }
        }

        Ok(RunResult {
            success: true,
            message: format!(
                "Completed! Successfully downloaded {successful} out of {processed} transcripts."
            ),
            processed,
            successful,
            total_found: total,
        })
    }
}

/// Sanitizes every title and resolves collisions within the batch: the first
/// video keeps the bare title, later duplicates get their video id appended.
/// Deterministic in enumeration order, so re-runs produce the same names.
fn resolve_titles(entries: Vec<crate::sources::VideoEntry>) -> Vec<VideoRef> {
    let mut seen: HashSet<String> = HashSet::new();
    entries
        .into_iter()
        .map(|entry| {
            let mut clean_title = export_title(&entry.title, &entry.id);
            if !seen.insert(clean_title.clone()) {
                clean_title = format!("{clean_title} {}", entry.id);
                seen.insert(clean_title.clone());
            }
            VideoRef {
                id: entry.id,
                raw_title: entry.title,
                clean_title,
            }
        })
        .collect()
}
