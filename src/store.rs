//! Flat-file persistence for scraped transcripts.
//!
//! Every video produces two artifacts inside one output directory: a
//! structured JSON record keyed by video id (machine-readable, kept for
//! reference) and a plain-text export keyed by the sanitized title. The text
//! export doubles as the "already downloaded" marker, so its presence is what
//! the pipeline checks before fetching anything.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timed caption unit. Field names mirror the structured file on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

/// The structured per-video record written to `{video_id}_transcript.json`.
///
/// `scraped_at` is stamped once when the record is built for saving and never
/// recomputed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub video_id: String,
    pub title: String,
    pub clean_title: String,
    pub url: String,
    pub scraped_at: DateTime<Utc>,
    pub transcript: Vec<TranscriptSegment>,
}

/// Listing entry for one plain-text export, as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEntry {
    pub filename: String,
    pub title: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

/// Store scoped to a single output directory. The directory is created on the
/// first write; listing a directory that does not exist yet yields nothing.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    root: PathBuf,
}

impl TranscriptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True when the plain-text export for this title already exists. This is
    /// the sole idempotence check; the JSON file is not consulted.
    pub fn export_exists(&self, clean_title: &str) -> bool {
        self.root.join(format!("{clean_title}.txt")).exists()
    }

    /// Writes both artifacts for one video, overwriting silently. Filesystem
    /// errors propagate to the caller; no partial-write cleanup is attempted.
    pub fn save(&self, record: &TranscriptRecord, include_timestamps: bool) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating {}", self.root.display()))?;

        let json_path = self
            .root
            .join(format!("{}_transcript.json", record.video_id));
        let json = serde_json::to_string_pretty(record).context("serializing transcript record")?;
        fs::write(&json_path, json).with_context(|| format!("writing {}", json_path.display()))?;

        let txt_path = self.root.join(format!("{}.txt", record.clean_title));
        let mut body = String::new();
        body.push_str(&format!("Title: {}\n", record.title));
        body.push_str(&format!("Video ID: {}\n", record.video_id));
        body.push_str(&format!("URL: {}\n", record.url));
        body.push_str(&format!(
            "Scraped: {}\n",
            record.scraped_at.format("%Y-%m-%d %H:%M:%S")
        ));
        body.push_str(&"-".repeat(50));
        body.push_str("\n\n");

        for segment in &record.transcript {
            if include_timestamps {
                body.push_str(&format!(
                    "{} {}\n",
                    format_timestamp(segment.start),
                    segment.text
                ));
            } else {
                body.push_str(&segment.text);
                body.push('\n');
            }
        }

        fs::write(&txt_path, body).with_context(|| format!("writing {}", txt_path.display()))?;
        Ok(())
    }

    /// Lists the plain-text exports, most recently modified first.
    pub fn list(&self) -> Result<Vec<ExportEntry>> {
        let mut entries = Vec::new();
        if !self.root.exists() {
            return Ok(entries);
        }

        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("reading {}", self.root.display()))?
        {
            let entry = entry?;
            let file_name = entry
                .file_name()
                .into_string()
                .unwrap_or_else(|os| os.to_string_lossy().into_owned());
            let Some(title) = file_name.strip_suffix(".txt") else {
                continue;
            };

            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let modified_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            entries.push(ExportEntry {
                title: title.to_string(),
                filename: file_name,
                size_bytes: metadata.len(),
                modified_at,
            });
        }

        entries.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        Ok(entries)
    }

    /// Returns the full contents of one export, or `None` when it is missing.
    pub fn read_export(&self, filename: &str) -> Result<Option<String>> {
        let Some(path) = self.export_path(filename) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        Ok(Some(content))
    }

    /// Resolves a client-supplied filename inside the output directory,
    /// rejecting anything that is not a single plain path component.
    pub fn export_path(&self, filename: &str) -> Option<PathBuf> {
        let candidate = Path::new(filename);
        let mut components = candidate.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.root.join(candidate)),
            _ => None,
        }
    }

    /// Deletes every file directly inside the output directory (both JSON
    /// records and text exports). Subdirectories are left alone.
    pub fn clear_all(&self) -> Result<()> {
        if !self.root.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("reading {}", self.root.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                fs::remove_file(&path)
                    .with_context(|| format!("removing {}", path.display()))?;
            }
        }
        Ok(())
    }
}

/// Renders a segment start offset as `[HH:MM:SS]` with floor semantics.
pub fn format_timestamp(start_seconds: f64) -> String {
    let total = start_seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("[{hours:02}:{minutes:02}:{seconds:02}]")
}
