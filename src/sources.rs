//! External collaborators: channel enumeration via `yt-dlp` and caption
//! retrieval over YouTube's timedtext endpoint.
//!
//! Both sit behind small traits so the pipeline can be exercised in tests
//! without a network or the `yt-dlp` binary.

#[cfg(test)]
use std::path::PathBuf;
use std::process::Command;
#[cfg(test)]
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::store::TranscriptSegment;

#[cfg(test)]
static YT_DLP_STUB: Mutex<Option<PathBuf>> = Mutex::new(None);
#[cfg(test)]
static STUB_USE_LOCK: Mutex<()> = Mutex::new(());

fn yt_dlp_command() -> Command {
    #[cfg(test)]
    {
        if let Some(path) = YT_DLP_STUB.lock().unwrap().clone() {
            return Command::new(path);
        }
    }
    Command::new("yt-dlp")
}

#[cfg(test)]
pub(crate) fn set_ytdlp_stub_path(path: PathBuf) -> YtDlpStubGuard {
    let guard = STUB_USE_LOCK.lock().unwrap();
    {
        let mut lock = YT_DLP_STUB.lock().unwrap();
        *lock = Some(path);
    }
    YtDlpStubGuard { lock: Some(guard) }
}

#[cfg(test)]
pub(crate) struct YtDlpStubGuard {
    lock: Option<MutexGuard<'static, ()>>,
}

#[cfg(test)]
impl Drop for YtDlpStubGuard {
    fn drop(&mut self) {
        *YT_DLP_STUB.lock().unwrap() = None;
        self.lock.take();
    }
}

/// One entry from the channel's uploads list, before sanitization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEntry {
    pub id: String,
    pub title: String,
}

/// Enumerates a channel's uploads. `uploads_url` is expected to already be in
/// its `/videos` form (see [`uploads_url`]).
pub trait ChannelLister: Send {
    fn list_uploads(&self, uploads_url: &str, limit: Option<usize>) -> Result<Vec<VideoEntry>>;
}

/// Retrieves the timed caption segments for one video. An empty vec and an
/// error both mean "no transcript" to the pipeline; causes (no captions,
/// private video, network failure) are not distinguished.
pub trait CaptionSource: Send {
    fn fetch_captions(&self, video_id: &str) -> Result<Vec<TranscriptSegment>>;
}

/// Normalizes a channel URL to its uploads form by appending `/videos` unless
/// it is already there. Query strings and fragments are preserved.
/// Applying this twice yields the same string.
pub fn uploads_url(channel_url: &str) -> String {
    let (without_fragment, fragment) = match channel_url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (channel_url, None),
    };
    let (base, query) = match without_fragment.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (without_fragment, None),
    };

    let base = base.trim_end_matches('/');
    let mut result = if base.ends_with("/videos") {
        base.to_string()
    } else {
        format!("{base}/videos")
    };

    if let Some(query) = query {
        result.push('?');
        result.push_str(query);
    }
    if let Some(fragment) = fragment {
        result.push('#');
        result.push_str(fragment);
    }

    result
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Flat-playlist entry as dumped by `yt-dlp --flat-playlist --dump-json`.
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Option<String>,
    title: Option<String>,
}

/// Enumeration backed by the `yt-dlp` binary, one JSON entry per line.
#[derive(Debug, Default)]
pub struct YtDlpLister;

impl ChannelLister for YtDlpLister {
    fn list_uploads(&self, uploads_url: &str, limit: Option<usize>) -> Result<Vec<VideoEntry>> {
        let mut command = yt_dlp_command();
        command
            .arg("--flat-playlist")
            .arg("--dump-json")
            .arg("--ignore-errors")
            .arg("--no-warnings");

        if let Some(limit) = limit {
            command.arg("--playlist-end").arg(limit.to_string());
        }

        command.arg(uploads_url);

        let output = command
            .output()
            .with_context(|| format!("retrieving uploads from {uploads_url}"))?;

        if !output.status.success() {
            bail!(
                "failed to list uploads for {} (status: {})",
                uploads_url,
                output.status
            );
        }

        let content = String::from_utf8_lossy(&output.stdout);
        Ok(parse_flat_playlist(&content))
    }
}

/// Parses NDJSON playlist output, skipping malformed lines and entries that
/// lack an id or title.
fn parse_flat_playlist(content: &str) -> Vec<VideoEntry> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<FlatEntry>(line).ok())
        .filter_map(|entry| match (entry.id, entry.title) {
            (Some(id), Some(title)) if !id.is_empty() && !title.is_empty() => {
                Some(VideoEntry { id, title })
            }
            _ => None,
        })
        .collect()
}

/// Caption retrieval over HTTP: loads the watch page, picks a caption track
/// (English preferred), and fetches its `json3` payload.
///
/// Requests carry no timeout on purpose; an unresponsive upstream stalls the
/// run rather than aborting it.
#[derive(Debug, Default)]
pub struct TimedTextClient;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    #[serde(default)]
    language_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Json3Payload {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
struct Json3Event {
    #[serde(rename = "tStartMs")]
    start_ms: Option<u64>,
    #[serde(rename = "dDurationMs")]
    duration_ms: Option<u64>,
    #[serde(default)]
    segs: Option<Vec<Json3Seg>>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    utf8: Option<String>,
}

impl CaptionSource for TimedTextClient {
    fn fetch_captions(&self, video_id: &str) -> Result<Vec<TranscriptSegment>> {
        let page = ureq::get(&watch_url(video_id))
            .call()
            .with_context(|| format!("fetching watch page for {video_id}"))?
            .into_string()
            .context("reading watch page body")?;

        let Some(tracks) = extract_caption_tracks(&page) else {
            return Ok(Vec::new());
        };
        let Some(track) = pick_caption_track(&tracks) else {
            return Ok(Vec::new());
        };

        let track_url = format!("{}&fmt=json3", track.base_url);
        let payload: Json3Payload = ureq::get(&track_url)
            .call()
            .with_context(|| format!("fetching captions for {video_id}"))?
            .into_json()
            .context("parsing caption payload")?;

        Ok(segments_from_json3(payload))
    }
}

/// Pulls the `captionTracks` JSON array out of the watch page markup by
/// bracket matching from the key onwards.
fn extract_caption_tracks(page: &str) -> Option<Vec<CaptionTrack>> {
    let key = "\"captionTracks\":";
    let start = page.find(key)? + key.len();
    let rest = &page[start..];
    let open = rest.find('[')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (index, c) in rest[open..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    let raw = &rest[open..open + index + 1];
                    return serde_json::from_str(raw).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Prefers an English track when one exists, otherwise takes the first.
fn pick_caption_track<'a>(tracks: &'a [CaptionTrack]) -> Option<&'a CaptionTrack> {
    tracks
        .iter()
        .find(|track| {
            track
                .language_code
                .as_deref()
                .is_some_and(|code| code.starts_with("en"))
        })
        .or_else(|| tracks.first())
}

/// Converts json3 events into ordered segments, skipping events that carry no
/// text (style windows, newline padding).
fn segments_from_json3(payload: Json3Payload) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();
    for event in payload.events {
        let Some(segs) = event.segs else { continue };
        let text: String = segs
            .into_iter()
            .filter_map(|seg| seg.utf8)
            .collect::<String>()
            .trim()
            .to_string();
        if text.is_empty() {
            continue;
        }
        segments.push(TranscriptSegment {
            text,
            start: event.start_ms.unwrap_or(0) as f64 / 1000.0,
            duration: event.duration_ms.unwrap_or(0) as f64 / 1000.0,
        });
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn uploads_url_appends_videos_suffix() {
        assert_eq!(
            uploads_url("https://www.youtube.com/@Channel"),
            "https://www.youtube.com/@Channel/videos"
        );
        assert_eq!(
            uploads_url("https://www.youtube.com/@Channel/"),
            "https://www.youtube.com/@Channel/videos"
        );
        assert_eq!(
            uploads_url("https://www.youtube.com/@Channel/videos"),
            "https://www.youtube.com/@Channel/videos"
        );
    }

    #[test]
    fn uploads_url_preserves_query_and_fragment() {
        assert_eq!(
            uploads_url("https://www.youtube.com/@Channel?view=0#top"),
            "https://www.youtube.com/@Channel/videos?view=0#top"
        );
    }

    #[test]
    fn uploads_url_is_idempotent() {
        for url in [
            "https://www.youtube.com/@Channel",
            "https://www.youtube.com/@Channel/videos",
            "https://www.youtube.com/@Channel?x=1",
        ] {
            let once = uploads_url(url);
            assert_eq!(uploads_url(&once), once);
        }
    }

    #[test]
    fn parse_flat_playlist_skips_bad_lines() {
        let content = concat!(
            "{\"id\":\"abc123\",\"title\":\"First\"}\n",
            "not json\n",
            "{\"id\":\"\",\"title\":\"empty id\"}\n",
            "{\"title\":\"no id\"}\n",
            "{\"id\":\"xyz789\",\"title\":\"Second\"}\n",
        );
        let entries = parse_flat_playlist(content);
        assert_eq!(
            entries,
            vec![
                VideoEntry {
                    id: "abc123".into(),
                    title: "First".into()
                },
                VideoEntry {
                    id: "xyz789".into(),
                    title: "Second".into()
                },
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn lister_runs_stubbed_binary() {
        let dir = tempdir().unwrap();
        let stub = dir.path().join("yt-dlp-stub.sh");
        std::fs::write(
            &stub,
            "#!/bin/sh\nprintf '{\"id\":\"abc123\",\"title\":\"Stubbed\"}\\n'\n",
        )
        .unwrap();
        let mut perms = std::fs::metadata(&stub).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&stub, perms).unwrap();

        let _guard = set_ytdlp_stub_path(stub);
        let entries = YtDlpLister
            .list_uploads("https://www.youtube.com/@Channel/videos", Some(5))
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "abc123");
        assert_eq!(entries[0].title, "Stubbed");
    }

    #[test]
    fn extract_caption_tracks_from_markup() {
        let page = r#"junk before "captionTracks":[{"baseUrl":"https://example.com/tt?v=1&lang=en","languageCode":"en","name":{"simpleText":"English"}}],"more":true"#;
        let tracks = extract_caption_tracks(page).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].base_url, "https://example.com/tt?v=1&lang=en");
        assert_eq!(tracks[0].language_code.as_deref(), Some("en"));
    }

    #[test]
    fn extract_caption_tracks_missing_returns_none() {
        assert!(extract_caption_tracks("<html>no captions here</html>").is_none());
    }

    #[test]
    fn pick_caption_track_prefers_english() {
        let tracks = vec![
            CaptionTrack {
                base_url: "de".into(),
                language_code: Some("de".into()),
            },
            CaptionTrack {
                base_url: "en-US".into(),
                language_code: Some("en-US".into()),
            },
        ];
        assert_eq!(pick_caption_track(&tracks).unwrap().base_url, "en-US");

        let no_english = vec![CaptionTrack {
            base_url: "fr".into(),
            language_code: Some("fr".into()),
        }];
        assert_eq!(pick_caption_track(&no_english).unwrap().base_url, "fr");
    }

    #[test]
    fn segments_from_json3_skips_textless_events() {
        let payload: Json3Payload = serde_json::from_str(
            r#"{"events":[
                {"tStartMs":0,"dDurationMs":2400,"segs":[{"utf8":"hello "},{"utf8":"world"}]},
                {"tStartMs":2400,"dDurationMs":100,"segs":[{"utf8":"\n"}]},
                {"tStartMs":3000,"dDurationMs":500},
                {"tStartMs":3725700,"dDurationMs":1000,"segs":[{"utf8":"later"}]}
            ]}"#,
        )
        .unwrap();
        let segments = segments_from_json3(payload);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "hello world");
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[0].duration, 2.4);
        assert_eq!(segments[1].text, "later");
        assert_eq!(segments[1].start, 3725.7);
    }
}
