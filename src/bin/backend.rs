#![forbid(unsafe_code)]

//! Axum front end for the channel transcript scraper.
//!
//! The server is a thin adapter: it starts at most one background scrape job,
//! serves polling status, and exposes the transcript exports already sitting
//! on disk. Nothing here talks to YouTube directly.

use std::{
    io::Write,
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path as AxumPath, State},
    http::{HeaderMap, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::{fs::File, signal};
use tokio_util::io::ReaderStream;
use tubescribe::config::{ConfigOverrides, load_config};
use tubescribe::job::{JobController, JobStatus};
use tubescribe::pipeline::{ChannelScraper, RunOptions};
use tubescribe::security::ensure_not_root;
use tubescribe::sources::{TimedTextClient, YtDlpLister};
use tubescribe::store::{ExportEntry, TranscriptStore};

#[derive(Debug, Clone)]
struct BackendArgs {
    transcripts_dir: PathBuf,
    www_root: PathBuf,
    port: u16,
    listen_host: IpAddr,
}

impl BackendArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut transcripts_override: Option<PathBuf> = None;
        let mut www_override: Option<PathBuf> = None;
        let mut port_override: Option<u16> = None;
        let mut host_override: Option<String> = None;
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--transcripts-dir=") {
                transcripts_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--www-root=") {
                www_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--port=") {
                port_override = Some(parse_port_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--host=") {
                host_override = Some(value.to_string());
                continue;
            }

            match arg.as_str() {
                "--transcripts-dir" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--transcripts-dir requires a value"))?;
                    transcripts_override = Some(PathBuf::from(value));
                }
                "--www-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--www-root requires a value"))?;
                    www_override = Some(PathBuf::from(value));
                }
                "--port" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--port requires a value"))?;
                    port_override = Some(parse_port_arg(&value)?);
                }
                "--host" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--host requires a value"))?;
                    host_override = Some(value);
                }
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }

        let config = load_config(ConfigOverrides {
            transcripts_dir: transcripts_override,
            www_root: www_override,
            port: port_override,
            host: host_override,
            ..ConfigOverrides::default()
        })?;

        Ok(Self {
            transcripts_dir: config.transcripts_dir,
            www_root: config.www_root,
            port: config.port,
            listen_host: parse_host_arg(&config.host)?,
        })
    }
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/SCRAPER_HOST")
}

/// Shared state injected into every handler.
#[derive(Clone)]
struct AppState {
    jobs: JobController,
    transcripts_dir: Arc<PathBuf>,
    www_root: Arc<PathBuf>,
}

impl AppState {
    fn store(&self) -> TranscriptStore {
        TranscriptStore::new(self.transcripts_dir.as_path())
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeRequest {
    channel_url: String,
    #[serde(default)]
    max_videos: Option<usize>,
    #[serde(default)]
    include_timestamps: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeStarted {
    message: &'static str,
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptContent {
    filename: String,
    content: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let BackendArgs {
        transcripts_dir,
        www_root,
        port,
        listen_host,
    } = BackendArgs::parse()?;

    ensure_not_root("backend")?;

    let state = AppState {
        jobs: JobController::new(),
        transcripts_dir: Arc::new(transcripts_dir),
        www_root: Arc::new(www_root),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/scrape", post(start_scrape))
        .route("/api/progress", get(get_progress))
        .route("/api/transcripts", get(list_transcripts))
        .route("/api/transcripts/{filename}", get(get_transcript))
        .route("/api/download/{filename}", get(download_transcript))
        .route("/api/download-all", get(download_all))
        .route("/api/clear", post(clear_transcripts))
        .fallback(static_fallback)
        .with_state(state);

    let addr = SocketAddr::new(listen_host, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    println!("Scraper API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

async fn shutdown_signal() {
    // Failing to install the handler only affects graceful shutdown; the
    // process still dies on Ctrl+C.
    if let Err(err) = signal::ctrl_c().await {
        eprintln!("Failed to install Ctrl+C handler: {err}");
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn start_scrape(
    State(state): State<AppState>,
    Json(payload): Json<ScrapeRequest>,
) -> ApiResult<Json<ScrapeStarted>> {
    let channel_url = payload.channel_url.trim().to_string();
    if channel_url.is_empty() {
        return Err(ApiError::bad_request("Channel URL is required"));
    }

    let scraper = ChannelScraper::new(
        Box::new(YtDlpLister),
        Box::new(TimedTextClient),
        state.store(),
    );
    let opts = RunOptions {
        max_videos: payload.max_videos,
        include_timestamps: payload.include_timestamps,
        ..RunOptions::default()
    };

    if !state.jobs.start(scraper, channel_url, opts) {
        return Err(ApiError::conflict("Scraping already in progress"));
    }

    Ok(Json(ScrapeStarted {
        message: "Scraping started",
        status: "started",
    }))
}

async fn get_progress(State(state): State<AppState>) -> Json<JobStatus> {
    Json(state.jobs.status())
}

async fn list_transcripts(State(state): State<AppState>) -> ApiResult<Json<Vec<ExportEntry>>> {
    let entries = state
        .store()
        .list()
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(entries))
}

async fn get_transcript(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
) -> ApiResult<Json<TranscriptContent>> {
    let content = state
        .store()
        .read_export(&filename)
        .map_err(|err| ApiError::internal(err.to_string()))?
        .ok_or_else(|| ApiError::not_found("transcript not found"))?;
    Ok(Json(TranscriptContent { filename, content }))
}

async fn download_transcript(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
) -> ApiResult<Response> {
    let path = state
        .store()
        .export_path(&filename)
        .ok_or_else(|| ApiError::not_found("transcript not found"))?;
    stream_attachment(path, &filename).await
}

async fn download_all(State(state): State<AppState>) -> ApiResult<Response> {
    let dir = state.transcripts_dir.as_path().to_path_buf();
    let archive = tokio::task::spawn_blocking(move || build_archive(&dir))
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?
        .map_err(|err| ApiError::internal(err.to_string()))?
        .ok_or_else(|| ApiError::not_found("No transcripts available"))?;

    let name = format!("transcripts_{}.zip", Utc::now().format("%Y%m%d_%H%M%S"));
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        "application/zip"
            .parse()
            .map_err(|_| ApiError::internal("invalid header"))?,
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{name}\"")
            .parse()
            .map_err(|_| ApiError::internal("invalid header"))?,
    );
    Ok((headers, archive).into_response())
}

async fn clear_transcripts(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state
        .store()
        .clear_all()
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(
        serde_json::json!({ "message": "All transcripts cleared" }),
    ))
}

/// Streams a file from disk as an attachment download.
async fn stream_attachment(path: PathBuf, filename: &str) -> ApiResult<Response> {
    let metadata = tokio::fs::metadata(&path).await;
    if !metadata.map(|meta| meta.is_file()).unwrap_or(false) {
        return Err(ApiError::not_found("transcript not found"));
    }

    let file = File::open(&path)
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?;
    let stream = ReaderStream::new(file);

    let mime = mime_guess::from_path(&path).first_or_text_plain();
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        mime.as_ref()
            .parse()
            .map_err(|_| ApiError::internal("invalid content type"))?,
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{filename}\"")
            .parse()
            .map_err(|_| ApiError::internal("invalid header"))?,
    );
    Ok((headers, Body::from_stream(stream)).into_response())
}

/// Bundles every file directly inside the transcripts directory into an
/// in-memory ZIP. Returns `None` when there is nothing to bundle.
fn build_archive(dir: &Path) -> Result<Option<Vec<u8>>> {
    if !dir.exists() {
        return Ok(None);
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    if files.is_empty() {
        return Ok(None);
    }
    files.sort();

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for path in files {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        writer
            .start_file(name, options)
            .context("adding archive entry")?;
        let bytes =
            std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        writer.write_all(&bytes).context("writing archive entry")?;
    }
    let cursor = writer.finish().context("finalizing archive")?;
    Ok(Some(cursor.into_inner()))
}

async fn static_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path();
    if path == "/api" || path.starts_with("/api/") {
        return ApiError::not_found("endpoint not found").into_response();
    }

    match serve_www_path(&state.www_root, path).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn serve_www_path(root: &Path, request_path: &str) -> ApiResult<Response> {
    let target = resolve_www_path(root, request_path)?;
    let metadata = tokio::fs::metadata(&target).await;

    match metadata {
        Ok(meta) if meta.is_dir() => serve_static_file(root.join("index.html")).await,
        Ok(_) => serve_static_file(target).await,
        Err(_) => {
            if should_fallback_to_index(request_path) {
                serve_static_file(root.join("index.html")).await
            } else {
                Err(ApiError::not_found("file not found"))
            }
        }
    }
}

async fn serve_static_file(path: PathBuf) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        mime.as_ref()
            .parse()
            .map_err(|_| ApiError::internal("invalid content type"))?,
    );
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

fn resolve_www_path(root: &Path, request_path: &str) -> ApiResult<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(root.join("index.html"));
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(root.join(candidate))
}

fn should_fallback_to_index(request_path: &str) -> bool {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return true;
    }
    Path::new(trimmed).extension().is_none()
}
