#![forbid(unsafe_code)]

//! Command-line front end for the channel transcript scraper. Runs the same
//! pipeline the backend exposes over HTTP, synchronously, with progress on
//! stdout.

use std::{env, path::PathBuf, process::exit, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use std::process::{Command, Stdio};
use tubescribe::config::{ConfigOverrides, load_config};
use tubescribe::pipeline::{ChannelScraper, RunOptions};
use tubescribe::security::ensure_not_root;
use tubescribe::sources::{TimedTextClient, YtDlpLister};
use tubescribe::store::TranscriptStore;

#[derive(Debug, Clone)]
struct ScrapeArgs {
    channel_url: String,
    max_videos: Option<usize>,
    include_timestamps: bool,
    output_dir: Option<PathBuf>,
    delay: Duration,
}

impl ScrapeArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(env::args().skip(1))
    }

    #[cfg(test)]
    fn from_slice(values: &[&str]) -> Result<Self> {
        Self::from_iter(values.iter().map(|value| value.to_string()))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut channel_url: Option<String> = None;
        let mut max_videos: Option<usize> = None;
        let mut include_timestamps = false;
        let mut output_dir: Option<PathBuf> = None;
        let mut delay = Duration::from_secs(1);

        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--max-videos=") {
                max_videos = Some(parse_count(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--output-dir=") {
                output_dir = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--delay-ms=") {
                delay = Duration::from_millis(parse_millis(value)?);
                continue;
            }

            match arg.as_str() {
                "--timestamps" => include_timestamps = true,
                "--max-videos" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--max-videos requires a value"))?;
                    max_videos = Some(parse_count(&value)?);
                }
                "--output-dir" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--output-dir requires a value"))?;
                    output_dir = Some(PathBuf::from(value));
                }
                "--delay-ms" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--delay-ms requires a value"))?;
                    delay = Duration::from_millis(parse_millis(&value)?);
                }
                "--help" | "-h" => {
                    print_usage();
                    exit(0);
                }
                _ if arg.starts_with("--") => bail!("unknown argument: {arg}"),
                _ => {
                    if channel_url.is_some() {
                        bail!("unexpected extra argument: {arg}");
                    }
                    channel_url = Some(arg);
                }
            }
        }

        let channel_url = channel_url
            .ok_or_else(|| anyhow!("a channel URL is required; see --help"))?
            .trim()
            .to_string();
        if channel_url.is_empty() {
            bail!("a channel URL is required; see --help");
        }

        Ok(Self {
            channel_url,
            max_videos,
            include_timestamps,
            output_dir,
            delay,
        })
    }
}

fn parse_count(value: &str) -> Result<usize> {
    let count = value
        .parse::<usize>()
        .context("expected a positive number of videos")?;
    if count == 0 {
        bail!("--max-videos must be at least 1");
    }
    Ok(count)
}

fn parse_millis(value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .context("expected a delay in milliseconds")
}

fn print_usage() {
    println!("Usage: scrape_channel <channel-url> [options]");
    println!();
    println!("Options:");
    println!("  --max-videos <n>    Only process the first n uploads");
    println!("  --timestamps        Prefix each export line with [HH:MM:SS]");
    println!("  --output-dir <dir>  Where transcripts are written (default: transcripts)");
    println!("  --delay-ms <ms>     Pause between fetched videos (default: 1000)");
}

/// Runs `<name> --version` to fail loudly when yt-dlp is missing.
fn ensure_program_available(name: &str) -> Result<()> {
    let status = Command::new(name)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => bail!("{} is installed but returned a failure status", name),
        Err(err) => bail!("{} is not installed or not in PATH: {}", name, err),
    }
}

fn main() -> Result<()> {
    let args = ScrapeArgs::parse()?;

    ensure_not_root("scrape_channel")?;
    ensure_program_available("yt-dlp")?;

    let config = load_config(ConfigOverrides {
        transcripts_dir: args.output_dir.clone(),
        ..ConfigOverrides::default()
    })?;

    let scraper = ChannelScraper::new(
        Box::new(YtDlpLister),
        Box::new(TimedTextClient),
        TranscriptStore::new(&config.transcripts_dir),
    );
    let opts = RunOptions {
        max_videos: args.max_videos,
        include_timestamps: args.include_timestamps,
        delay: args.delay,
    };

    // The pipeline prints per-item progress itself; nothing extra needed here.
    let result = scraper.run(&args.channel_url, &opts, |_, _, _, _| {})?;

    println!();
    println!("{}", result.message);
    if result.success && result.successful < result.processed {
        let failed = result.processed - result.successful;
        println!("{failed} video(s) had no transcript available.");
    }

    Ok(())
}
