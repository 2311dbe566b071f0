use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use eyre::{Result, WrapErr, bail};
use log::debug;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::captions::{CaptionResult, CaptionStrategy};
use crate::metadata::{MetadataSource, VideoMetadata};
use crate::watch_url;
use crate::youtube::{USER_AGENT, looks_like_timedtext, parse_timedtext};

// Subtitle formats in order of preference; srv1 and srv2 are `<text>` timed-text XML.
const FORMAT_PREFERENCE: &[&str] = &["srv1", "srv2", "vtt"];

// Formats whose content `decode_subtitle` cannot turn into text
const UNREADABLE_FORMATS: &[&str] = &["srv3", "ttml", "json3"];

// How long one `--dump-json` result is reused across lookups for the same video
const INFO_TTL: Duration = Duration::from_secs(120);
const INFO_CACHE_SIZE: usize = 32;

type InfoCell = Arc<OnceCell<Result<Arc<VideoInfo>, String>>>;

struct CachedInfo {
    video_id: String,
    created: Instant,
    cell: InfoCell,
}

#[derive(Debug, Default, Deserialize)]
struct VideoInfo {
    title: Option<String>,
    description: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    subtitles: BTreeMap<String, Vec<SubtitleFormat>>,
    #[serde(default)]
    automatic_captions: BTreeMap<String, Vec<SubtitleFormat>>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubtitleFormat {
    ext: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectedTrack {
    language: String,
    automatic: bool,
    url: String,
}

/// Metadata and subtitle lookups through the `yt-dlp` binary.
///
/// Both lookups read the same `--dump-json` output, so one run per video is
/// shared between them (failures included) for a short while.
pub struct YtDlp {
    path: String,
    timeout: Duration,
    client: reqwest::Client,
    cache: Mutex<Vec<CachedInfo>>,
}

impl YtDlp {
    pub fn new(path: impl Into<String>, timeout: Duration, client: reqwest::Client) -> Self {
        Self {
            path: path.into(),
            timeout,
            client,
            cache: Mutex::new(Vec::new()),
        }
    }

    fn info_cell(&self, video_id: &str) -> InfoCell {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.retain(|entry| entry.created.elapsed() < INFO_TTL);
        if let Some(entry) = cache.iter().find(|entry| entry.video_id == video_id) {
            return Arc::clone(&entry.cell);
        }
        if cache.len() >= INFO_CACHE_SIZE {
            cache.remove(0);
        }
        let cell = InfoCell::default();
        cache.push(CachedInfo {
            video_id: video_id.to_string(),
            created: Instant::now(),
            cell: Arc::clone(&cell),
        });
        cell
    }

    async fn video_info(&self, video_id: &str) -> Result<Arc<VideoInfo>> {
        let cell = self.info_cell(video_id);
        let info = cell
            .get_or_init(|| async {
                self.dump_json(video_id)
                    .await
                    .map(Arc::new)
                    .map_err(|e| format!("{e:#}"))
            })
            .await;
        info.clone().map_err(|e| eyre::eyre!(e))
    }

    async fn dump_json(&self, video_id: &str) -> Result<VideoInfo> {
        let url = watch_url(video_id);
        debug!("Running {} --dump-json for {url}", self.path);

        let mut cmd = tokio::process::Command::new(&self.path);
        cmd.args([
            "--dump-json",
            "--skip-download",
            "--no-playlist",
            "--no-warnings",
            "--write-subs",
            "--write-auto-subs",
            url.as_str(),
        ])
        .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| eyre::eyre!("{} timed out after {:?}", self.path, self.timeout))?
            .wrap_err_with(|| format!("failed to run {}", self.path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} failed ({}): {}", self.path, output.status, stderr.trim());
        }

        parse_info(&output.stdout)
    }

    async fn try_subtitles(&self, video_id: &str, languages: &[String]) -> Result<CaptionResult> {
        let info = self.video_info(video_id).await?;
        let Some(track) = select_subtitle(&info, languages) else {
            return Ok(CaptionResult::NotFound);
        };
        debug!(
            "Using {} subtitle track: lang={}",
            if track.automatic { "automatic" } else { "manual" },
            track.language
        );

        let content = self
            .client
            .get(&track.url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(CaptionResult::Text(decode_subtitle(&content)?))
    }
}

#[async_trait]
impl MetadataSource for YtDlp {
    async fn fetch(&self, video_id: &str) -> Result<VideoMetadata> {
        let info = self.video_info(video_id).await?;
        let present = |s: &Option<String>| s.clone().filter(|s| !s.trim().is_empty());
        Ok(VideoMetadata {
            title: present(&info.title),
            description: present(&info.description),
            duration_secs: info.duration.map(|d| d.max(0.0).round() as u64),
        })
    }
}

#[async_trait]
impl CaptionStrategy for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch(&self, video_id: &str, languages: &[String]) -> CaptionResult {
        self.try_subtitles(video_id, languages)
            .await
            .unwrap_or_else(|e| CaptionResult::Failed(format!("{e:#}")))
    }
}

fn parse_info(stdout: &[u8]) -> Result<VideoInfo> {
    serde_json::from_slice(stdout).wrap_err("unexpected yt-dlp JSON output")
}

/// Pick a subtitle track: manual in preferred languages, then automatic in
/// preferred languages, then any manual, then any automatic
fn select_subtitle(info: &VideoInfo, languages: &[String]) -> Option<SelectedTrack> {
    let pick = |tracks: &BTreeMap<String, Vec<SubtitleFormat>>, lang: &str, automatic: bool| {
        tracks.get(lang).and_then(|formats| {
            choose_format(formats).map(|url| SelectedTrack {
                language: lang.to_string(),
                automatic,
                url,
            })
        })
    };
    let any = |tracks: &BTreeMap<String, Vec<SubtitleFormat>>, automatic: bool| {
        tracks
            .keys()
            .filter(|lang| lang.as_str() != "live_chat")
            .find_map(|lang| pick(tracks, lang.as_str(), automatic))
    };

    languages
        .iter()
        .find_map(|lang| pick(&info.subtitles, lang.as_str(), false))
        .or_else(|| languages.iter().find_map(|lang| pick(&info.automatic_captions, lang.as_str(), true)))
        .or_else(|| any(&info.subtitles, false))
        .or_else(|| any(&info.automatic_captions, true))
}

fn choose_format(formats: &[SubtitleFormat]) -> Option<String> {
    let with_url = |f: &SubtitleFormat| f.url.clone().filter(|u| !u.is_empty());
    FORMAT_PREFERENCE
        .iter()
        .find_map(|ext| {
            formats
                .iter()
                .filter(|f| f.ext.as_deref() == Some(*ext))
                .find_map(with_url)
        })
        .or_else(|| {
            formats
                .iter()
                .rev()
                .filter(|f| !f.ext.as_deref().is_some_and(|ext| UNREADABLE_FORMATS.contains(&ext)))
                .find_map(with_url)
        })
}

/// Turn fetched subtitle content into plain text
fn decode_subtitle(content: &str) -> Result<String> {
    if looks_like_timedtext(content) {
        return Ok(parse_timedtext(content)?.join(" "));
    }
    if content.trim_start().starts_with("WEBVTT") {
        return Ok(parse_vtt(content));
    }
    Ok(content.to_string())
}

/// Strip WebVTT headers, cue timings and inline tags, collapsing the repeated
/// lines auto-generated tracks roll over between cues
fn parse_vtt(content: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut in_note = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            in_note = false;
            continue;
        }
        if in_note || line.starts_with("WEBVTT") || line.contains("-->") {
            continue;
        }
        if line.starts_with("NOTE") || line.starts_with("STYLE") || line.starts_with("REGION") {
            in_note = true;
            continue;
        }
        if line.starts_with("Kind:") || line.starts_with("Language:") || line.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let text = html_escape::decode_html_entities(&strip_tags(line)).trim().to_string();
        if !text.is_empty() && lines.last() != Some(&text) {
            lines.push(text);
        }
    }

    lines.join(" ")
}

fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_tag = false;
    for c in line.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
