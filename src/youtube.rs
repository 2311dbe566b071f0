use std::sync::LazyLock;

use async_trait::async_trait;
use eyre::{Result, bail};
use log::debug;
use regex::Regex;
use serde::Deserialize;

use crate::captions::{CaptionResult, CaptionStrategy};
use crate::metadata::{MetadataSource, VideoMetadata};
use crate::watch_url;

pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize)]
struct InnerTubePlayerResponse {
    captions: Option<CaptionsData>,
}

#[derive(Debug, Deserialize)]
struct CaptionsData {
    #[serde(rename = "playerCaptionsTracklistRenderer")]
    player_captions_tracklist_renderer: Option<CaptionTracklistRenderer>,
}

#[derive(Debug, Deserialize)]
struct CaptionTracklistRenderer {
    #[serde(rename = "captionTracks")]
    caption_tracks: Option<Vec<CaptionTrack>>,
}

#[derive(Debug, Deserialize)]
struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode")]
    language_code: String,
}

/// Captions straight from YouTube's InnerTube player API
pub struct InnerTubeCaptions {
    client: reqwest::Client,
}

impl InnerTubeCaptions {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn try_fetch(&self, video_id: &str, languages: &[String]) -> Result<CaptionResult> {
        // Step 1: Fetch the watch page to get the InnerTube API key
        let watch_url = watch_url(video_id);
        debug!("Fetching watch page: {watch_url}");

        let page_html = self
            .client
            .get(&watch_url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let api_key = extract_api_key(&page_html)?;

        // Step 2: Call InnerTube player endpoint
        let player_url = format!("https://www.youtube.com/youtubei/v1/player?key={api_key}&prettyPrint=false");
        let hl = languages.first().map(String::as_str).unwrap_or("en");

        let body = serde_json::json!({
            "context": {
                "client": {
                    "hl": hl,
                    "clientName": "WEB",
                    "clientVersion": "2.20241126.01.00"
                }
            },
            "videoId": video_id
        });

        let resp: InnerTubePlayerResponse = self
            .client
            .post(&player_url)
            .header("User-Agent", USER_AGENT)
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?
            .error_for_status()
            .map_err(reqwest::Error::without_url)?
            .json()
            .await?;

        let Some(renderer) = resp.captions.and_then(|c| c.player_captions_tracklist_renderer) else {
            return Ok(CaptionResult::Disabled);
        };
        let tracks = renderer.caption_tracks.unwrap_or_default();

        let Some(track) = select_track(&tracks, languages) else {
            debug!(
                "No caption track in {languages:?}; available: {:?}",
                tracks.iter().map(|t| t.language_code.as_str()).collect::<Vec<_>>()
            );
            return Ok(CaptionResult::NotFound);
        };
        debug!("Using caption track: lang={}", track.language_code);

        // Step 3: Fetch the caption XML
        let caption_xml = self
            .client
            .get(&track.base_url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(CaptionResult::Text(parse_timedtext(&caption_xml)?.join(" ")))
    }
}

#[async_trait]
impl CaptionStrategy for InnerTubeCaptions {
    fn name(&self) -> &'static str {
        "innertube"
    }

    async fn fetch(&self, video_id: &str, languages: &[String]) -> CaptionResult {
        self.try_fetch(video_id, languages)
            .await
            .unwrap_or_else(|e| CaptionResult::Failed(format!("{e:#}")))
    }
}

/// First track matching the preference list, in preference order
fn select_track<'a>(tracks: &'a [CaptionTrack], languages: &[String]) -> Option<&'a CaptionTrack> {
    languages
        .iter()
        .find_map(|lang| tracks.iter().find(|t| &t.language_code == lang))
}

fn extract_api_key(html: &str) -> Result<String> {
    let re = Regex::new(r#""INNERTUBE_API_KEY"\s*:\s*"([^"]+)""#)?;
    if let Some(caps) = re.captures(html) {
        return Ok(caps[1].to_string());
    }

    // Fallback: try the newer pattern
    let re2 = Regex::new(r#"innertubeApiKey\s*[=:]\s*"([^"]+)""#)?;
    if let Some(caps) = re2.captures(html) {
        return Ok(caps[1].to_string());
    }

    bail!("could not extract InnerTube API key from watch page");
}

/// Parse YouTube timed-text XML into its `<text>` fragments, HTML-unescaped
pub fn parse_timedtext(xml: &str) -> Result<Vec<String>> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let mut reader = Reader::from_str(xml);
    let mut fragments = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"text" => in_text = true,
            Ok(Event::End(ref e)) if e.name().as_ref() == b"text" => in_text = false,
            Ok(Event::Text(ref e)) if in_text => {
                let raw_text = e.unescape().unwrap_or_default().to_string();
                let text = html_escape::decode_html_entities(&raw_text).replace('\n', " ");
                let text = text.trim();
                if !text.is_empty() {
                    fragments.push(text.to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!("error parsing caption XML: {e}"),
            _ => {}
        }
    }

    Ok(fragments)
}

pub fn looks_like_timedtext(content: &str) -> bool {
    let head: String = content.trim_start().chars().take(256).collect();
    head.starts_with("<?xml") || head.contains("<transcript") || head.contains("<timedtext")
}

static OG_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<meta\s+(?:property|name)="og:title"\s+content="([^"]*)""#).expect("valid regex"));
static HTML_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));

/// Title scraped from the watch page, for when `yt-dlp` is unavailable
pub struct PageScraper {
    client: reqwest::Client,
}

impl PageScraper {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MetadataSource for PageScraper {
    async fn fetch(&self, video_id: &str) -> Result<VideoMetadata> {
        let html = self
            .client
            .get(watch_url(video_id))
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        match scrape_title(&html) {
            Some(title) => Ok(VideoMetadata {
                title: Some(title),
                ..VideoMetadata::default()
            }),
            None => bail!("no title found on watch page for {video_id}"),
        }
    }
}

fn scrape_title(html: &str) -> Option<String> {
    let raw = OG_TITLE
        .captures(html)
        .or_else(|| HTML_TITLE.captures(html))
        .map(|caps| caps[1].to_string())?;
    let title = html_escape::decode_html_entities(&raw);
    let title = title.trim().trim_end_matches("- YouTube").trim();
    (!title.is_empty()).then(|| title.to_string())
}
