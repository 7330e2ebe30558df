use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use regex::Regex;
use serde::Deserialize;

use crate::timedtext::{normalize_fetch_url, parse_caption_xml};
use crate::error::upstream_snippet;
use crate::{PipelineError, Segment, Transcript};

pub const DEFAULT_BASE_URL: &str = "https://www.youtube.com";
pub const DEFAULT_CLIENT_NAME: &str = "WEB";
pub const DEFAULT_CLIENT_VERSION: &str = "2.20251113.00.00";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

static API_KEY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""INNERTUBE_API_KEY"\s*:\s*"([^"]+)""#).unwrap());
static LEGACY_API_KEY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"innertubeApiKey\s*[=:]\s*"([^"]+)""#).unwrap());
static META_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<meta\s+name="title"\s+content="([^"]*)""#).unwrap());

#[derive(Debug, Deserialize)]
struct InnerTubePlayerResponse {
    captions: Option<CaptionsData>,
    #[serde(rename = "videoDetails")]
    video_details: Option<VideoDetails>,
    #[serde(rename = "playabilityStatus")]
    playability_status: Option<PlayabilityStatus>,
}

#[derive(Debug, Deserialize)]
struct VideoDetails {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaptionsData {
    #[serde(rename = "playerCaptionsTracklistRenderer")]
    player_captions_tracklist_renderer: Option<CaptionTracklistRenderer>,
}

#[derive(Debug, Deserialize)]
struct CaptionTracklistRenderer {
    #[serde(rename = "captionTracks")]
    caption_tracks: Option<Vec<RawCaptionTrack>>,
}

#[derive(Debug, Deserialize)]
struct RawCaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: Option<String>,
    #[serde(rename = "languageCode")]
    language_code: Option<String>,
    kind: Option<String>,
}

/// One caption stream offered for a video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionTrack {
    pub language_code: String,
    pub fetch_url: String,
    pub is_auto_generated: bool,
}

/// What the player endpoint told us about a video
#[derive(Debug, Clone)]
pub struct PlayerInfo {
    pub title: Option<String>,
    pub tracks: Vec<CaptionTrack>,
}

/// Anything that can turn a video id into a transcript in one language
#[async_trait]
pub trait CaptionSource: Send + Sync {
    async fn fetch_transcript(&self, video_id: &str, language: &str) -> Result<Transcript, PipelineError>;
}

/// Upstream endpoint and client identity used by [`YouTubeClient`]
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub client_name: String,
    pub client_version: String,
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_version: DEFAULT_CLIENT_VERSION.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Caption source backed by the public watch page and the InnerTube player API
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    http: reqwest::Client,
    settings: ClientSettings,
}

impl YouTubeClient {
    pub fn new(http: reqwest::Client, settings: ClientSettings) -> Self {
        Self { http, settings }
    }

    fn base_url(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }

    /// Fetch the watch page HTML for a video
    pub async fn fetch_watch_page(&self, video_id: &str) -> Result<String, PipelineError> {
        let watch_url = format!("{}/watch", self.base_url());
        debug!("Fetching watch page for {video_id}");

        let resp = self
            .http
            .get(&watch_url)
            .query(&[("v", video_id)])
            .header("User-Agent", USER_AGENT)
            .timeout(self.settings.request_timeout)
            .send()
            .await?;

        // Captcha and consent pages come back as 429/403; the key marker decides.
        let status = resp.status();
        if !status.is_success() {
            warn!("Watch page for {video_id} returned {status}");
        }

        Ok(resp.text().await?)
    }

    /// Ask the player endpoint which caption tracks exist
    pub async fn fetch_player_info(
        &self,
        video_id: &str,
        api_key: &str,
        lang: &str,
    ) -> Result<PlayerInfo, PipelineError> {
        let player_url = format!("{}/youtubei/v1/player", self.base_url());

        let body = serde_json::json!({
            "context": {
                "client": {
                    "hl": lang,
                    "gl": "US",
                    "clientName": self.settings.client_name,
                    "clientVersion": self.settings.client_version
                }
            },
            "videoId": video_id
        });

        let resp = self
            .http
            .post(&player_url)
            .query(&[("key", api_key), ("prettyPrint", "false")])
            .header("User-Agent", USER_AGENT)
            .header("Referer", format!("{}/", self.base_url()))
            .header("Content-Type", "application/json")
            .timeout(self.settings.request_timeout)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_client_error() {
            let text = resp.text().await.unwrap_or_default();
            warn!("Player endpoint rejected {video_id} with {status}");
            return Err(PipelineError::NoCaptionsAvailable {
                video_id: video_id.to_string(),
                detail: Some(format!("player endpoint returned {status}: {}", upstream_snippet(&text))),
            });
        }

        let text = resp.error_for_status()?.text().await?;
        parse_player_response(video_id, &text)
    }

    /// Download and parse one track's timed-text document
    pub async fn fetch_segments(&self, track: &CaptionTrack) -> Result<Vec<Segment>, PipelineError> {
        let url = normalize_fetch_url(&track.fetch_url);
        debug!("Fetching {} caption document", track.language_code);

        let xml = self
            .http
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .timeout(self.settings.request_timeout)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_caption_xml(&xml)
    }
}

#[async_trait]
impl CaptionSource for YouTubeClient {
    async fn fetch_transcript(&self, video_id: &str, language: &str) -> Result<Transcript, PipelineError> {
        let page_html = self.fetch_watch_page(video_id).await?;

        let api_key = extract_api_key(&page_html).ok_or_else(|| PipelineError::TokenNotFound(video_id.to_string()))?;
        debug!("Extracted InnerTube API key ({} chars)", api_key.len());

        let player = self.fetch_player_info(video_id, &api_key, language).await?;

        let track = select_track(&player.tracks, language)?;
        info!(
            "Using {} caption track for {video_id} (auto-generated: {})",
            track.language_code, track.is_auto_generated
        );

        let segments = self.fetch_segments(track).await?;

        let title = player
            .title
            .or_else(|| extract_meta_title(&page_html))
            .unwrap_or_default();

        Ok(Transcript {
            video_id: video_id.to_string(),
            title,
            language: track.language_code.clone(),
            segments,
        })
    }
}

/// Find the InnerTube API key embedded in a watch page
pub fn extract_api_key(html: &str) -> Option<String> {
    API_KEY_MARKER
        .captures(html)
        .or_else(|| LEGACY_API_KEY_MARKER.captures(html))
        .map(|caps| caps[1].to_string())
}

/// Title from the watch page's `<meta name="title">` tag, HTML entities decoded
pub fn extract_meta_title(html: &str) -> Option<String> {
    META_TITLE
        .captures(html)
        .map(|caps| html_escape::decode_html_entities(&caps[1]).into_owned())
        .filter(|t| !t.trim().is_empty())
}

/// Pull the caption tracks and title out of a player response body
pub fn parse_player_response(video_id: &str, body: &str) -> Result<PlayerInfo, PipelineError> {
    let resp: InnerTubePlayerResponse = serde_json::from_str(body).map_err(|e| {
        warn!("Unreadable player response for {video_id}: {e}");
        PipelineError::NoCaptionsAvailable {
            video_id: video_id.to_string(),
            detail: Some("player response was not in the expected shape".to_string()),
        }
    })?;

    let title = resp
        .video_details
        .and_then(|vd| vd.title)
        .filter(|t| !t.trim().is_empty());

    let tracks: Vec<CaptionTrack> = resp
        .captions
        .and_then(|c| c.player_captions_tracklist_renderer)
        .and_then(|r| r.caption_tracks)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|raw| {
            let fetch_url = raw.base_url?;
            let language_code = raw.language_code?;
            let is_auto_generated = raw.kind.as_deref() == Some("asr") || fetch_url.contains("kind=asr");
            Some(CaptionTrack {
                language_code,
                fetch_url,
                is_auto_generated,
            })
        })
        .collect();

    if tracks.is_empty() {
        let detail = resp
            .playability_status
            .filter(|s| s.status.as_deref() != Some("OK"))
            .and_then(|s| s.reason.or(s.status));
        return Err(PipelineError::NoCaptionsAvailable {
            video_id: video_id.to_string(),
            detail,
        });
    }

    debug!("Player response for {video_id} lists {} caption tracks", tracks.len());
    Ok(PlayerInfo { title, tracks })
}

/// Pick the track for `language`: manual first, then punctuated ASR, then plain ASR
pub fn select_track<'a>(tracks: &'a [CaptionTrack], language: &str) -> Result<&'a CaptionTrack, PipelineError> {
    tracks
        .iter()
        .filter(|t| t.language_code == language)
        .min_by_key(|t| track_rank(t))
        .ok_or_else(|| {
            let mut available: Vec<String> = Vec::new();
            for t in tracks {
                if !available.contains(&t.language_code) {
                    available.push(t.language_code.clone());
                }
            }
            PipelineError::LanguageNotAvailable {
                requested: language.to_string(),
                available,
            }
        })
}

fn track_rank(track: &CaptionTrack) -> u8 {
    if !track.is_auto_generated {
        0
    } else if track.fetch_url.contains("variant=punctuated") {
        1
    } else {
        2
    }
}
