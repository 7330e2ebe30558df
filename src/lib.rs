pub mod archive;
pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod server;
pub mod summarize;
pub mod timedtext;
pub mod youtube;

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub use error::{ErrorKind, PipelineError};

static BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{11}$").unwrap());

// watch?v=, embed/, shorts/, live/, v/ on youtube.com (any subdomain, nocookie too) and youtu.be/.
// The host must start the input or follow `/` or `.`; the first `v` parameter wins.
static URL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|[/.])(?:youtube(?:-nocookie)?\.com/(?:watch\?(?:[^#&]*&)*?v=|embed/|shorts/|live/|v/)|youtu\.be/)([a-zA-Z0-9_-]{11})(?:[^a-zA-Z0-9_-]|$)",
    )
    .unwrap()
});

/// A single timed caption cue; times are in seconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// Captions of one video, in the order the platform sent them
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub video_id: String,
    pub title: String,
    pub language: String,
    pub segments: Vec<Segment>,
}

impl Transcript {
    /// All cue text joined into one paragraph
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// A user-supplied reference resolved to a canonical video id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoReference {
    pub raw_input: String,
    pub video_id: String,
}

impl VideoReference {
    pub fn resolve(input: &str) -> Result<Self, PipelineError> {
        let video_id = extract_video_id(input).ok_or_else(|| PipelineError::InvalidReference(input.to_string()))?;
        Ok(Self {
            raw_input: input.to_string(),
            video_id,
        })
    }
}

/// Extract video ID from various YouTube URL formats
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();

    if BARE_ID.is_match(input) {
        return Some(input.to_string());
    }

    URL_ID.captures(input).map(|caps| caps[1].to_string())
}
