use serde::Serialize;
use thiserror::Error;

/// Longest slice of an upstream body echoed back in an error message
const MAX_UPSTREAM_SNIPPET: usize = 200;

/// Why a single video's pipeline stopped
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not find a YouTube video id in {0:?}")]
    InvalidReference(String),

    #[error("watch page for {0} did not contain an API key (private, removed, or consent/captcha page)")]
    TokenNotFound(String),

    #[error("no captions available for video {video_id}{}", detail_suffix(.detail))]
    NoCaptionsAvailable { video_id: String, detail: Option<String> },

    #[error("no '{requested}' captions for this video; available: {}", available_list(.available))]
    LanguageNotAvailable { requested: String, available: Vec<String> },

    #[error("caption document could not be parsed: {0}")]
    MalformedCaptionDocument(String),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("summarization failed: {0}")]
    SummarizationFailed(String),
}

/// Serializable tag for a [`PipelineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidReference,
    TokenNotFound,
    NoCaptionsAvailable,
    LanguageNotAvailable,
    MalformedCaptionDocument,
    NetworkFailure,
    SummarizationFailed,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidReference(_) => ErrorKind::InvalidReference,
            PipelineError::TokenNotFound(_) => ErrorKind::TokenNotFound,
            PipelineError::NoCaptionsAvailable { .. } => ErrorKind::NoCaptionsAvailable,
            PipelineError::LanguageNotAvailable { .. } => ErrorKind::LanguageNotAvailable,
            PipelineError::MalformedCaptionDocument(_) => ErrorKind::MalformedCaptionDocument,
            PipelineError::NetworkFailure(_) => ErrorKind::NetworkFailure,
            PipelineError::SummarizationFailed(_) => ErrorKind::SummarizationFailed,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidReference => "InvalidReference",
            ErrorKind::TokenNotFound => "TokenNotFound",
            ErrorKind::NoCaptionsAvailable => "NoCaptionsAvailable",
            ErrorKind::LanguageNotAvailable => "LanguageNotAvailable",
            ErrorKind::MalformedCaptionDocument => "MalformedCaptionDocument",
            ErrorKind::NetworkFailure => "NetworkFailure",
            ErrorKind::SummarizationFailed => "SummarizationFailed",
        };
        write!(f, "{name}")
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        // Request URLs carry the scraped key; keep them out of user-facing text.
        let e = e.without_url();
        if e.is_timeout() {
            PipelineError::NetworkFailure(format!("request timed out: {e}"))
        } else {
            PipelineError::NetworkFailure(e.to_string())
        }
    }
}

/// Trim an upstream body to something fit for an error message
pub fn upstream_snippet(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_UPSTREAM_SNIPPET) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(" ({d})"),
        None => String::new(),
    }
}

fn available_list(available: &[String]) -> String {
    if available.is_empty() {
        "none".to_string()
    } else {
        available.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_not_available_message() {
        let err = PipelineError::LanguageNotAvailable {
            requested: "fr".to_string(),
            available: vec!["en".to_string(), "de".to_string()],
        };
        assert_eq!(err.to_string(), "no 'fr' captions for this video; available: en, de");
        assert_eq!(err.kind(), ErrorKind::LanguageNotAvailable);
    }

    #[test]
    fn test_no_captions_detail() {
        let err = PipelineError::NoCaptionsAvailable {
            video_id: "dQw4w9WgXcQ".to_string(),
            detail: Some("Video unavailable".to_string()),
        };
        assert_eq!(err.to_string(), "no captions available for video dQw4w9WgXcQ (Video unavailable)");

        let err = PipelineError::NoCaptionsAvailable {
            video_id: "dQw4w9WgXcQ".to_string(),
            detail: None,
        };
        assert_eq!(err.to_string(), "no captions available for video dQw4w9WgXcQ");
    }

    #[test]
    fn test_error_kind_serializes_as_name() {
        let json = serde_json::to_string(&ErrorKind::MalformedCaptionDocument).unwrap();
        assert_eq!(json, "\"MalformedCaptionDocument\"");
        assert_eq!(ErrorKind::TokenNotFound.to_string(), "TokenNotFound");
    }

    #[test]
    fn test_upstream_snippet_truncates() {
        let long = "x".repeat(500);
        let snippet = upstream_snippet(&long);
        assert_eq!(snippet.chars().count(), MAX_UPSTREAM_SNIPPET + 1);
        assert!(snippet.ends_with('…'));
        assert_eq!(upstream_snippet("  short  "), "short");
    }
}
