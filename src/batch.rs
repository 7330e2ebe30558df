use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::summarize::{SummaryOptions, Summarizer};
use crate::youtube::CaptionSource;
use crate::{ErrorKind, PipelineError, Transcript, VideoReference};

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// A caller's batch: the references plus settings shared by every item
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub urls: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
    /// Skip the summarizer and return the transcript text as the summary
    #[serde(default)]
    pub transcript_only: bool,
    #[serde(flatten)]
    pub summary: SummaryOptions,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl BatchRequest {
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            language: default_language(),
            transcript_only: false,
            summary: SummaryOptions::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("no URLs provided")]
    EmptyBatch,
}

/// Outcome for one input reference
#[derive(Debug)]
pub enum PipelineResult {
    Success {
        url: String,
        transcript: Transcript,
        summary: String,
    },
    Failure {
        url: String,
        video_id: Option<String>,
        error: PipelineError,
    },
}

impl PipelineResult {
    pub fn url(&self) -> &str {
        match self {
            PipelineResult::Success { url, .. } | PipelineResult::Failure { url, .. } => url,
        }
    }

    pub fn video_id(&self) -> Option<&str> {
        match self {
            PipelineResult::Success { transcript, .. } => Some(&transcript.video_id),
            PipelineResult::Failure { video_id, .. } => video_id.as_deref(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            PipelineResult::Success { .. } => None,
            PipelineResult::Failure { error, .. } => Some(error.kind()),
        }
    }
}

/// Wire shape of one batch response entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl From<&PipelineResult> for BatchItem {
    fn from(result: &PipelineResult) -> Self {
        match result {
            PipelineResult::Success {
                url,
                transcript,
                summary,
            } => BatchItem {
                url: url.clone(),
                video_id: Some(transcript.video_id.clone()),
                video_name: Some(transcript.title.clone()).filter(|t| !t.is_empty()),
                summary: Some(summary.clone()),
                subtitles: Some(transcript.text()),
                error: None,
                error_kind: None,
            },
            PipelineResult::Failure { url, video_id, error } => BatchItem {
                url: url.clone(),
                video_id: video_id.clone(),
                video_name: None,
                summary: None,
                subtitles: None,
                error: Some(error.to_string()),
                error_kind: Some(error.kind()),
            },
        }
    }
}

pub fn to_items(results: &[PipelineResult]) -> Vec<BatchItem> {
    results.iter().map(BatchItem::from).collect()
}

/// Runs batches against a caption source and a summarizer with bounded concurrency
#[derive(Clone)]
pub struct Orchestrator {
    captions: Arc<dyn CaptionSource>,
    summarizer: Arc<dyn Summarizer>,
    gate: Arc<Semaphore>,
    max_concurrency: usize,
}

impl Orchestrator {
    pub fn new(captions: Arc<dyn CaptionSource>, summarizer: Arc<dyn Summarizer>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            captions,
            summarizer,
            gate: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Process every reference; result `i` always belongs to `request.urls[i]`
    pub async fn run(&self, request: &BatchRequest) -> Result<Vec<PipelineResult>, BatchError> {
        if request.urls.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        let total = request.urls.len();
        info!(
            "Starting batch of {total} videos (language: {}, max concurrency: {})",
            request.language, self.max_concurrency
        );

        let mut slots: Vec<Option<PipelineResult>> = (0..total).map(|_| None).collect();

        let mut in_flight: FuturesUnordered<_> = request
            .urls
            .iter()
            .enumerate()
            .map(|(index, url)| async move {
                // The gate is never closed, so acquire only fails if that changes.
                let _permit = self.gate.acquire().await.ok();
                (index, self.run_item(url, request).await)
            })
            .collect();

        while let Some((index, result)) = in_flight.next().await {
            debug!("Item {} of {total} finished (success: {})", index + 1, result.is_success());
            slots[index] = Some(result);
        }

        let results: Vec<PipelineResult> = slots
            .into_iter()
            .zip(&request.urls)
            .map(|(slot, url)| {
                slot.unwrap_or_else(|| PipelineResult::Failure {
                    url: url.clone(),
                    video_id: None,
                    error: PipelineError::NetworkFailure("item did not complete".to_string()),
                })
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!("Batch finished: {succeeded} of {total} succeeded");
        Ok(results)
    }

    async fn run_item(&self, url: &str, request: &BatchRequest) -> PipelineResult {
        let reference = match VideoReference::resolve(url) {
            Ok(reference) => reference,
            Err(error) => {
                warn!("Skipping {url:?}: {error}");
                return PipelineResult::Failure {
                    url: url.to_string(),
                    video_id: None,
                    error,
                };
            }
        };

        match self.process(&reference, request).await {
            Ok((transcript, summary)) => PipelineResult::Success {
                url: url.to_string(),
                transcript,
                summary,
            },
            Err(error) => {
                warn!("{}: {error}", reference.video_id);
                PipelineResult::Failure {
                    url: url.to_string(),
                    video_id: Some(reference.video_id),
                    error,
                }
            }
        }
    }

    async fn process(
        &self,
        reference: &VideoReference,
        request: &BatchRequest,
    ) -> Result<(Transcript, String), PipelineError> {
        let transcript = self
            .captions
            .fetch_transcript(&reference.video_id, &request.language)
            .await?;

        let summary = if request.transcript_only || transcript.is_empty() {
            transcript.text()
        } else {
            self.summarizer
                .summarize(&transcript.text(), &transcript.title, &request.summary)
                .await?
        };

        Ok((transcript, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Segment;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Caption source keyed on the video id prefix:
    /// `nocap…` has no captions, `empty…` has zero cues, anything else has one cue.
    #[derive(Default)]
    struct FakeSource {
        delays: HashMap<String, Duration>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        started: AtomicUsize,
        dropped: Arc<AtomicUsize>,
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CaptionSource for FakeSource {
        async fn fetch_transcript(&self, video_id: &str, language: &str) -> Result<Transcript, PipelineError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let _guard = DropCounter(self.dropped.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay = self.delays.get(video_id).copied().unwrap_or(Duration::from_millis(1));
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if video_id.starts_with("nocap") {
                return Err(PipelineError::NoCaptionsAvailable {
                    video_id: video_id.to_string(),
                    detail: None,
                });
            }
            if language != "en" {
                return Err(PipelineError::LanguageNotAvailable {
                    requested: language.to_string(),
                    available: vec!["en".to_string()],
                });
            }

            let segments = if video_id.starts_with("empty") {
                vec![]
            } else {
                vec![Segment {
                    text: format!("caption for {video_id}"),
                    start: 0.0,
                    end: 1.0,
                }]
            };

            Ok(Transcript {
                video_id: video_id.to_string(),
                title: format!("Title {video_id}"),
                language: language.to_string(),
                segments,
            })
        }
    }

    /// Echoes the transcript back; fails when it mentions `sumfail`
    #[derive(Default)]
    struct FakeSummarizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Summarizer for FakeSummarizer {
        async fn summarize(
            &self,
            transcript_text: &str,
            _title: &str,
            _options: &SummaryOptions,
        ) -> Result<String, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if transcript_text.contains("sumfail") {
                return Err(PipelineError::SummarizationFailed("model refused".to_string()));
            }
            Ok(format!("summary: {transcript_text}"))
        }
    }

    fn orchestrator(source: Arc<FakeSource>, summarizer: Arc<FakeSummarizer>, limit: usize) -> Orchestrator {
        Orchestrator::new(source, summarizer, limit)
    }

    fn video_ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("vid{i:08}")).collect()
    }

    /// Deterministic pseudo-random delays (LCG) so completion order differs from input order
    fn scrambled_delays(ids: &[String], seed: u64) -> HashMap<String, Duration> {
        let mut state = seed;
        ids.iter()
            .map(|id| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (id.clone(), Duration::from_millis((state >> 33) % 25))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let orch = orchestrator(Arc::default(), Arc::default(), 2);
        let err = orch.run(&BatchRequest::new(vec![])).await.unwrap_err();
        assert!(matches!(err, BatchError::EmptyBatch));
    }

    #[tokio::test]
    async fn test_results_follow_input_order_for_any_completion_order() {
        let ids = video_ids(24);
        for seed in [1, 7, 42, 1234] {
            let source = Arc::new(FakeSource {
                delays: scrambled_delays(&ids, seed),
                ..Default::default()
            });
            let orch = orchestrator(source, Arc::default(), 5);
            let urls: Vec<String> = ids.iter().map(|id| format!("https://youtu.be/{id}")).collect();

            let results = orch.run(&BatchRequest::new(urls.clone())).await.unwrap();

            assert_eq!(results.len(), urls.len());
            for (i, result) in results.iter().enumerate() {
                assert_eq!(result.url(), urls[i]);
                assert_eq!(result.video_id(), Some(ids[i].as_str()));
                assert!(result.is_success());
            }
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let ids = video_ids(20);
        let delays = ids.iter().map(|id| (id.clone(), Duration::from_millis(15))).collect();
        let source = Arc::new(FakeSource {
            delays,
            ..Default::default()
        });
        let orch = orchestrator(source.clone(), Arc::default(), 3);

        orch.run(&BatchRequest::new(ids)).await.unwrap();

        let peak = source.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight {peak} exceeded the limit");
        assert!(peak > 1, "items never overlapped");
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let urls = vec![
            "https://www.youtube.com/watch?v=vid00000001".to_string(),
            "not-a-url".to_string(),
            "nocap000002".to_string(),
            "https://youtu.be/sumfail0003".to_string(),
            "vid00000004".to_string(),
        ];
        let summarizer = Arc::new(FakeSummarizer::default());
        let orch = orchestrator(Arc::default(), summarizer.clone(), 2);

        let results = orch.run(&BatchRequest::new(urls)).await.unwrap();

        assert_eq!(results.len(), 5);
        assert!(results[0].is_success());
        assert_eq!(results[1].error_kind(), Some(ErrorKind::InvalidReference));
        assert_eq!(results[1].video_id(), None);
        assert_eq!(results[2].error_kind(), Some(ErrorKind::NoCaptionsAvailable));
        assert_eq!(results[2].video_id(), Some("nocap000002"));
        assert_eq!(results[3].error_kind(), Some(ErrorKind::SummarizationFailed));
        assert!(results[4].is_success());
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_every_item_failing_is_still_a_batch() {
        let urls = vec!["nope".to_string(), "nocap000001".to_string()];
        let orch = orchestrator(Arc::default(), Arc::default(), 2);

        let results = orch.run(&BatchRequest::new(urls)).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.is_success()));
    }

    #[tokio::test]
    async fn test_mixed_reference_batch() {
        let urls = vec![
            "https://youtube.com/watch?v=AAAAAAAAAAA".to_string(),
            "not-a-url".to_string(),
        ];
        let orch = orchestrator(Arc::default(), Arc::default(), 4);

        let results = orch.run(&BatchRequest::new(urls)).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].video_id(), Some("AAAAAAAAAAA"));
        assert_eq!(results[1].error_kind(), Some(ErrorKind::InvalidReference));
    }

    #[tokio::test]
    async fn test_empty_transcript_is_success_without_summarizing() {
        let summarizer = Arc::new(FakeSummarizer::default());
        let orch = orchestrator(Arc::default(), summarizer.clone(), 1);

        let results = orch.run(&BatchRequest::new(vec!["empty000001".to_string()])).await.unwrap();

        match &results[0] {
            PipelineResult::Success { transcript, summary, .. } => {
                assert!(transcript.is_empty());
                assert!(summary.is_empty());
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transcript_only_skips_summarizer() {
        let summarizer = Arc::new(FakeSummarizer::default());
        let orch = orchestrator(Arc::default(), summarizer.clone(), 1);
        let mut request = BatchRequest::new(vec!["vid00000001".to_string()]);
        request.transcript_only = true;

        let results = orch.run(&request).await.unwrap();

        match &results[0] {
            PipelineResult::Success { summary, .. } => assert_eq!(summary, "caption for vid00000001"),
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_language_is_passed_through() {
        let orch = orchestrator(Arc::default(), Arc::default(), 1);
        let mut request = BatchRequest::new(vec!["vid00000001".to_string()]);
        request.language = "fr".to_string();

        let results = orch.run(&request).await.unwrap();

        assert_eq!(results[0].error_kind(), Some(ErrorKind::LanguageNotAvailable));
    }

    #[tokio::test]
    async fn test_dropping_the_batch_cancels_in_flight_items() {
        let ids = video_ids(6);
        let delays = ids.iter().map(|id| (id.clone(), Duration::from_secs(60))).collect();
        let source = Arc::new(FakeSource {
            delays,
            ..Default::default()
        });
        let orch = orchestrator(source.clone(), Arc::default(), 3);
        let request = BatchRequest::new(ids);

        let outcome = tokio::time::timeout(Duration::from_millis(50), orch.run(&request)).await;

        assert!(outcome.is_err());
        assert_eq!(source.started.load(Ordering::SeqCst), 3);
        assert_eq!(source.dropped.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_batch_items_serialize_camel_case() {
        let results = vec![
            PipelineResult::Success {
                url: "u1".to_string(),
                transcript: Transcript {
                    video_id: "vid00000001".to_string(),
                    title: "A Talk".to_string(),
                    language: "en".to_string(),
                    segments: vec![Segment {
                        text: "hi".to_string(),
                        start: 0.0,
                        end: 1.0,
                    }],
                },
                summary: "short".to_string(),
            },
            PipelineResult::Failure {
                url: "u2".to_string(),
                video_id: None,
                error: PipelineError::InvalidReference("u2".to_string()),
            },
        ];

        let json = serde_json::to_value(to_items(&results)).unwrap();

        assert_eq!(json[0]["videoName"], "A Talk");
        assert_eq!(json[0]["subtitles"], "hi");
        assert_eq!(json[0]["summary"], "short");
        assert!(json[0].get("error").is_none());
        assert_eq!(json[1]["errorKind"], "InvalidReference");
        assert!(json[1]["error"].as_str().unwrap().contains("u2"));
        assert!(json[1].get("summary").is_none());
    }

    #[test]
    fn test_batch_request_defaults() {
        let request: BatchRequest = serde_json::from_str(r#"{"urls":["a"],"model":"gpt-4o"}"#).unwrap();
        assert_eq!(request.language, "en");
        assert!(!request.transcript_only);
        assert_eq!(request.summary.model(), "gpt-4o");
    }
}
