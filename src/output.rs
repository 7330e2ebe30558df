use eyre::Result;

use crate::Transcript;
use crate::batch::{PipelineResult, to_items};

/// Render transcript as plain text (one segment per line, no timestamps)
pub fn render_text(transcript: &Transcript) -> String {
    transcript
        .segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render transcript as SubRip cues
pub fn render_srt(transcript: &Transcript) -> String {
    transcript
        .segments
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "{}\n{} --> {}\n{}\n",
                i + 1,
                srt_timestamp(s.start),
                srt_timestamp(s.end),
                s.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let (hours, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (secs, ms) = (rest / 1000, rest % 1000);
    format!("{hours:02}:{minutes:02}:{secs:02},{ms:03}")
}

/// Batch results as the JSON array served by the HTTP API
pub fn render_json(results: &[PipelineResult]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_items(results))?)
}

/// Batch results for a terminal: a heading per video, then its summary or error
pub fn render_batch_text(results: &[PipelineResult]) -> String {
    results
        .iter()
        .map(|result| match result {
            PipelineResult::Success {
                transcript, summary, ..
            } => {
                let heading = if transcript.title.is_empty() {
                    transcript.video_id.clone()
                } else {
                    format!("{} ({})", transcript.title, transcript.video_id)
                };
                format!("## {heading}\n\n{}", summary.trim())
            }
            PipelineResult::Failure { url, error, .. } => {
                format!("## {url}\n\nerror [{}]: {error}", error.kind())
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// SRT for each successful video, separated by a comment line naming the video
pub fn render_batch_srt(results: &[PipelineResult]) -> String {
    results
        .iter()
        .filter_map(|result| match result {
            PipelineResult::Success { transcript, .. } => {
                Some(format!("NOTE {}\n\n{}", transcript.video_id, render_srt(transcript)))
            }
            PipelineResult::Failure { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PipelineError, Segment};

    fn sample_transcript() -> Transcript {
        Transcript {
            video_id: "test1234567".to_string(),
            title: "Test Video".to_string(),
            language: "en".to_string(),
            segments: vec![
                Segment {
                    text: "Hello world".to_string(),
                    start: 0.0,
                    end: 1.5,
                },
                Segment {
                    text: "This is a test".to_string(),
                    start: 1.5,
                    end: 3723.25,
                },
            ],
        }
    }

    #[test]
    fn test_render_text() {
        let t = sample_transcript();
        let output = render_text(&t);
        assert_eq!(output, "Hello world\nThis is a test");
    }

    #[test]
    fn test_render_text_empty() {
        let t = Transcript {
            video_id: "empty".to_string(),
            title: "Empty".to_string(),
            language: "en".to_string(),
            segments: vec![],
        };
        assert_eq!(render_text(&t), "");
        assert_eq!(render_srt(&t), "");
    }

    #[test]
    fn test_render_srt() {
        let srt = render_srt(&sample_transcript());
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:01,500\nHello world\n\n2\n00:00:01,500 --> 01:02:03,250\nThis is a test\n"
        );
    }

    #[test]
    fn test_render_batch_text() {
        let results = vec![
            PipelineResult::Success {
                url: "https://youtu.be/test1234567".to_string(),
                transcript: sample_transcript(),
                summary: "- point one\n".to_string(),
            },
            PipelineResult::Failure {
                url: "not-a-url".to_string(),
                video_id: None,
                error: PipelineError::InvalidReference("not-a-url".to_string()),
            },
        ];
        let text = render_batch_text(&results);
        assert!(text.starts_with("## Test Video (test1234567)\n\n- point one"));
        assert!(text.contains("## not-a-url\n\nerror [InvalidReference]"));

        let srt = render_batch_srt(&results);
        assert!(srt.starts_with("NOTE test1234567\n\n1\n"));

        let json = render_json(&results).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }
}
