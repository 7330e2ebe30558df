use std::collections::HashSet;
use std::io::{Cursor, Write};

use eyre::Result;
use log::debug;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::batch::PipelineResult;
use crate::output::render_text;

const MAX_NAME_CHARS: usize = 80;

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub summary: String,
    pub transcript: String,
}

/// Successful results as archive entries; failures have nothing to package
pub fn entries_from_results(results: &[PipelineResult]) -> Vec<ArchiveEntry> {
    results
        .iter()
        .filter_map(|result| match result {
            PipelineResult::Success {
                transcript, summary, ..
            } => Some(ArchiveEntry {
                name: if transcript.title.trim().is_empty() {
                    transcript.video_id.clone()
                } else {
                    transcript.title.clone()
                },
                summary: summary.clone(),
                transcript: render_text(transcript),
            }),
            PipelineResult::Failure { .. } => None,
        })
        .collect()
}

/// Build an in-memory zip with `<name>/summary.md` and `<name>/transcript.txt` per entry
pub fn build_archive(entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    let mut used = HashSet::new();

    for entry in entries {
        let dir = unique_name(sanitize_name(&entry.name), &mut used);

        zip.start_file(format!("{dir}/summary.md"), options)?;
        zip.write_all(entry.summary.as_bytes())?;

        zip.start_file(format!("{dir}/transcript.txt"), options)?;
        zip.write_all(entry.transcript.as_bytes())?;
    }

    let bytes = zip.finish()?.into_inner();
    debug!("Built archive with {} entries ({} bytes)", entries.len(), bytes.len());
    Ok(bytes)
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_CHARS)
        .collect();

    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned.to_string()
    }
}

fn unique_name(base: String, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base} ({n})");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PipelineError, Segment, Transcript};
    use std::io::Read;

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_build_archive_layout() {
        let entries = vec![
            ArchiveEntry {
                name: "Rust: the <good> parts".to_string(),
                summary: "- ownership".to_string(),
                transcript: "line one\nline two".to_string(),
            },
            ArchiveEntry {
                name: "Rust: the <good> parts".to_string(),
                summary: "again".to_string(),
                transcript: String::new(),
            },
        ];

        let bytes = build_archive(&entries).unwrap();

        assert_eq!(read_entry(&bytes, "Rust_ the _good_ parts/summary.md"), "- ownership");
        assert_eq!(read_entry(&bytes, "Rust_ the _good_ parts/transcript.txt"), "line one\nline two");
        assert_eq!(read_entry(&bytes, "Rust_ the _good_ parts (2)/summary.md"), "again");
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_name("   "), "video");
        assert_eq!(sanitize_name(&"x".repeat(200)).len(), MAX_NAME_CHARS);
    }

    #[test]
    fn test_entries_skip_failures() {
        let results = vec![
            PipelineResult::Success {
                url: "a".to_string(),
                transcript: Transcript {
                    video_id: "aaaaaaaaaaa".to_string(),
                    title: String::new(),
                    language: "en".to_string(),
                    segments: vec![Segment {
                        text: "hello".to_string(),
                        start: 0.0,
                        end: 1.0,
                    }],
                },
                summary: "sum".to_string(),
            },
            PipelineResult::Failure {
                url: "b".to_string(),
                video_id: None,
                error: PipelineError::InvalidReference("b".to_string()),
            },
        ];

        let entries = entries_from_results(&results);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "aaaaaaaaaaa");
        assert_eq!(entries[0].transcript, "hello");
    }
}
