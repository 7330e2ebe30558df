use std::sync::LazyLock;

use log::debug;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;

use crate::{PipelineError, Segment};

static FMT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&fmt=\w+$").unwrap());

const XML_ENTITIES: [(&str, char); 5] = [
    ("&amp;", '&'),
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&quot;", '"'),
    ("&apos;", '\''),
];

const ROOT_ELEMENT: &[u8] = b"transcript";
const CUE_ELEMENT: &[u8] = b"text";

/// Turn a track's `baseUrl` into the URL that returns the raw timed-text XML
pub fn normalize_fetch_url(base_url: &str) -> String {
    let url = base_url.replace("\\u0026", "&");
    FMT_SUFFIX.replace(&url, "").into_owned()
}

/// Decode `&amp; &lt; &gt; &quot; &apos;` in a single pass; numeric references are left as written
pub fn decode_xml_entities(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match XML_ENTITIES.iter().find(|(name, _)| tail.starts_with(name)) {
            Some((name, ch)) => {
                out.push(*ch);
                rest = &tail[name.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

struct Cue {
    start: f64,
    end: f64,
    text: String,
}

/// Parse a timed-text document into segments, preserving document order
pub fn parse_caption_xml(xml: &str) -> Result<Vec<Segment>, PipelineError> {
    let mut reader = Reader::from_str(xml);
    let mut segments = Vec::new();
    let mut seen_root = false;
    let mut cue: Option<Cue> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if !seen_root {
                    check_root(e)?;
                    seen_root = true;
                } else if e.name().as_ref() == CUE_ELEMENT {
                    let (start, end) = cue_times(e)?;
                    cue = Some(Cue {
                        start,
                        end,
                        text: String::new(),
                    });
                }
            }
            Ok(Event::Empty(ref e)) => {
                if !seen_root {
                    check_root(e)?;
                    seen_root = true;
                } else if e.name().as_ref() == CUE_ELEMENT {
                    // <text .../> carries timing but nothing to say
                    cue_times(e)?;
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(cue) = cue.as_mut() {
                    cue.text.push_str(&decode_xml_entities(&String::from_utf8_lossy(e)));
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(cue) = cue.as_mut() {
                    cue.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == CUE_ELEMENT => {
                if let Some(cue) = cue.take() {
                    let text = cue.text.trim();
                    if !text.is_empty() {
                        segments.push(Segment {
                            text: text.to_string(),
                            start: cue.start,
                            end: cue.end,
                        });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(PipelineError::MalformedCaptionDocument(format!(
                    "{e} (at byte {})",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    if !seen_root {
        return Err(PipelineError::MalformedCaptionDocument(
            "document has no root element".to_string(),
        ));
    }

    debug!("Parsed {} caption segments", segments.len());
    Ok(segments)
}

fn check_root(e: &BytesStart) -> Result<(), PipelineError> {
    if e.name().as_ref() == ROOT_ELEMENT {
        Ok(())
    } else {
        Err(PipelineError::MalformedCaptionDocument(format!(
            "unexpected root element <{}>",
            String::from_utf8_lossy(e.name().as_ref())
        )))
    }
}

fn cue_times(e: &BytesStart) -> Result<(f64, f64), PipelineError> {
    let mut start = None;
    let mut dur = None;

    for attr in e.attributes() {
        let attr = attr.map_err(|err| PipelineError::MalformedCaptionDocument(err.to_string()))?;
        let value = String::from_utf8_lossy(&attr.value);
        match attr.key.as_ref() {
            b"start" => start = Some(parse_seconds("start", &value)?),
            b"dur" => dur = Some(parse_seconds("dur", &value)?),
            _ => {}
        }
    }

    let start = start.ok_or_else(|| {
        PipelineError::MalformedCaptionDocument("<text> element without a start attribute".to_string())
    })?;
    Ok((start, start + dur.unwrap_or(0.0)))
}

fn parse_seconds(name: &str, value: &str) -> Result<f64, PipelineError> {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(PipelineError::MalformedCaptionDocument(format!(
            "invalid {name} value {value:?}"
        ))),
    }
}
