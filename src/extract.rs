//! Pulls the `{outfit, schedule}` object out of free-form model output.

use serde::Deserialize;

use crate::store::ScheduleRecord;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScheduleDraft {
    pub outfit: String,
    pub schedule: String,
}

impl From<ScheduleDraft> for ScheduleRecord {
    fn from(d: ScheduleDraft) -> Self {
        ScheduleRecord::new(d.outfit, d.schedule)
    }
}

/// Structured record if the text contains one, else the degraded record
/// holding the raw text.
pub fn to_record(raw: &str) -> ScheduleRecord {
    match extract_schedule(raw) {
        Some(draft) => draft.into(),
        None => {
            tracing::warn!("LLM response not in JSON format, keeping raw text: {raw}");
            ScheduleRecord::degraded(raw)
        }
    }
}

/// Candidate `{` positions tried before giving up. Each try scans to the
/// end of the text, so this bounds the work at `MAX_CANDIDATES * len`.
const MAX_CANDIDATES: usize = 32;

/// First balanced `{...}` span that parses as a [`ScheduleDraft`], among the
/// first [`MAX_CANDIDATES`] opening braces.
pub fn extract_schedule(raw: &str) -> Option<ScheduleDraft> {
    let text = strip_fences(raw);
    let mut from = 0;
    for _ in 0..MAX_CANDIDATES {
        let offset = text[from..].find('{')?;
        let start = from + offset;
        if let Some(end) = balanced_end(&text, start)
            && let Ok(draft) = serde_json::from_str::<ScheduleDraft>(&text[start..=end])
        {
            return Some(draft);
        }
        from = start + 1;
    }
    None
}

/// Remove markdown fence markers (```` ``` ```` / ```` ```json ````) at line
/// starts and ends.
fn strip_fences(text: &str) -> String {
    text.trim()
        .lines()
        .map(|line| {
            let mut line = line;
            if let Some(rest) = line.trim_start().strip_prefix("```") {
                line = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
            }
            if let Some(rest) = line.trim_end().strip_suffix("```") {
                line = rest;
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone, Copy)]
enum Scan {
    Code,
    Str,
    Escape,
}

/// Byte index of the `}` closing the `{` at `start`. Braces inside JSON
/// strings are ignored.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut state = Scan::Code;
    for (i, b) in text.bytes().enumerate().skip(start) {
        state = match (state, b) {
            (Scan::Escape, _) => Scan::Str,
            (Scan::Str, b'\\') => Scan::Escape,
            (Scan::Str, b'"') => Scan::Code,
            (Scan::Str, _) => Scan::Str,
            (Scan::Code, b'"') => Scan::Str,
            (Scan::Code, b'{') => {
                depth += 1;
                Scan::Code
            }
            (Scan::Code, b'}') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
                Scan::Code
            }
            (Scan::Code, _) => Scan::Code,
        };
    }
    None
}
