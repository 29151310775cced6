//! Splits a track's code stream into overlapping ~60 second segments.

use crate::error::{Error, Result};
use crate::track::{Metadata, SegmentId, SegmentRecord};

/// One time unit is 1/43.45th of a second; segments span 60 seconds and
/// overlap by half their length (30 seconds).
pub const SEGMENT_LENGTH: f64 = 60.0 * 1000.0 / 43.45;
pub const HALF_SEGMENT: f64 = SEGMENT_LENGTH / 2.0;

/// A parsed (hash, time) pair together with its original textual tokens, so
/// segments can be re-serialized without reformatting numbers.
#[derive(Debug, Clone, Copy)]
struct Pair {
    hash: u32,
    time: u32,
}

fn parse_pairs(code_string: &str) -> Result<Vec<Pair>> {
    let tokens: Vec<&str> = code_string.split_whitespace().collect();
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    if tokens.len() < 2 {
        return Err(Error::ShortCodeString);
    }

    tokens
        .chunks(2)
        .map(|pair| {
            let hash: u32 = pair[0]
                .parse()
                .map_err(|_| Error::Corrupt {
                    path: "<code-string>".into(),
                    reason: format!("non-numeric hash token {:?}", pair[0]),
                })?;
            let time: u32 = pair
                .get(1)
                .ok_or(Error::ShortCodeString)?
                .parse()
                .map_err(|_| Error::Corrupt {
                    path: "<code-string>".into(),
                    reason: format!("non-numeric time token {:?}", pair.get(1)),
                })?;
            Ok(Pair { hash, time })
        })
        .collect()
}

fn render(pairs: &[Pair]) -> String {
    let mut out = String::new();
    for (i, p) in pairs.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&p.hash.to_string());
        out.push(' ');
        out.push_str(&p.time.to_string());
    }
    out
}

/// Splits `code_string` (the track's full, unsplit code stream) into
/// overlapping segments, each carrying a copy of `metadata`.
///
/// An empty code string yields zero segments. Fewer than two whitespace
/// tokens is an error (an odd or single token cannot be a (hash, time) pair).
pub fn split(track_id: &str, code_string: &str, metadata: &Metadata) -> Result<Vec<SegmentRecord>> {
    let mut pairs = parse_pairs(code_string)?;
    if pairs.is_empty() {
        return Ok(Vec::new());
    }

    pairs.sort_by_key(|p| p.time);

    let last_time = pairs.last().expect("non-empty").time as f64;
    let num_segments = (last_time / HALF_SEGMENT) as u32 + 1;

    let mut segments = Vec::with_capacity(num_segments as usize);
    let mut start_idx = 0usize;

    for i in 0..num_segments {
        let window_start = i as f64 * HALF_SEGMENT;
        let window_end = window_start + SEGMENT_LENGTH;

        while start_idx < pairs.len() && (pairs[start_idx].time as f64) < window_start {
            start_idx += 1;
        }
        let mut end_idx = start_idx;
        while end_idx < pairs.len() && (pairs[end_idx].time as f64) < window_end {
            end_idx += 1;
        }

        segments.push(SegmentRecord {
            id: SegmentId::new(track_id, i),
            fp: render(&pairs[start_idx..end_idx]),
            metadata: metadata.clone(),
        });
    }

    Ok(segments)
}
