//! Decision engine: turns a query code string into a classified match
//! outcome by combining the inverted index's fast bag-query score with the
//! histogram rescorer's time-aligned score.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::Result;
use crate::histogram::actual_matches;
use crate::index::InvertedIndexStore;
use crate::store::CodeStreamStore;
use crate::track::{Metadata, SegmentId, TrackId};

/// One time unit is 1/43.45th of a second; a query is truncated to at most
/// 60 seconds before hitting the index.
const QUERY_TRUNCATE_SECONDS: f64 = 60.0 * 43.45;

/// The outcome of [`best_match`]. Every variant the original service could
/// produce is retained even though the current decision rules (§4.6) only
/// ever construct a subset of them, so exhaustive matches on this enum
/// elsewhere stay forward-compatible with older protocol consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    CannotDecode,
    NotEnoughCode,
    NoResults,
    SingleBadMatch,
    SingleGoodMatch,
    MultipleBadHistogramMatch,
    MultipleGoodMatchHistogramDecreased,
    /// Retained for protocol compatibility; current rules never construct it.
    MultipleGoodMatch,
    /// Retained for protocol compatibility; current rules never construct it.
    MultipleGoodMatchHistogramIncreased,
}

impl Classification {
    #[must_use]
    pub fn is_match(self) -> bool {
        matches!(
            self,
            Self::SingleGoodMatch
                | Self::MultipleGoodMatch
                | Self::MultipleGoodMatchHistogramIncreased
                | Self::MultipleGoodMatchHistogramDecreased
        )
    }
}

/// Result of a [`best_match`] call; `serde`-serializable so the CLI's
/// `--json` mode and a future thin HTTP layer can emit it without
/// translation (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub classification: Classification,
    pub track_id: Option<TrackId>,
    pub score: Option<u64>,
    pub metadata: Option<Metadata>,
    pub qtime_ms: u64,
    pub total_time_ms: u64,
}

impl Response {
    fn outcome(classification: Classification, started: Instant, qtime_ms: u64) -> Self {
        Self {
            classification,
            track_id: None,
            score: None,
            metadata: None,
            qtime_ms,
            total_time_ms: elapsed_ms(started),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Parses a canonical "`hash time hash time ...`" string into `(hash, time)`
/// pairs, silently dropping any trailing unpaired token (mirrors the
/// original service's permissive tokenizer).
fn parse_canonical(codes: &str) -> Vec<(u32, u32)> {
    let tokens: Vec<&str> = codes.split_whitespace().collect();
    tokens
        .chunks(2)
        .filter_map(|pair| {
            let hash = pair.first()?.parse().ok()?;
            let time = pair.get(1)?.parse().ok()?;
            Some((hash, time))
        })
        .collect()
}

fn render_canonical(pairs: &[(u32, u32)]) -> String {
    pairs
        .iter()
        .map(|(hash, time)| format!("{hash} {time}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs the full decision pipeline (§4.6) against `query`, which may be a
/// compressed/encoded blob or already-canonical text.
pub fn best_match(
    index: &dyn InvertedIndexStore,
    store: &dyn CodeStreamStore,
    query: &str,
    elbow: usize,
    slop: i64,
    query_rows: usize,
    backend_timeout: Duration,
) -> Result<Response> {
    let started = Instant::now();

    // Step 1
    let decoded = if codec::looks_compressed(query) {
        match codec::decode(query) {
            Some(text) => text,
            None => return Ok(Response::outcome(Classification::CannotDecode, started, 0)),
        }
    } else {
        query.to_string()
    };

    let pairs = parse_canonical(&decoded);

    // Step 2
    let code_len = pairs.len();
    if code_len < elbow {
        return Ok(Response::outcome(Classification::NotEnoughCode, started, 0));
    }

    // Step 3
    let first_time = pairs[0].1 as f64;
    let truncated: Vec<(u32, u32)> = pairs
        .into_iter()
        .filter(|(_, time)| (*time as f64) <= first_time + QUERY_TRUNCATE_SECONDS)
        .collect();
    let truncated_text = render_canonical(&truncated);
    let query_hashes: Vec<u32> = truncated.iter().map(|(h, _)| *h).collect();

    // Step 4
    let query_started = Instant::now();
    let candidates = match crate::pool::with_timeout(backend_timeout, || index.bag_query(&query_hashes, query_rows)) {
        Some(result) => result?,
        None => {
            log::warn!("inverted-index bag_query timed out after {backend_timeout:?}");
            Vec::new()
        }
    };
    let qtime_ms = elapsed_ms(query_started);

    // Step 5
    if candidates.is_empty() {
        return Ok(Response::outcome(Classification::NoResults, started, qtime_ms));
    }

    if candidates.len() == 1 {
        let candidate = &candidates[0];
        let mut response = if (code_len as i64 - candidate.score as i64) < elbow as i64 {
            Response::outcome(Classification::SingleGoodMatch, started, qtime_ms)
        } else {
            Response::outcome(Classification::SingleBadMatch, started, qtime_ms)
        };
        if response.classification == Classification::SingleGoodMatch {
            response.track_id = Some(candidate.segment_id.track_id().to_string());
            response.score = Some(candidate.score);
            response.metadata = index.metadata(&candidate.segment_id)?;
        }
        return Ok(response);
    }

    let top_fast_score = candidates[0].score;
    if (top_fast_score as f64) < 0.05 * code_len as f64 {
        return Ok(Response::outcome(
            Classification::MultipleBadHistogramMatch,
            started,
            qtime_ms,
        ));
    }

    // Step 6: each candidate is fetched under its own timeout, so one slow
    // backend call only drops that candidate rather than the whole query.
    let mut code_streams = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let id = candidate.segment_id.clone();
        match crate::pool::with_timeout(backend_timeout, || store.get(&id)) {
            Some(Ok(Some(code))) => code_streams.push((candidate.segment_id.clone(), code)),
            Some(Ok(None)) => {}
            Some(Err(e)) => return Err(e),
            None => log::warn!("code-stream get for {} timed out after {backend_timeout:?}", candidate.segment_id),
        }
    }
    let fast_scores: std::collections::HashMap<&SegmentId, u64> =
        candidates.iter().map(|c| (&c.segment_id, c.score)).collect();

    let mut actual: Vec<(SegmentId, u64)> = code_streams
        .into_iter()
        .map(|(id, code)| {
            let score = actual_matches(&truncated_text, &code, slop, elbow);
            (id, score)
        })
        .collect();
    actual.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    // Step 7: first entry per distinct track prefix.
    let mut seen_tracks = std::collections::HashSet::new();
    let survivors: Vec<(SegmentId, u64)> = actual
        .into_iter()
        .filter(|(id, _)| seen_tracks.insert(id.track_id().to_string()))
        .collect();

    // Step 8
    let decision = if survivors.len() == 1 {
        let (id, a) = &survivors[0];
        if (*a as f64) < 0.1 * code_len as f64 {
            (Classification::SingleBadMatch, None)
        } else {
            let original = *fast_scores.get(id).unwrap_or(&0);
            if (*a as f64) > (original as f64 / 2.0) {
                (Classification::MultipleGoodMatchHistogramDecreased, Some((id.clone(), *a)))
            } else {
                (Classification::MultipleBadHistogramMatch, None)
            }
        }
    } else {
        let (top_id, a1) = &survivors[0];
        let a2 = survivors[1].1;
        if (*a1 as f64) < 0.05 * code_len as f64 {
            (Classification::MultipleBadHistogramMatch, None)
        } else {
            let original = *fast_scores.get(top_id).unwrap_or(&0);
            let decreased_by_at_least_a_third = (*a1 - a2) >= *a1 / 3;
            if (*a1 as f64) > (original as f64 / 4.0) && decreased_by_at_least_a_third {
                (
                    Classification::MultipleGoodMatchHistogramDecreased,
                    Some((top_id.clone(), *a1)),
                )
            } else {
                (Classification::MultipleBadHistogramMatch, None)
            }
        }
    };

    let mut response = Response::outcome(decision.0, started, qtime_ms);
    if let Some((winner_id, score)) = decision.1 {
        response.track_id = Some(winner_id.track_id().to_string());
        response.score = Some(score);
        response.metadata = index.metadata(&winner_id)?;
    }
    log::debug!(
        "classified query ({code_len} code(s), {} candidate(s)) as {:?}",
        candidates.len(),
        response.classification
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::MemoryIndex;
    use crate::store::memory::MemoryStore;
    use test_log::test;
    use crate::track::Metadata;

    fn meta() -> Metadata {
        Metadata {
            length: 180,
            codever: "4.10".into(),
            ..Default::default()
        }
    }

    /// Pads `head` with filler (hash, time) pairs so it clears the `2*elbow`
    /// length floor. `salt` keeps filler ranges from different calls
    /// disjoint, so two padded strings used as distinct candidates in the
    /// same test never spuriously share a (hash, time) pair.
    fn codes_with_tail(head: &str, elbow: usize, salt: u32) -> String {
        let mut out = head.to_string();
        let have = head.split_whitespace().count() / 2;
        let base = 900_000 + salt * 100_000;
        for i in have..(2 * elbow).max(have) {
            out.push_str(&format!(" {} {}", base + i as u32, base + i as u32));
        }
        out
    }

    #[test]
    fn no_candidates_yields_no_results() {
        let index = MemoryIndex::new();
        let store = MemoryStore::new();
        let query = codes_with_tail("1 0 2 1", 10, 0);

        let response = best_match(&index, &store, &query, 10, 2, 30, std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(response.classification, Classification::NoResults);
    }

    #[test]
    fn single_candidate_with_high_fast_score_is_a_single_good_match() {
        let index = MemoryIndex::new();
        let store = MemoryStore::new();
        let id = SegmentId::new("TRAAAAA", 0);
        let query = codes_with_tail("1 0 2 1 3 2 4 3", 10, 0);

        index.add_segment(&id, &[1, 2, 3, 4], &meta()).unwrap();
        store.set(&id, &query).unwrap();

        let response = best_match(&index, &store, &query, 10, 2, 30, std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(response.classification, Classification::SingleGoodMatch);
        assert_eq!(response.track_id.as_deref(), Some("TRAAAAA"));
    }

    #[test]
    fn query_shorter_than_elbow_is_not_enough_code() {
        let index = MemoryIndex::new();
        let store = MemoryStore::new();

        let response = best_match(&index, &store, "1 0 2 1", 10, 2, 30, std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(response.classification, Classification::NotEnoughCode);
    }

    #[test]
    fn two_tracks_disambiguate_towards_the_better_aligned_one() {
        let index = MemoryIndex::new();
        let store = MemoryStore::new();

        let shared_query = "100 0 200 10 300 20 400 30 500 40 600 50 700 60 800 70 900 80 1000 90";
        let query = codes_with_tail(shared_query, 10, 0);

        let good_id = SegmentId::new("TRGOOD01", 0);
        let bad_id = SegmentId::new("TRBAD002", 0);

        let good_hashes: Vec<u32> = query
            .split_whitespace()
            .step_by(2)
            .filter_map(|t| t.parse().ok())
            .collect();
        index.add_segment(&good_id, &good_hashes, &meta()).unwrap();
        store.set(&good_id, &query).unwrap();

        // A second track sharing only a couple of hashes but at unrelated
        // offsets, so its histogram score should stay low.
        let noisy = codes_with_tail("100 5000 200 9000", 10, 1);
        index.add_segment(&bad_id, &[100, 200], &meta()).unwrap();
        store.set(&bad_id, &noisy).unwrap();

        let response = best_match(&index, &store, &query, 10, 2, 30, std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(response.classification, Classification::MultipleGoodMatchHistogramDecreased);
        assert_eq!(response.track_id.as_deref(), Some("TRGOOD01"));
    }
}
