//! Time-offset histogram rescorer: the second-stage signal that tells a
//! genuine aligned match (diffs concentrate in one or two buckets) apart
//! from a coincidental hash collision (diffs smear across many buckets).

use std::collections::HashMap;

/// Default time-quantisation factor absorbing small timing jitter between
/// query and stored codes.
pub const DEFAULT_SLOP: i64 = 2;

/// Default minimum-evidence threshold.
pub const DEFAULT_ELBOW: usize = 10;

/// Computes the time-aligned histogram score between a query code string and
/// a candidate's full code string.
///
/// Returns 0 if `match_codes` is too short to be meaningful evidence
/// (fewer than `2 * elbow` tokens).
#[must_use]
pub fn actual_matches(query_codes: &str, match_codes: &str, slop: i64, elbow: usize) -> u64 {
    let match_tokens: Vec<&str> = match_codes.split_whitespace().collect();
    if match_tokens.len() < 2 * elbow {
        return 0;
    }

    let query_tokens: Vec<&str> = query_codes.split_whitespace().collect();
    if query_tokens.len() < 2 {
        return 0;
    }

    let slop = slop.max(1);

    let query_times: Vec<i64> = query_tokens
        .iter()
        .skip(1)
        .step_by(2)
        .filter_map(|t| t.parse::<i64>().ok())
        .collect();
    let Some(&min_time) = query_times.iter().min() else {
        return 0;
    };

    let mut query_codes_by_hash: HashMap<&str, Vec<i64>> = HashMap::new();
    for (hash, time) in query_tokens
        .iter()
        .step_by(2)
        .zip(query_tokens.iter().skip(1).step_by(2))
    {
        let Ok(time) = time.parse::<i64>() else {
            continue;
        };
        let normalised = time - min_time;
        query_codes_by_hash
            .entry(hash)
            .or_default()
            .push(normalised.div_euclid(slop));
    }

    let mut histogram: HashMap<i64, u64> = HashMap::new();
    for (hash, time) in match_tokens
        .iter()
        .step_by(2)
        .zip(match_tokens.iter().skip(1).step_by(2))
    {
        let Some(query_times) = query_codes_by_hash.get(hash) else {
            continue;
        };
        let Ok(match_time) = time.parse::<i64>() else {
            continue;
        };
        let quantised_match_time = match_time.div_euclid(slop);

        let min_dist = query_times
            .iter()
            .map(|qt| quantised_match_time - qt)
            .min();

        if let Some(dist) = min_dist {
            *histogram.entry(dist).or_insert(0) += 1;
        }
    }

    let mut buckets: Vec<(i64, u64)> = histogram.into_iter().collect();
    // Sort by count descending, ties broken by bucket key descending, matching
    // Python's `sorted(items, key=lambda (k,v): (v,k), reverse=True)`.
    buckets.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));

    match buckets.len() {
        0 => 0,
        1 => buckets[0].1,
        _ => buckets[0].1 + buckets[1].1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_enough(s: &str, elbow: usize) -> String {
        // pad with filler hash/time pairs so the `2*elbow` length floor is met
        let mut out = s.to_string();
        let needed = 2 * elbow;
        let have = s.split_whitespace().count();
        for i in have..needed {
            out.push_str(&format!(" {} {}", 900_000 + i, 900_000 + i));
        }
        out
    }

    #[test]
    fn short_match_codes_score_zero() {
        assert_eq!(actual_matches("1 0 2 1", "1 0 2 1", 2, 10), 0);
    }

    #[test]
    fn perfectly_aligned_match_scores_highly() {
        let query = "100 0 200 10 300 20";
        let candidate = long_enough(query, 10);
        let score = actual_matches(query, &candidate, 2, 10);
        assert!(score >= 3, "expected all three aligned hashes to count, got {score}");
    }

    #[test]
    fn disjoint_hashes_score_zero() {
        let query = "999 0 888 10";
        let candidate = long_enough("100 0 200 10 300 20", 10);
        assert_eq!(actual_matches(query, &candidate, 2, 10), 0);
    }

    #[test]
    fn query_time_normalisation_does_not_affect_offset_consistency() {
        let query = "5 1000 6 1010 7 1020";
        // shift every match time by a constant offset relative to the query:
        // this should still land in a single dominant bucket.
        let candidate = long_enough("5 50 6 60 7 70", 10);
        let score = actual_matches(query, &candidate, 2, 10);
        assert!(score >= 3);
    }
}
