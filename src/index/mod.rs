//! Inverted-index store: `hash -> segment IDs`, with a "bag query" that
//! ranks segments by how many query hashes they share.

#[cfg(feature = "durable")]
pub mod durable;
pub mod memory;

use crate::error::Result;
use crate::track::{Metadata, SegmentId};

/// One result row from [`InvertedIndexStore::bag_query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub segment_id: SegmentId,
    pub score: u64,
}

/// The inverted-index backend contract (§4.3 / §6).
///
/// Implementations are assumed thread-safe: the decision engine and ingest
/// orchestration call through a [`crate::pool::Pool`] from multiple worker
/// threads.
pub trait InvertedIndexStore: Send + Sync {
    /// Indexes `hashes` (deduplicated internally) against `segment_id`, and
    /// records `metadata` for that segment.
    fn add_segment(&self, segment_id: &SegmentId, hashes: &[u32], metadata: &Metadata) -> Result<()>;

    /// Bulk form of [`add_segment`](Self::add_segment).
    fn add_many(&self, segments: &[(SegmentId, Vec<u32>, Metadata)]) -> Result<()> {
        for (id, hashes, meta) in segments {
            self.add_segment(id, hashes, meta)?;
        }
        Ok(())
    }

    /// Returns up to `rows` segments ranked by the number of `query_hashes`
    /// present in each segment's posting list (the "fast score"), ties
    /// broken by segment ID descending (matching the original service's
    /// `sorted(..., reverse=True)` tuple ordering).
    fn bag_query(&self, query_hashes: &[u32], rows: usize) -> Result<Vec<Candidate>>;

    /// Fetches a previously recorded segment's metadata, if present.
    fn metadata(&self, segment_id: &SegmentId) -> Result<Option<Metadata>>;

    /// Removes every segment whose ID begins with `<track_id>-`.
    fn delete_prefix(&self, track_id: &str) -> Result<()>;

    /// Makes prior writes visible to subsequent queries.
    fn commit(&self) -> Result<()>;
}

pub(crate) fn rank_and_truncate(
    mut scored: Vec<(SegmentId, u64)>,
    rows: usize,
) -> Vec<Candidate> {
    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
    scored
        .into_iter()
        .take(rows)
        .map(|(segment_id, score)| Candidate { segment_id, score })
        .collect()
}

pub(crate) fn dedup_hashes(hashes: &[u32]) -> Vec<u32> {
    let mut seen = std::collections::HashSet::with_capacity(hashes.len());
    hashes.iter().copied().filter(|h| seen.insert(*h)).collect()
}
