//! In-memory reference implementation of [`super::InvertedIndexStore`].
//!
//! No persistence, no commit-visibility delay: writes are visible
//! immediately. Useful for tests and for embedding the matcher in a process
//! that already owns durability elsewhere.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::{dedup_hashes, rank_and_truncate, Candidate, InvertedIndexStore};
use crate::error::Result;
use crate::track::{Metadata, SegmentId};

#[derive(Default)]
struct State {
    postings: HashMap<u32, HashSet<SegmentId>>,
    metadata: HashMap<SegmentId, Metadata>,
}

/// Thread-safe in-memory inverted index.
#[derive(Default)]
pub struct MemoryIndex {
    state: RwLock<State>,
}

impl MemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl InvertedIndexStore for MemoryIndex {
    fn add_segment(&self, segment_id: &SegmentId, hashes: &[u32], metadata: &Metadata) -> Result<()> {
        let mut state = self.state.write().expect("index lock poisoned");
        for hash in dedup_hashes(hashes) {
            state
                .postings
                .entry(hash)
                .or_default()
                .insert(segment_id.clone());
        }
        state.metadata.insert(segment_id.clone(), metadata.clone());
        Ok(())
    }

    fn bag_query(&self, query_hashes: &[u32], rows: usize) -> Result<Vec<Candidate>> {
        let state = self.state.read().expect("index lock poisoned");
        let mut counts: HashMap<SegmentId, u64> = HashMap::new();

        for hash in dedup_hashes(query_hashes) {
            if let Some(segments) = state.postings.get(&hash) {
                for segment_id in segments {
                    *counts.entry(segment_id.clone()).or_insert(0) += 1;
                }
            }
        }

        Ok(rank_and_truncate(counts.into_iter().collect(), rows))
    }

    fn metadata(&self, segment_id: &SegmentId) -> Result<Option<Metadata>> {
        let state = self.state.read().expect("index lock poisoned");
        Ok(state.metadata.get(segment_id).cloned())
    }

    fn delete_prefix(&self, track_id: &str) -> Result<()> {
        let mut state = self.state.write().expect("index lock poisoned");

        let doomed: Vec<SegmentId> = state
            .metadata
            .keys()
            .filter(|id| id.belongs_to(track_id))
            .cloned()
            .collect();

        for id in &doomed {
            state.metadata.remove(id);
        }
        for postings in state.postings.values_mut() {
            postings.retain(|id| !doomed.contains(id));
        }
        state.postings.retain(|_, segments| !segments.is_empty());

        Ok(())
    }

    fn commit(&self) -> Result<()> {
        Ok(())
    }
}
