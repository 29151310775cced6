//! Code-stream store: `segment ID -> raw code string`, the second half of
//! the dual-write the ingest path performs alongside the inverted index
//! (§4.4).

#[cfg(feature = "durable")]
pub mod durable;
pub mod memory;

use crate::error::Result;
use crate::track::SegmentId;

/// The code-stream backend contract. A segment's code string is the literal
/// decoded token string handed to the histogram rescorer, keyed by the same
/// [`SegmentId`] used in [`crate::index::InvertedIndexStore`].
pub trait CodeStreamStore: Send + Sync {
    fn get(&self, segment_id: &SegmentId) -> Result<Option<String>>;

    /// Bulk form of [`get`](Self::get); missing segments are simply absent
    /// from the result rather than erroring.
    fn multi_get(&self, segment_ids: &[SegmentId]) -> Result<Vec<(SegmentId, String)>> {
        let mut found = Vec::with_capacity(segment_ids.len());
        for id in segment_ids {
            if let Some(code) = self.get(id)? {
                found.push((id.clone(), code));
            }
        }
        Ok(found)
    }

    fn set(&self, segment_id: &SegmentId, code: &str) -> Result<()>;

    fn multi_set(&self, entries: &[(SegmentId, String)]) -> Result<()> {
        for (id, code) in entries {
            self.set(id, code)?;
        }
        Ok(())
    }

    fn delete(&self, segment_id: &SegmentId) -> Result<()>;

    fn multi_delete(&self, segment_ids: &[SegmentId]) -> Result<()> {
        for id in segment_ids {
            self.delete(id)?;
        }
        Ok(())
    }

    /// Every segment ID currently held, for the replication dump path
    /// (§6). Backends that also store non-segment keys (the durable
    /// backend's `lastdump` marker) exclude them here.
    fn all_segment_ids(&self) -> Result<Vec<SegmentId>>;

    /// Reads the replication module's last-dump marker (§6), if the backend
    /// tracks one. The in-memory reference backend has no use for this and
    /// always returns `None`.
    fn lastdump(&self) -> Result<Option<String>> {
        Ok(None)
    }

    /// Records `timestamp` as the replication module's last-dump marker.
    /// A no-op on backends that don't persist one.
    fn set_lastdump(&self, _timestamp: &str) -> Result<()> {
        Ok(())
    }
}
