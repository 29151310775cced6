//! In-memory reference implementation of [`super::CodeStreamStore`].

use std::collections::HashMap;
use std::sync::RwLock;

use super::CodeStreamStore;
use crate::error::Result;
use crate::track::SegmentId;

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<SegmentId, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CodeStreamStore for MemoryStore {
    fn get(&self, segment_id: &SegmentId) -> Result<Option<String>> {
        Ok(self.entries.read().expect("store lock poisoned").get(segment_id).cloned())
    }

    fn set(&self, segment_id: &SegmentId, code: &str) -> Result<()> {
        self.entries
            .write()
            .expect("store lock poisoned")
            .insert(segment_id.clone(), code.to_string());
        Ok(())
    }

    fn delete(&self, segment_id: &SegmentId) -> Result<()> {
        self.entries.write().expect("store lock poisoned").remove(segment_id);
        Ok(())
    }

    fn all_segment_ids(&self) -> Result<Vec<SegmentId>> {
        Ok(self.entries.read().expect("store lock poisoned").keys().cloned().collect())
    }
}
