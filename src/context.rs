//! Application context: owns the two backend connection pools and the
//! resolved configuration, created once at startup and handed by reference
//! into every entry point (§9 "Global state").
//!
//! The original service reached for module-level globals for its backend
//! handles; here those become fields on one struct, so ownership and
//! teardown (dropping the pools closes the backend connections) are
//! explicit instead of implicit in process lifetime.

use std::sync::Arc;

use crate::config::Config;
use crate::decision::{self, Response};
use crate::error::Result;
#[cfg(feature = "durable")]
use crate::index::durable::DurableIndex;
use crate::index::memory::MemoryIndex;
use crate::index::InvertedIndexStore;
use crate::pool::Pool;
#[cfg(feature = "durable")]
use crate::store::durable::DurableStore;
use crate::store::memory::MemoryStore;
use crate::store::CodeStreamStore;
use crate::track::{Fingerprint, TrackId};
use crate::{ingest, replication};

/// Bundles the two backend pools and configuration used by every request.
#[derive(Clone)]
pub struct AppContext {
    index_pool: Pool<Arc<dyn InvertedIndexStore>>,
    store_pool: Pool<Arc<dyn CodeStreamStore>>,
    config: Config,
}

impl AppContext {
    /// Builds a context backed by the durable, file-based backends rooted at
    /// `config.data_dir`.
    #[cfg(feature = "durable")]
    pub fn durable(config: Config) -> Result<Self> {
        let index_dir = config.data_dir.join("index");
        let store_dir = config.data_dir.join("store");
        let index: Arc<dyn InvertedIndexStore> = Arc::new(DurableIndex::open(&index_dir)?);
        let store: Arc<dyn CodeStreamStore> = Arc::new(DurableStore::open(&store_dir)?);
        Ok(Self::from_backends(index, store, config))
    }

    /// Builds a context backed by the non-persistent in-memory backends,
    /// useful for tests and for embedding the matcher without its own
    /// durability.
    #[must_use]
    pub fn in_memory(config: Config) -> Self {
        let index: Arc<dyn InvertedIndexStore> = Arc::new(MemoryIndex::new());
        let store: Arc<dyn CodeStreamStore> = Arc::new(MemoryStore::new());
        Self::from_backends(index, store, config)
    }

    fn from_backends(index: Arc<dyn InvertedIndexStore>, store: Arc<dyn CodeStreamStore>, config: Config) -> Self {
        let pool_size = config.pool_size;
        Self {
            index_pool: Pool::new(pool_size, move || index.clone()),
            store_pool: Pool::new(pool_size, move || store.clone()),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the decision engine against `query` using this context's pooled
    /// backends and configured thresholds.
    pub fn query(&self, query: &str) -> Result<Response> {
        let index = self.index_pool.checkout();
        let store = self.store_pool.checkout();
        decision::best_match(
            index.as_ref(),
            store.as_ref(),
            query,
            self.config.elbow,
            self.config.slop,
            self.config.query_rows,
            self.config.backend_timeout,
        )
    }

    pub fn ingest(&self, fingerprints: Vec<Fingerprint>, split: bool) -> Result<Vec<TrackId>> {
        let index = self.index_pool.checkout();
        let store = self.store_pool.checkout();
        ingest::ingest(index.as_ref(), store.as_ref(), fingerprints, split)
    }

    pub fn delete(&self, track_ids: &[TrackId]) -> Result<()> {
        let index = self.index_pool.checkout();
        let store = self.store_pool.checkout();
        ingest::delete(index.as_ref(), store.as_ref(), track_ids)
    }

    pub fn replicate_dump(&self, out_dir: &std::path::Path) -> Result<Vec<std::path::PathBuf>> {
        replication::dump(self, out_dir)
    }

    pub fn replicate_load(&self, path: &std::path::Path) -> Result<usize> {
        replication::load(self, path)
    }

    pub(crate) fn index(&self) -> crate::pool::PooledConnection<Arc<dyn InvertedIndexStore>> {
        self.index_pool.checkout()
    }

    pub(crate) fn store(&self) -> crate::pool::PooledConnection<Arc<dyn CodeStreamStore>> {
        self.store_pool.checkout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Fingerprint;

    #[test]
    fn ingest_then_query_round_trips_through_the_context() {
        let ctx = AppContext::in_memory(Config::default());
        let fp = Fingerprint {
            track_id: Some("TRAAAAA".into()),
            fp: "1 0 2 1 3 2 4 3 5 4 6 5 7 6 8 7 9 8 10 9".into(),
            length: 10,
            codever: "4.10".into(),
            ..Default::default()
        };

        ctx.ingest(vec![fp.clone()], false).unwrap();
        let response = ctx.query(&fp.fp).unwrap();
        assert_eq!(response.track_id.as_deref(), Some("TRAAAAA"));
    }
}
