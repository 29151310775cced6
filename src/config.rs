//! Layered configuration: defaults, overridable by a TOML file, overridable
//! by CLI flags in the binary.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::histogram::{DEFAULT_ELBOW, DEFAULT_SLOP};
use crate::pool::DEFAULT_POOL_SIZE;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum-evidence threshold for both the query-length gate and the
    /// histogram rescorer's length floor.
    pub elbow: usize,

    /// Time-quantisation factor used by the histogram rescorer.
    pub slop: i64,

    /// Number of candidates requested from the inverted index per query.
    pub query_rows: usize,

    /// Bound on each backend's connection pool.
    pub pool_size: usize,

    /// Per-backend call timeout.
    #[serde(with = "duration_millis")]
    pub backend_timeout: Duration,

    /// Root directory for the durable backends' on-disk state.
    pub data_dir: std::path::PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            elbow: DEFAULT_ELBOW,
            slop: DEFAULT_SLOP,
            query_rows: 30,
            pool_size: DEFAULT_POOL_SIZE,
            backend_timeout: Duration::from_secs(5),
            data_dir: std::path::PathBuf::from("./data"),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))
    }
}

mod duration_millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.elbow, 10);
        assert_eq!(cfg.slop, 2);
        assert_eq!(cfg.pool_size, 20);
    }

    #[test]
    fn loads_partial_overrides_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "elbow = 5\n").unwrap();

        let cfg = Config::from_file(&path).unwrap();
        assert_eq!(cfg.elbow, 5);
        assert_eq!(cfg.slop, 2, "unset fields fall back to defaults");
    }
}
