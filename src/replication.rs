//! Replication dump/load: exports the full code-stream store to CSV and
//! re-ingests such a dump elsewhere (§6).
//!
//! Row shape (no header): `track_id, codever, fp, length, artist, release,
//! track`, where `track_id` in a dump file is actually the fully-qualified
//! segment ID (`<trid>-<i>`) — loading therefore always calls
//! [`crate::ingest::ingest`] with `split=false`.

use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::track::Fingerprint;

/// Maximum rows per output file before rolling over to a new one.
const ROWS_PER_FILE: usize = 250_000;

#[derive(Debug, Serialize, Deserialize)]
struct Row {
    track_id: String,
    codever: String,
    fp: String,
    length: u32,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    release: Option<String>,
    #[serde(default)]
    track: Option<String>,
}

/// Dumps every segment currently in `ctx`'s code-stream store to one or more
/// CSV files under `out_dir`, named
/// `echoprint-replication-out-<iso-timestamp>-<n>.csv`. Returns the paths
/// written, and records the dump's timestamp under the store's `lastdump`
/// key.
pub fn dump(ctx: &AppContext, out_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;

    let index = ctx.index();
    let store = ctx.store();

    let segment_ids = store.all_segment_ids()?;
    let timestamp = crate::ingest::now_iso8601();
    let filename_stamp = timestamp.replace([':', '.'], "-");

    let mut written = Vec::new();
    let mut chunk_index = 0usize;

    for chunk in segment_ids.chunks(ROWS_PER_FILE) {
        let path = out_dir.join(format!("echoprint-replication-out-{filename_stamp}-{chunk_index}.csv"));
        let file = File::create(&path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        for segment_id in chunk {
            let Some(code) = store.get(segment_id)? else {
                continue;
            };
            let Some(metadata) = index.metadata(segment_id)? else {
                continue;
            };

            writer
                .serialize(Row {
                    track_id: segment_id.as_str().to_string(),
                    codever: metadata.codever,
                    fp: code,
                    length: metadata.length,
                    artist: metadata.artist,
                    release: metadata.release,
                    track: metadata.track,
                })
                .map_err(|e| Error::Replication(e.to_string()))?;
        }

        writer.flush()?;
        written.push(path);
        chunk_index += 1;
    }

    store.set_lastdump(&timestamp)?;

    Ok(written)
}

/// Loads one replication CSV file, ingesting every row with `split=false`.
/// Returns the number of rows loaded.
pub fn load(ctx: &AppContext, path: &Path) -> Result<usize> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new().has_headers(false).from_reader(file);

    let mut fingerprints = Vec::new();
    for result in reader.deserialize() {
        let row: Row = result.map_err(|e| Error::Replication(e.to_string()))?;
        fingerprints.push(Fingerprint {
            track_id: Some(row.track_id),
            fp: row.fp,
            length: row.length,
            codever: row.codever,
            artist: row.artist,
            release: row.release,
            track: row.track,
            source: Some("replication".to_string()),
            import_date: None,
        });
    }

    let count = fingerprints.len();
    ctx.ingest(fingerprints, false)?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::track::Fingerprint;

    #[test]
    fn dump_then_load_round_trips_a_segment() {
        let src = AppContext::in_memory(Config::default());
        src.ingest(
            vec![Fingerprint {
                track_id: Some("TRAAAAA".into()),
                fp: "1 0 2 1 3 2".into(),
                length: 12,
                codever: "4.10".into(),
                artist: Some("Test Artist".into()),
                ..Default::default()
            }],
            false,
        )
        .unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        let files = dump(&src, out_dir.path()).unwrap();
        assert_eq!(files.len(), 1);

        let dst = AppContext::in_memory(Config::default());
        let loaded = load(&dst, &files[0]).unwrap();
        assert_eq!(loaded, 1);

        let response = dst.query("1 0 2 1 3 2").unwrap();
        assert_eq!(response.track_id.as_deref(), Some("TRAAAAA"));
    }
}
