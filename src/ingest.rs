//! Ingest orchestration: validates fingerprint submissions, splits them into
//! segments (or passes them through), and dual-writes to the inverted index
//! and code-stream store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::error::{Error, Result};
use crate::index::InvertedIndexStore;
use crate::pool::with_timeout;
use crate::segmenter;
use crate::store::CodeStreamStore;
use crate::track::{Fingerprint, Metadata, SegmentRecord, TrackId};

const DEFAULT_SOURCE: &str = "local";

/// Per-backend call timeout for ingest writes. Unlike query-path timeouts
/// (§5.2, which degrade to "no results"), a write that times out during
/// ingest is a genuine failure the caller must see (§7).
const INGEST_BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Monotonic counter mixed into generated track IDs so two IDs minted within
/// the same second never collide.
static TRACK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates `"TR"` + 5 random uppercase ASCII letters + a hex, monotonically
/// increasing epoch-derived counter, per §4.7 and the HTTP surface contract.
pub fn new_track_id() -> TrackId {
    let mut rng = rand::thread_rng();
    let letters: String = (0..5).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect();

    let epoch_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let counter = TRACK_ID_COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("TR{letters}{:x}", epoch_secs.wrapping_add(counter))
}

pub(crate) fn now_iso8601() -> String {
    let epoch_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    time::OffsetDateTime::from_unix_timestamp(epoch_secs as i64)
        .ok()
        .and_then(|dt| dt.format(&time::format_description::well_known::Rfc3339).ok())
        .unwrap_or_else(|| epoch_secs.to_string())
}

/// Validates and fills in defaults for one submission, without splitting.
fn prepare(mut fp: Fingerprint) -> Result<(TrackId, Metadata, String)> {
    if fp.fp.is_empty() {
        return Err(Error::MissingField("fp"));
    }
    if fp.codever.is_empty() {
        return Err(Error::MissingField("codever"));
    }

    let track_id = fp.track_id.take().unwrap_or_else(new_track_id);
    let source = fp.source.take().unwrap_or_else(|| DEFAULT_SOURCE.to_string());
    let import_date = fp.import_date.take().unwrap_or_else(now_iso8601);

    let metadata = Metadata {
        length: fp.length,
        codever: fp.codever,
        artist: fp.artist,
        release: fp.release,
        track: fp.track,
        source: Some(source),
        import_date: Some(import_date),
    };

    Ok((track_id, metadata, fp.fp))
}

/// Runs a fallible backend write under [`INGEST_BACKEND_TIMEOUT`], turning a
/// timeout into `Error::Timeout` instead of silently degrading (unlike the
/// query-path timeouts in `decision::best_match`).
fn call_with_timeout<T: Send>(backend: &'static str, f: impl FnOnce() -> Result<T> + Send) -> Result<T> {
    let started = std::time::Instant::now();
    with_timeout(INGEST_BACKEND_TIMEOUT, f).unwrap_or_else(|| {
        Err(Error::Timeout {
            backend,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    })
}

/// Ingests `fingerprints`, splitting each into segments unless `split` is
/// false (used by replication loads, whose rows are already pre-split
/// segments). Returns the track IDs assigned, in input order.
pub fn ingest(
    index: &dyn InvertedIndexStore,
    store: &dyn CodeStreamStore,
    fingerprints: Vec<Fingerprint>,
    split: bool,
) -> Result<Vec<TrackId>> {
    let mut track_ids = Vec::with_capacity(fingerprints.len());
    let mut records: Vec<SegmentRecord> = Vec::new();

    for fp in fingerprints {
        let (track_id, metadata, code_string) = prepare(fp)?;

        let segments = if split {
            segmenter::split(&track_id, &code_string, &metadata)?
        } else {
            // Replication rows carry an already-complete segment ID
            // (`<trid>-<i>`) in this field; a plain track ID with no split
            // requested is wrapped as that track's sole segment 0.
            let id = crate::track::SegmentId::parse(track_id.clone())
                .unwrap_or_else(|_| crate::track::SegmentId::new(&track_id, 0));
            vec![SegmentRecord {
                id,
                fp: code_string,
                metadata: metadata.clone(),
            }]
        };

        track_ids.push(segments.first().map_or(track_id, |s| s.id.track_id().to_string()));
        records.extend(segments);
    }

    for record in &records {
        let hashes: Vec<u32> = record
            .fp
            .split_whitespace()
            .step_by(2)
            .filter_map(|t| t.parse().ok())
            .collect();
        call_with_timeout("inverted-index", || index.add_segment(&record.id, &hashes, &record.metadata))?;
        call_with_timeout("code-stream", || store.set(&record.id, &record.fp))?;
    }

    call_with_timeout("inverted-index", || index.commit())?;

    log::debug!("ingested {} fingerprint(s) as {} segment(s)", track_ids.len(), records.len());
    Ok(track_ids)
}

/// Deletes every segment belonging to each of `track_ids` from both stores.
pub fn delete(index: &dyn InvertedIndexStore, store: &dyn CodeStreamStore, track_ids: &[TrackId]) -> Result<()> {
    log::debug!("deleting {} track(s)", track_ids.len());
    for track_id in track_ids {
        index.delete_prefix(track_id)?;
    }
    // The code-stream store has no prefix-delete primitive (§4.4), so every
    // segment ID has to be enumerated and filtered by track prefix.
    let doomed: Vec<_> = store
        .all_segment_ids()?
        .into_iter()
        .filter(|id| track_ids.iter().any(|t| id.belongs_to(t)))
        .collect();
    store.multi_delete(&doomed)
}
