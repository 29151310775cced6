//! Durable, file-backed inverted index.
//!
//! Modeled on the teacher storage engine's own segment/trailer/writer split:
//! writes land in an in-memory memtable, `commit()` flushes the memtable to
//! an immutable posting-segment file under `<dir>/segments/`, and a small
//! manifest (current segment file IDs plus delete tombstones) is rewritten
//! atomically the same way the teacher rewrites its own config/levels files
//! (write to a sibling tempfile, then persist over the target path).
//!
//! Unlike the teacher's block-oriented binary format, posting segments here
//! are small JSON documents behind a 5-byte magic+version header: the
//! payload is integer maps and short strings, not multi-megabyte blocks, so
//! a hand-rolled block format would only add complexity without a
//! measurable win.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use super::{dedup_hashes, rank_and_truncate, Candidate, InvertedIndexStore};
use crate::error::{Error, Result};
use crate::track::{Metadata, SegmentId};

const MAGIC: [u8; 4] = *b"FPIX";
const VERSION: u16 = 0;
const SEGMENTS_DIR: &str = "segments";
const MANIFEST_FILE: &str = "index_manifest";

#[derive(Default)]
struct Memtable {
    postings: HashMap<u32, HashSet<SegmentId>>,
    metadata: HashMap<SegmentId, Metadata>,
}

#[derive(Default, Serialize, Deserialize)]
struct PostingSegmentFile {
    postings: HashMap<u32, Vec<SegmentId>>,
    metadata: HashMap<SegmentId, Metadata>,
}

#[derive(Default, Serialize, Deserialize)]
struct Manifest {
    segment_ids: Vec<u64>,
    tombstones: HashSet<String>,
}

/// File-backed [`InvertedIndexStore`]; see module docs for the on-disk
/// layout.
pub struct DurableIndex {
    dir: PathBuf,
    memtable: RwLock<Memtable>,
    manifest: RwLock<Manifest>,
    next_segment_file_id: AtomicU64,
}

impl DurableIndex {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(dir.join(SEGMENTS_DIR))?;

        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = if manifest_path.exists() {
            read_header_and_json(&manifest_path)?
        } else {
            Manifest::default()
        };

        let next_id = manifest.segment_ids.iter().copied().max().map_or(0, |n| n + 1);
        log::debug!(
            "opened durable index at {:?}, {} posting segment(s) on disk",
            dir,
            manifest.segment_ids.len()
        );

        Ok(Self {
            dir,
            memtable: RwLock::new(Memtable::default()),
            manifest: RwLock::new(manifest),
            next_segment_file_id: AtomicU64::new(next_id),
        })
    }

    fn segment_path(&self, file_id: u64) -> PathBuf {
        self.dir.join(SEGMENTS_DIR).join(file_id.to_string())
    }

    fn load_posting_segment(&self, file_id: u64) -> Result<PostingSegmentFile> {
        read_header_and_json(&self.segment_path(file_id))
    }

    fn persist_manifest(&self, manifest: &Manifest) -> Result<()> {
        write_header_and_json_atomic(&self.dir.join(MANIFEST_FILE), manifest)
    }
}

impl InvertedIndexStore for DurableIndex {
    fn add_segment(&self, segment_id: &SegmentId, hashes: &[u32], metadata: &Metadata) -> Result<()> {
        let mut mem = self.memtable.write().expect("memtable lock poisoned");
        for hash in dedup_hashes(hashes) {
            mem.postings.entry(hash).or_default().insert(segment_id.clone());
        }
        mem.metadata.insert(segment_id.clone(), metadata.clone());
        Ok(())
    }

    fn bag_query(&self, query_hashes: &[u32], rows: usize) -> Result<Vec<Candidate>> {
        let manifest = self.manifest.read().expect("manifest lock poisoned");
        let mem = self.memtable.read().expect("memtable lock poisoned");
        let hashes = dedup_hashes(query_hashes);

        let mut counts: HashMap<SegmentId, u64> = HashMap::new();

        for hash in &hashes {
            if let Some(segments) = mem.postings.get(hash) {
                for id in segments {
                    *counts.entry(id.clone()).or_insert(0) += 1;
                }
            }
        }

        for &file_id in &manifest.segment_ids {
            let segment_file = self.load_posting_segment(file_id)?;
            for hash in &hashes {
                if let Some(segments) = segment_file.postings.get(hash) {
                    for id in segments {
                        *counts.entry(id.clone()).or_insert(0) += 1;
                    }
                }
            }
        }

        counts.retain(|id, _| !is_tombstoned(&manifest.tombstones, id));

        Ok(rank_and_truncate(counts.into_iter().collect(), rows))
    }

    fn metadata(&self, segment_id: &SegmentId) -> Result<Option<Metadata>> {
        let manifest = self.manifest.read().expect("manifest lock poisoned");
        if is_tombstoned(&manifest.tombstones, segment_id) {
            return Ok(None);
        }

        let mem = self.memtable.read().expect("memtable lock poisoned");
        if let Some(meta) = mem.metadata.get(segment_id) {
            return Ok(Some(meta.clone()));
        }

        for &file_id in manifest.segment_ids.iter().rev() {
            let segment_file = self.load_posting_segment(file_id)?;
            if let Some(meta) = segment_file.metadata.get(segment_id) {
                return Ok(Some(meta.clone()));
            }
        }

        Ok(None)
    }

    fn delete_prefix(&self, track_id: &str) -> Result<()> {
        {
            let mut mem = self.memtable.write().expect("memtable lock poisoned");
            let doomed: Vec<SegmentId> = mem
                .metadata
                .keys()
                .filter(|id| id.belongs_to(track_id))
                .cloned()
                .collect();
            for id in &doomed {
                mem.metadata.remove(id);
            }
            for postings in mem.postings.values_mut() {
                postings.retain(|id| !doomed.contains(id));
            }
        }

        let mut manifest = self.manifest.write().expect("manifest lock poisoned");
        manifest.tombstones.insert(track_id.to_string());
        log::debug!("tombstoned track prefix {track_id}");
        self.persist_manifest(&manifest)
    }

    fn commit(&self) -> Result<()> {
        let mut mem = self.memtable.write().expect("memtable lock poisoned");
        if mem.postings.is_empty() && mem.metadata.is_empty() {
            return Ok(());
        }

        let file_id = self.next_segment_file_id.fetch_add(1, Ordering::SeqCst);
        log::trace!(
            "flushing memtable ({} hash(es), {} segment(s)) to posting segment {file_id}",
            mem.postings.len(),
            mem.metadata.len()
        );
        let segment_file = PostingSegmentFile {
            postings: mem
                .postings
                .iter()
                .map(|(h, ids)| (*h, ids.iter().cloned().collect()))
                .collect(),
            metadata: mem.metadata.clone(),
        };
        write_header_and_json_atomic(&self.segment_path(file_id), &segment_file)?;

        let mut manifest = self.manifest.write().expect("manifest lock poisoned");
        manifest.segment_ids.push(file_id);
        self.persist_manifest(&manifest)?;

        *mem = Memtable::default();
        Ok(())
    }
}

fn is_tombstoned(tombstones: &HashSet<String>, id: &SegmentId) -> bool {
    tombstones.iter().any(|prefix| id.belongs_to(prefix))
}

fn write_header_and_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&MAGIC);
    buf.write_u16::<BigEndian>(VERSION)?;
    serde_json::to_writer(&mut buf, value).map_err(|e| Error::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let folder = path.parent().expect("segment path should have a parent");
    let mut temp_file = tempfile::NamedTempFile::new_in(folder)?;
    temp_file.write_all(&buf)?;
    temp_file.persist(path).map_err(|e| Error::Io(e.error))?;

    Ok(())
}

fn read_header_and_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(Error::Corrupt {
            path: path.to_path_buf(),
            reason: "bad magic bytes".into(),
        });
    }
    let version = reader.read_u16::<BigEndian>()?;
    if version != VERSION {
        return Err(Error::Corrupt {
            path: path.to_path_buf(),
            reason: format!("unsupported version {version}"),
        });
    }

    serde_json::from_reader(reader).map_err(|e| Error::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn meta() -> Metadata {
        Metadata {
            length: 10,
            codever: "4.10".into(),
            ..Default::default()
        }
    }

    #[test]
    fn query_before_commit_still_sees_memtable_writes() {
        let dir = tempfile::tempdir().unwrap();
        let idx = DurableIndex::open(dir.path()).unwrap();
        idx.add_segment(&SegmentId::new("TRAAAAA", 0), &[1, 2], &meta()).unwrap();

        let results = idx.bag_query(&[1, 2], 10).unwrap();
        assert_eq!(results[0].segment_id, SegmentId::new("TRAAAAA", 0));
        assert_eq!(results[0].score, 2);
    }

    #[test]
    fn commit_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let idx = DurableIndex::open(dir.path()).unwrap();
            idx.add_segment(&SegmentId::new("TRAAAAA", 0), &[1, 2], &meta()).unwrap();
            idx.commit().unwrap();
        }

        let idx = DurableIndex::open(dir.path()).unwrap();
        let results = idx.bag_query(&[1, 2], 10).unwrap();
        assert_eq!(results[0].segment_id, SegmentId::new("TRAAAAA", 0));
        assert_eq!(
            idx.metadata(&SegmentId::new("TRAAAAA", 0)).unwrap().unwrap().codever,
            "4.10"
        );
    }

    #[test]
    fn delete_prefix_is_durable_and_immediate() {
        let dir = tempfile::tempdir().unwrap();
        let idx = DurableIndex::open(dir.path()).unwrap();
        idx.add_segment(&SegmentId::new("TRAAAAA", 0), &[1], &meta()).unwrap();
        idx.commit().unwrap();

        idx.delete_prefix("TRAAAAA").unwrap();
        assert!(idx.bag_query(&[1], 10).unwrap().is_empty());

        let reopened = DurableIndex::open(dir.path()).unwrap();
        assert!(reopened.bag_query(&[1], 10).unwrap().is_empty());
    }
}
