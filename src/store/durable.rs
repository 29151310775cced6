//! Append-only, file-backed code-stream store.
//!
//! The teacher crate keeps large values out of its own sorted tree by
//! delegating them to a separate append-only value log and keeping only
//! offsets in memory; this store borrows that same split without pulling in
//! the teacher's value-log dependency, since the records here are a single
//! flat stream rather than something that needs its own compaction policy.
//! A write appends a record to `codes.log` and records the record's byte
//! offset in an in-memory index; `open()` rebuilds that index by replaying
//! the log from the start, last-writer-wins, exactly like a bitcask-style
//! key/value store.
//!
//! Besides segment code strings, this store also holds the replication
//! module's `lastdump` marker (§6) under a reserved key that can never
//! collide with a [`SegmentId`], since segment IDs always contain `-`.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use super::CodeStreamStore;
use crate::error::{Error, Result};
use crate::track::SegmentId;

const LOG_FILE: &str = "codes.log";
const TAG_SET: u8 = 0;
const TAG_DELETE: u8 = 1;

/// Reserved key recording the timestamp of the last full replication dump.
pub const LASTDUMP_KEY: &str = "lastdump";

struct State {
    log: File,
    /// key -> (value offset, value length), absent means deleted.
    index: HashMap<String, (u64, u32)>,
}

/// Append-only [`CodeStreamStore`] backed by a single log file per data
/// directory.
pub struct DurableStore {
    state: RwLock<State>,
}

impl DurableStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILE);

        let mut log = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
        let index = replay(&mut log, &path)?;
        log::debug!("opened code-stream log {:?}, {} live key(s)", path, index.len());

        Ok(Self {
            state: RwLock::new(State { log, index }),
        })
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.state.write().expect("store lock poisoned");
        let Some(&(offset, len)) = state.index.get(key) else {
            return Ok(None);
        };

        let mut buf = vec![0u8; len as usize];
        state.log.seek(SeekFrom::Start(offset))?;
        state.log.read_exact(&mut buf)?;
        String::from_utf8(buf)
            .map(Some)
            .map_err(|e| Error::Corrupt {
                path: PathBuf::from(LOG_FILE),
                reason: e.to_string(),
            })
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.write().expect("store lock poisoned");
        let offset = append_record(&mut state.log, TAG_SET, key, Some(value))?;
        state.index.insert(key.to_string(), (offset, value.len() as u32));
        Ok(())
    }

    fn delete_raw(&self, key: &str) -> Result<()> {
        let mut state = self.state.write().expect("store lock poisoned");
        append_record(&mut state.log, TAG_DELETE, key, None)?;
        state.index.remove(key);
        log::trace!("appended tombstone record for {key}");
        Ok(())
    }

    /// Reads the replication module's last-dump marker, if one was ever set.
    pub fn lastdump(&self) -> Result<Option<String>> {
        self.get_raw(LASTDUMP_KEY)
    }

    /// Records `timestamp` as the replication module's last-dump marker.
    pub fn set_lastdump(&self, timestamp: &str) -> Result<()> {
        self.set_raw(LASTDUMP_KEY, timestamp)
    }
}

impl CodeStreamStore for DurableStore {
    fn get(&self, segment_id: &SegmentId) -> Result<Option<String>> {
        self.get_raw(segment_id.as_str())
    }

    fn set(&self, segment_id: &SegmentId, code: &str) -> Result<()> {
        self.set_raw(segment_id.as_str(), code)
    }

    fn delete(&self, segment_id: &SegmentId) -> Result<()> {
        self.delete_raw(segment_id.as_str())
    }

    fn all_segment_ids(&self) -> Result<Vec<SegmentId>> {
        let state = self.state.read().expect("store lock poisoned");
        Ok(state
            .index
            .keys()
            .filter(|k| k.as_str() != LASTDUMP_KEY)
            .filter_map(|k| SegmentId::parse(k.clone()).ok())
            .collect())
    }

    fn lastdump(&self) -> Result<Option<String>> {
        DurableStore::lastdump(self)
    }

    fn set_lastdump(&self, timestamp: &str) -> Result<()> {
        DurableStore::set_lastdump(self, timestamp)
    }
}

/// `tag(1) | key_len(2) | key | [value_len(4) | value]`. Returns the file
/// offset at which the value bytes begin (meaningless for `TAG_DELETE`).
fn append_record(log: &mut File, tag: u8, key: &str, value: Option<&str>) -> Result<u64> {
    let mut buf = Vec::with_capacity(8 + key.len() + value.map_or(0, str::len));
    buf.write_u8(tag)?;
    buf.write_u16::<BigEndian>(key.len() as u16)?;
    buf.extend_from_slice(key.as_bytes());
    if let Some(value) = value {
        buf.write_u32::<BigEndian>(value.len() as u32)?;
        buf.extend_from_slice(value.as_bytes());
    }

    let record_start = log.seek(SeekFrom::End(0))?;
    log.write_all(&buf)?;
    log.flush()?;

    let header_len = 1 + 2 + key.len() as u64 + 4;
    Ok(record_start + header_len)
}

fn replay(log: &mut File, path: &Path) -> Result<HashMap<String, (u64, u32)>> {
    let mut index = HashMap::new();
    log.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(log.try_clone()?);
    let mut offset = 0u64;

    loop {
        let tag = match reader.read_u8() {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };

        let key_len = reader.read_u16::<BigEndian>()?;
        let mut key_buf = vec![0u8; key_len as usize];
        reader.read_exact(&mut key_buf)?;
        let key = String::from_utf8(key_buf).map_err(|e| Error::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut consumed = 1 + 2 + key_len as u64;

        match tag {
            TAG_SET => {
                let value_len = reader.read_u32::<BigEndian>()?;
                reader.seek_relative(i64::from(value_len))?;
                consumed += 4 + u64::from(value_len);
                let value_offset = offset + consumed - u64::from(value_len);
                index.insert(key, (value_offset, value_len));
            }
            TAG_DELETE => {
                index.remove(&key);
            }
            other => {
                return Err(Error::Corrupt {
                    path: path.to_path_buf(),
                    reason: format!("unknown record tag {other}"),
                })
            }
        }

        offset += consumed;
    }

    log.seek(SeekFrom::End(0))?;
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn round_trips_a_single_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        let id = SegmentId::new("TRAAAAA", 0);
        store.set(&id, "1 2 3").unwrap();
        assert_eq!(store.get(&id).unwrap().as_deref(), Some("1 2 3"));
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = SegmentId::new("TRAAAAA", 0);
        {
            let store = DurableStore::open(dir.path()).unwrap();
            store.set(&id, "1 2 3").unwrap();
        }
        let store = DurableStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&id).unwrap().as_deref(), Some("1 2 3"));
    }

    #[test]
    fn delete_is_durable() {
        let dir = tempfile::tempdir().unwrap();
        let id = SegmentId::new("TRAAAAA", 0);
        {
            let store = DurableStore::open(dir.path()).unwrap();
            store.set(&id, "1 2 3").unwrap();
            store.delete(&id).unwrap();
        }
        let store = DurableStore::open(dir.path()).unwrap();
        assert!(store.get(&id).unwrap().is_none());
    }

    #[test]
    fn lastdump_marker_round_trips_and_is_not_a_segment() {
        let dir = tempfile::tempdir().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        assert!(store.lastdump().unwrap().is_none());

        store.set_lastdump("2026-08-01T00:00:00Z").unwrap();
        assert_eq!(store.lastdump().unwrap().as_deref(), Some("2026-08-01T00:00:00Z"));

        store.set(&SegmentId::new("TRAAAAA", 0), "1 2").unwrap();
        assert_eq!(store.all_segment_ids().unwrap(), vec![SegmentId::new("TRAAAAA", 0)]);
    }

    #[test]
    fn later_write_overrides_earlier_one_on_replay() {
        let dir = tempfile::tempdir().unwrap();
        let id = SegmentId::new("TRAAAAA", 0);
        {
            let store = DurableStore::open(dir.path()).unwrap();
            store.set(&id, "first").unwrap();
            store.set(&id, "second").unwrap();
        }
        let store = DurableStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&id).unwrap().as_deref(), Some("second"));
    }
}
