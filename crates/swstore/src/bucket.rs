//! A single named cache bucket
//!
//! Each bucket is an append-only log in `<name>.bucket`. The in-memory index
//! maps a request key to the offset and length of its live PUT record, so a
//! lookup reads exactly one record back from disk.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::RandomState;
use memmap2::Mmap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::record::{
    create_header, encode_delete, encode_put, parse_header, parse_record, Record, StoredResponse,
    FORMAT_VERSION, HEADER_LEN,
};

/// File extension for bucket files
pub const BUCKET_EXT: &str = "bucket";

/// Location of a live record inside the bucket file
#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u64,
    len: u64,
}

/// A named persistent store of request key -> response
pub struct Bucket {
    name: String,
    path: PathBuf,
    created_seq: u64,

    /// Data file handle
    file: Mutex<File>,

    /// In-memory index: key -> live record location
    index: RwLock<HashMap<String, Slot, RandomState>>,

    /// Current file size
    size: RwLock<u64>,

    closed: AtomicBool,
}

impl Bucket {
    /// Validate a bucket name for use as a file name
    pub fn validate_name(name: &str) -> Result<()> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

        if valid {
            Ok(())
        } else {
            Err(Error::InvalidBucketName(name.to_string()))
        }
    }

    /// Path of the bucket file for `name` inside `dir`
    pub fn file_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.{}", name, BUCKET_EXT))
    }

    /// Create a new empty bucket, replacing any file with the same name
    pub fn create(dir: &Path, name: &str, created_seq: u64) -> Result<Self> {
        Self::validate_name(name)?;
        let path = Self::file_path(dir, name);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let header = create_header(FORMAT_VERSION, created_seq);
        file.write_all(&header)?;
        file.sync_all()?;

        debug!(bucket = name, "created bucket");

        Ok(Self {
            name: name.to_string(),
            path,
            created_seq,
            file: Mutex::new(file),
            index: RwLock::new(HashMap::with_hasher(RandomState::new())),
            size: RwLock::new(HEADER_LEN as u64),
            closed: AtomicBool::new(false),
        })
    }

    /// Open an existing bucket and rebuild its index from the log
    ///
    /// A torn trailing record is cut off. When superseded records outweigh
    /// live ones the file is compacted.
    pub fn open(dir: &Path, name: &str) -> Result<Self> {
        Self::validate_name(name)?;
        let path = Self::file_path(dir, name);

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_len = file.metadata()?.len();

        // SAFETY: the map is private to this function and dropped before the
        // file is written to again; bucket files are owned by one storage.
        let map = unsafe { Mmap::map(&file)? };
        let header = parse_header(&map)?;

        let mut index = HashMap::with_hasher(RandomState::new());
        let mut offset = HEADER_LEN;
        while offset < map.len() {
            match parse_record(&map[offset..]) {
                Ok((rest, record)) => {
                    let len = map.len() - offset - rest.len();
                    let key = String::from_utf8(record.key().to_vec())
                        .map_err(|e| Error::Parse(format!("invalid key: {}", e)))?;
                    match record {
                        Record::Put { .. } => {
                            index.insert(
                                key,
                                Slot {
                                    offset: offset as u64,
                                    len: len as u64,
                                },
                            );
                        }
                        Record::Delete { .. } => {
                            index.remove(&key);
                        }
                    }
                    offset += len;
                }
                Err(e) => {
                    warn!(
                        bucket = name,
                        offset,
                        error = %Error::from(e),
                        "discarding unreadable tail of bucket log"
                    );
                    break;
                }
            }
        }
        drop(map);

        if (offset as u64) < file_len {
            file.set_len(offset as u64)?;
        }

        let bucket = Self {
            name: name.to_string(),
            path,
            created_seq: header.created_seq,
            file: Mutex::new(file),
            index: RwLock::new(index),
            size: RwLock::new(offset as u64),
            closed: AtomicBool::new(false),
        };

        if bucket.garbage_bytes() > bucket.live_bytes() {
            bucket.compact()?;
        }

        Ok(bucket)
    }

    /// Bucket name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creation order within the owning storage
    pub fn created_seq(&self) -> u64 {
        self.created_seq
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    /// Store a response under `key`, replacing any previous entry
    pub fn put(&self, key: &str, response: &StoredResponse) -> Result<()> {
        self.ensure_open()?;
        let record = encode_put(key, response)?;
        self.append(vec![(key.to_string(), record)])
    }

    /// Store several entries with a single write
    ///
    /// Every entry is encoded before anything is written, so an oversized
    /// entry leaves the bucket untouched.
    pub fn put_all(&self, entries: &[(String, StoredResponse)]) -> Result<()> {
        self.ensure_open()?;
        let records = entries
            .iter()
            .map(|(key, response)| Ok((key.clone(), encode_put(key, response)?)))
            .collect::<Result<Vec<_>>>()?;
        self.append(records)
    }

    fn append(&self, records: Vec<(String, Vec<u8>)>) -> Result<()> {
        let mut file = self.file.lock();
        let mut size = self.size.write();

        let start = *size;
        let mut buf = Vec::with_capacity(records.iter().map(|(_, r)| r.len()).sum());
        let mut slots = Vec::with_capacity(records.len());
        for (key, record) in records {
            slots.push((
                key,
                Slot {
                    offset: start + buf.len() as u64,
                    len: record.len() as u64,
                },
            ));
            buf.extend_from_slice(&record);
        }

        file.seek(SeekFrom::Start(start))?;
        if let Err(e) = file.write_all(&buf) {
            // Drop whatever part of the batch made it to disk
            let _ = file.set_len(start);
            return Err(e.into());
        }
        *size = start + buf.len() as u64;

        let mut index = self.index.write();
        for (key, slot) in slots {
            index.insert(key, slot);
        }

        Ok(())
    }

    /// Look up the response stored under `key`
    pub fn get(&self, key: &str) -> Result<Option<StoredResponse>> {
        self.ensure_open()?;

        // Slot and read under the file lock so compaction cannot move the
        // record in between
        let buf = {
            let mut file = self.file.lock();
            let slot = match self.index.read().get(key) {
                Some(slot) => *slot,
                None => return Ok(None),
            };
            let mut buf = vec![0u8; slot.len as usize];
            file.seek(SeekFrom::Start(slot.offset))?;
            file.read_exact(&mut buf)?;
            buf
        };

        let (_, record) = parse_record(&buf)?;
        if record.key() != key.as_bytes() {
            return Err(Error::Parse(format!(
                "index for {:?} points at the record of another key",
                key
            )));
        }
        match record {
            Record::Put { response, .. } => Ok(Some(response.to_owned_response()?)),
            Record::Delete { .. } => Err(Error::Parse(format!(
                "index for {:?} points at a delete record",
                key
            ))),
        }
    }

    /// Check whether an entry exists for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.index.read().contains_key(key)
    }

    /// Remove the entry for `key`, returning whether it existed
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_open()?;
        if !self.contains(key) {
            return Ok(false);
        }

        let record = encode_delete(key)?;
        let mut file = self.file.lock();
        let mut size = self.size.write();
        file.seek(SeekFrom::Start(*size))?;
        file.write_all(&record)?;
        *size += record.len() as u64;

        self.index.write().remove(key);
        Ok(true)
    }

    /// All keys currently stored, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.index.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// Check if the bucket has no entries
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    fn live_bytes(&self) -> u64 {
        self.index.read().values().map(|slot| slot.len).sum()
    }

    fn garbage_bytes(&self) -> u64 {
        let size = *self.size.read();
        size.saturating_sub(HEADER_LEN as u64 + self.live_bytes())
    }

    /// Rewrite the log with only live records
    pub fn compact(&self) -> Result<()> {
        self.ensure_open()?;

        let mut file = self.file.lock();
        let mut size = self.size.write();
        let mut index = self.index.write();

        let tmp_path = self.path.with_extension(format!("{}.tmp", BUCKET_EXT));
        let mut tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(&create_header(FORMAT_VERSION, self.created_seq))?;

        let mut slots: Vec<(String, Slot)> = index.iter().map(|(k, s)| (k.clone(), *s)).collect();
        slots.sort_by_key(|(_, slot)| slot.offset);

        let mut new_index = HashMap::with_capacity_and_hasher(slots.len(), RandomState::new());
        let mut offset = HEADER_LEN as u64;
        let mut buf = Vec::new();
        for (key, slot) in slots {
            buf.resize(slot.len as usize, 0);
            file.seek(SeekFrom::Start(slot.offset))?;
            file.read_exact(&mut buf)?;
            tmp.write_all(&buf)?;
            new_index.insert(
                key,
                Slot {
                    offset,
                    len: slot.len,
                },
            );
            offset += slot.len;
        }
        tmp.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;

        debug!(
            bucket = %self.name,
            before = *size,
            after = offset,
            "compacted bucket"
        );

        *file = tmp;
        *size = offset;
        *index = new_index;
        Ok(())
    }

    /// Flush the log to disk
    pub fn sync(&self) -> Result<()> {
        self.ensure_open()?;
        self.file.lock().sync_all()?;
        Ok(())
    }

    /// Mark the bucket closed; further operations fail with [`Error::Closed`]
    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.file.lock().sync_all();
        }
    }

    /// Path of the backing file
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Bucket {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn page(body: &str) -> StoredResponse {
        StoredResponse {
            status: 200,
            status_text: "OK".to_string(),
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_put_and_get() {
        let dir = TempDir::new().unwrap();
        let bucket = Bucket::create(dir.path(), "static-v1.0.0", 0).unwrap();

        bucket.put("GET http://localhost/", &page("home")).unwrap();

        assert_eq!(bucket.len(), 1);
        assert_eq!(
            bucket.get("GET http://localhost/").unwrap(),
            Some(page("home"))
        );
        assert_eq!(bucket.get("GET http://localhost/missing").unwrap(), None);
    }

    #[test]
    fn test_put_overwrites() {
        let dir = TempDir::new().unwrap();
        let bucket = Bucket::create(dir.path(), "dynamic-v1.0.0", 0).unwrap();

        bucket.put("GET http://localhost/a", &page("old")).unwrap();
        bucket.put("GET http://localhost/a", &page("new")).unwrap();

        assert_eq!(bucket.len(), 1);
        assert_eq!(
            bucket.get("GET http://localhost/a").unwrap().unwrap().body,
            b"new"
        );
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let bucket = Bucket::create(dir.path(), "b", 0).unwrap();

        bucket.put("GET http://localhost/a", &page("a")).unwrap();
        assert!(bucket.delete("GET http://localhost/a").unwrap());
        assert!(!bucket.delete("GET http://localhost/a").unwrap());
        assert!(bucket.is_empty());
    }

    #[test]
    fn test_put_all_rejects_whole_batch() {
        let dir = TempDir::new().unwrap();
        let bucket = Bucket::create(dir.path(), "b", 0).unwrap();

        let huge = StoredResponse::new(200, vec![0u8; crate::record::MAX_BODY_SIZE + 1]);
        let entries = vec![
            ("GET http://localhost/".to_string(), page("home")),
            ("GET http://localhost/huge".to_string(), huge),
        ];

        assert!(matches!(
            bucket.put_all(&entries),
            Err(Error::ValueTooLarge(_))
        ));
        assert!(bucket.is_empty());
    }

    #[test]
    fn test_reopen_restores_entries() {
        let dir = TempDir::new().unwrap();
        {
            let bucket = Bucket::create(dir.path(), "static-v1", 3).unwrap();
            bucket.put("GET http://localhost/", &page("home")).unwrap();
            bucket.put("GET http://localhost/gone", &page("gone")).unwrap();
            bucket.delete("GET http://localhost/gone").unwrap();
        }

        let bucket = Bucket::open(dir.path(), "static-v1").unwrap();
        assert_eq!(bucket.created_seq(), 3);
        assert_eq!(bucket.keys(), vec!["GET http://localhost/".to_string()]);
        assert_eq!(
            bucket.get("GET http://localhost/").unwrap(),
            Some(page("home"))
        );
    }

    #[test]
    fn test_reopen_discards_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = Bucket::file_path(dir.path(), "b");
        {
            let bucket = Bucket::create(dir.path(), "b", 0).unwrap();
            bucket.put("GET http://localhost/a", &page("a")).unwrap();
        }

        let intact_len = fs::metadata(&path).unwrap().len();
        let mut torn = encode_put("GET http://localhost/b", &page("b")).unwrap();
        torn.truncate(torn.len() / 2);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&torn).unwrap();
        drop(file);

        let bucket = Bucket::open(dir.path(), "b").unwrap();
        assert_eq!(bucket.keys(), vec!["GET http://localhost/a".to_string()]);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact_len);

        bucket.put("GET http://localhost/c", &page("c")).unwrap();
        drop(bucket);
        let bucket = Bucket::open(dir.path(), "b").unwrap();
        assert_eq!(bucket.len(), 2);
    }

    #[test]
    fn test_compact_preserves_live_entries() {
        let dir = TempDir::new().unwrap();
        let path = Bucket::file_path(dir.path(), "b");
        let bucket = Bucket::create(dir.path(), "b", 0).unwrap();

        for i in 0..10 {
            bucket
                .put("GET http://localhost/a", &page(&format!("v{}", i)))
                .unwrap();
        }
        bucket.put("GET http://localhost/b", &page("b")).unwrap();
        let before = fs::metadata(&path).unwrap().len();

        bucket.compact().unwrap();

        assert!(fs::metadata(&path).unwrap().len() < before);
        assert_eq!(
            bucket.get("GET http://localhost/a").unwrap().unwrap().body,
            b"v9"
        );
        assert_eq!(bucket.get("GET http://localhost/b").unwrap(), Some(page("b")));

        drop(bucket);
        let bucket = Bucket::open(dir.path(), "b").unwrap();
        assert_eq!(bucket.len(), 2);
    }

    #[test]
    fn test_reads_stay_consistent_while_compacting() {
        let dir = TempDir::new().unwrap();
        let bucket = Bucket::create(dir.path(), "static-v1", 0).unwrap();
        for i in 0..20 {
            bucket
                .put(&format!("GET http://localhost/{}.html", i), &page(&format!("page {}", i)))
                .unwrap();
        }

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for round in 0..50 {
                    bucket
                        .put("GET http://localhost/churn", &page(&format!("churn {}", round)))
                        .unwrap();
                    bucket.compact().unwrap();
                }
            });
            for _ in 0..2 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        for i in 0..20 {
                            let found = bucket
                                .get(&format!("GET http://localhost/{}.html", i))
                                .unwrap();
                            assert_eq!(found, Some(page(&format!("page {}", i))));
                        }
                    }
                });
            }
        });
    }

    #[test]
    fn test_get_rejects_slot_of_another_key() {
        let dir = TempDir::new().unwrap();
        let bucket = Bucket::create(dir.path(), "b", 0).unwrap();
        bucket.put("GET http://localhost/a", &page("a")).unwrap();
        bucket.put("GET http://localhost/b", &page("b")).unwrap();

        let slot = bucket.index.read()["GET http://localhost/b"];
        bucket
            .index
            .write()
            .insert("GET http://localhost/a".to_string(), slot);

        assert!(matches!(
            bucket.get("GET http://localhost/a"),
            Err(Error::Parse(_))
        ));
        assert_eq!(bucket.get("GET http://localhost/b").unwrap(), Some(page("b")));
    }

    #[test]
    fn test_invalid_names() {
        let dir = TempDir::new().unwrap();
        for name in ["", ".hidden", "a/b", "white space"] {
            assert!(matches!(
                Bucket::create(dir.path(), name, 0),
                Err(Error::InvalidBucketName(_))
            ));
        }
    }

    #[test]
    fn test_closed_bucket_rejects_operations() {
        let dir = TempDir::new().unwrap();
        let bucket = Bucket::create(dir.path(), "b", 0).unwrap();
        bucket.close();

        assert!(matches!(
            bucket.put("GET http://localhost/", &page("x")),
            Err(Error::Closed)
        ));
        assert!(matches!(bucket.get("GET http://localhost/"), Err(Error::Closed)));
    }
}
