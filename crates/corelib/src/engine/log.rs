//! Append-log durable map.
//!
//! Layout: a fixed header (`MAPL` magic + format version) followed by
//! checksummed put/remove records. Mutations append, flush, and fsync
//! before returning, so the map recovers to its last acknowledged write
//! after a crash. A torn tail (partial record or checksum mismatch) is
//! truncated on open; when stale records outnumber live ones, the log is
//! rewritten compacted.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use xxhash_rust::xxh3::Xxh3;

use crate::config::PartitionTemplate;
use crate::engine::traits::{DurableMap, Engine, EngineError, EngineResult};

const MAGIC: &[u8; 4] = b"MAPL";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: u64 = 8;
const RECORD_HEADER_LEN: usize = 1 + 4 + 4 + 8;

const OP_PUT: u8 = 0;
const OP_REMOVE: u8 = 1;

/// Default [`Engine`] backed by [`LogMap`].
#[derive(Clone, Copy, Debug, Default)]
pub struct LogEngine;

impl Engine for LogEngine {
    fn open(&self, path: &Path, template: &PartitionTemplate) -> EngineResult<Box<dyn DurableMap>> {
        Ok(Box::new(LogMap::open(path, template)?))
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Append-log implementation of [`DurableMap`].
pub struct LogMap {
    path: PathBuf,
    // None once closed
    writer: Option<BufWriter<File>>,
    index: HashMap<Vec<u8>, Vec<u8>>,
    max_entries: u64,
    /// Records appended since the log was last rewritten (live + stale).
    record_count: u64,
    buffer_size: usize,
}

impl LogMap {
    /// Opens or creates the map backing file, replaying any existing log.
    pub fn open(path: &Path, template: &PartitionTemplate) -> EngineResult<Self> {
        let index_capacity = template.max_entries.min(1 << 20) as usize;
        let mut index = HashMap::with_capacity(index_capacity);
        let mut record_count = 0u64;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        if file.metadata()?.len() == 0 {
            file.write_all(MAGIC)?;
            file.write_all(&FORMAT_VERSION.to_le_bytes())?;
            file.sync_data()?;
        } else {
            let valid_len = replay(&mut file, path, &mut index, &mut record_count)?;
            let file_len = file.metadata()?.len();
            if valid_len < file_len {
                debug!(
                    path = %path.display(),
                    dropped = file_len - valid_len,
                    "truncating torn log tail"
                );
                file.set_len(valid_len)?;
            }
        }

        file.seek(SeekFrom::End(0))?;
        let buffer_size = record_buffer_size(template);
        let mut map = Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::with_capacity(buffer_size, file)),
            index,
            max_entries: template.max_entries,
            record_count,
            buffer_size,
        };

        let live = map.index.len() as u64;
        let stale = map.record_count.saturating_sub(live);
        if stale > live {
            debug!(path = %map.path.display(), live, stale, "compacting log");
            map.rewrite()?;
        }
        Ok(map)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&mut self, op: u8, key: &[u8], value: &[u8]) -> EngineResult<()> {
        let writer = self.writer.as_mut().ok_or(EngineError::Closed)?;
        write_record(writer, op, key, value)?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        self.record_count += 1;
        Ok(())
    }

    /// Rewrites the log to hold only the live entries.
    fn rewrite(&mut self) -> EngineResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let tmp_path = self.path.with_extension("rewrite");
        {
            let tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            let mut writer = BufWriter::with_capacity(self.buffer_size, tmp);
            writer.write_all(MAGIC)?;
            writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
            for (key, value) in &self.index {
                write_record(&mut writer, OP_PUT, key, value)?;
            }
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.seek(SeekFrom::End(0))?;
        self.writer = Some(BufWriter::with_capacity(self.buffer_size, file));
        self.record_count = self.index.len() as u64;
        Ok(())
    }
}

impl DurableMap for LogMap {
    fn put(&mut self, key: &[u8], value: &[u8]) -> EngineResult<()> {
        if self.writer.is_none() {
            return Err(EngineError::Closed);
        }
        // declared entry count plus 50% provisioning slack; only gross
        // overcommitment fails
        let hard_cap = self.max_entries.saturating_add(self.max_entries / 2);
        if !self.index.contains_key(key) && self.index.len() as u64 >= hard_cap {
            return Err(EngineError::Full {
                capacity: self.max_entries,
            });
        }
        self.append(OP_PUT, key, value)?;
        self.index.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        if self.writer.is_none() {
            return Err(EngineError::Closed);
        }
        Ok(self.index.get(key).cloned())
    }

    fn remove(&mut self, key: &[u8]) -> EngineResult<Option<Vec<u8>>> {
        if self.writer.is_none() {
            return Err(EngineError::Closed);
        }
        if !self.index.contains_key(key) {
            return Ok(None);
        }
        self.append(OP_REMOVE, key, &[])?;
        Ok(self.index.remove(key))
    }

    fn contains_key(&self, key: &[u8]) -> EngineResult<bool> {
        if self.writer.is_none() {
            return Err(EngineError::Closed);
        }
        Ok(self.index.contains_key(key))
    }

    fn len(&self) -> u64 {
        self.index.len() as u64
    }

    fn close(&mut self) -> EngineResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }
}

/// Validates the header and replays records into `index`. Returns the file
/// length up to the last good record; anything beyond is a torn tail.
fn replay(
    file: &mut File,
    path: &Path,
    index: &mut HashMap<Vec<u8>, Vec<u8>>,
    record_count: &mut u64,
) -> EngineResult<u64> {
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&mut *file);

    let mut header = [0u8; HEADER_LEN as usize];
    reader.read_exact(&mut header).map_err(|_| EngineError::Corrupt {
        path: path.display().to_string(),
        reason: "file shorter than header".to_string(),
    })?;
    if &header[0..4] != MAGIC {
        return Err(EngineError::Corrupt {
            path: path.display().to_string(),
            reason: "bad magic".to_string(),
        });
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if version != FORMAT_VERSION {
        return Err(EngineError::Corrupt {
            path: path.display().to_string(),
            reason: format!("unsupported format version {version}"),
        });
    }

    let mut valid_len = HEADER_LEN;
    loop {
        match read_record(&mut reader) {
            Ok(Some((OP_PUT, key, value, record_len))) => {
                index.insert(key, value);
                *record_count += 1;
                valid_len += record_len;
            }
            Ok(Some((OP_REMOVE, key, _, record_len))) => {
                index.remove(&key);
                *record_count += 1;
                valid_len += record_len;
            }
            // unknown op, torn record, or checksum mismatch: stop here
            Ok(Some(_)) | Err(_) => break,
            // clean end of log
            Ok(None) => break,
        }
    }
    Ok(valid_len)
}

fn read_record<R: Read>(reader: &mut R) -> io::Result<Option<(u8, Vec<u8>, Vec<u8>, u64)>> {
    let mut header = [0u8; RECORD_HEADER_LEN];
    if !read_exact_or_eof(reader, &mut header)? {
        return Ok(None);
    }
    let op = header[0];
    let key_len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
    let value_len = u32::from_le_bytes([header[5], header[6], header[7], header[8]]) as usize;
    let checksum = u64::from_le_bytes([
        header[9], header[10], header[11], header[12], header[13], header[14], header[15],
        header[16],
    ]);

    let mut key = vec![0u8; key_len];
    reader.read_exact(&mut key)?;
    let mut value = vec![0u8; value_len];
    reader.read_exact(&mut value)?;

    if record_checksum(&key, &value) != checksum {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "record checksum mismatch",
        ));
    }
    let record_len = (RECORD_HEADER_LEN + key_len + value_len) as u64;
    Ok(Some((op, key, value, record_len)))
}

/// Like `read_exact`, but a clean EOF before the first byte returns false.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return if filled == 0 {
                Ok(false)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "record truncated",
                ))
            };
        }
        filled += n;
    }
    Ok(true)
}

fn write_record<W: Write>(writer: &mut W, op: u8, key: &[u8], value: &[u8]) -> io::Result<()> {
    writer.write_all(&[op])?;
    writer.write_all(&(key.len() as u32).to_le_bytes())?;
    writer.write_all(&(value.len() as u32).to_le_bytes())?;
    writer.write_all(&record_checksum(key, value).to_le_bytes())?;
    writer.write_all(key)?;
    writer.write_all(value)?;
    Ok(())
}

fn record_checksum(key: &[u8], value: &[u8]) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(key);
    hasher.update(value);
    hasher.digest()
}

/// Writer buffer sized from the template's average-record hints.
fn record_buffer_size(template: &PartitionTemplate) -> usize {
    let avg = RECORD_HEADER_LEN + template.avg_key_size as usize + template.avg_value_size as usize;
    (avg * 16).clamp(4096, 1 << 20)
}
