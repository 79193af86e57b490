use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use prost::Message;
use tracing::debug;

use crate::api::Record;
use crate::common::{Error, Result};

use super::config::Config;
use super::index::Index;
use super::reader::OriginReader;
use super::store::Store;

pub const STORE_EXT: &str = "store";
pub const INDEX_EXT: &str = "index";

/// A store and an index sharing one base offset.
///
/// Holds the records `base_offset..next_offset`; the record at offset `o`
/// sits in index slot `o - base_offset`.
#[derive(Debug)]
pub struct Segment {
    store: Store,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    config: Config,
}

impl Segment {
    /// Opens, or creates, `<base_offset>.store` and `<base_offset>.index`
    /// under `dir`.
    pub fn new(dir: &Path, base_offset: u64, config: Config) -> Result<Self> {
        let store_path = segment_path(dir, base_offset, STORE_EXT);
        let store_file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&store_path)?;
        let store = Store::new(store_file, store_path)?;

        let index_path = segment_path(dir, base_offset, INDEX_EXT);
        let index_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&index_path)?;
        let index = Index::new(index_file, index_path, config.segment.max_index_bytes)?;

        // Recover the next offset from the last index entry
        let next_offset = match index.last() {
            Ok((off, _)) => base_offset + off as u64 + 1,
            Err(Error::EndOfData) => base_offset,
            Err(err) => return Err(err),
        };
        debug!(base_offset = base_offset, next_offset = next_offset, "segment-opened");

        Ok(Segment {
            store,
            index,
            base_offset,
            next_offset,
            config,
        })
    }

    /// Appends `record`, stamping it with its offset, and returns that offset.
    pub fn append(&mut self, mut record: Record) -> Result<u64> {
        // Checked up front so a full index never leaves a dangling store entry
        if self.index.is_full() {
            return Err(Error::IndexFull);
        }
        let cur = self.next_offset;
        record.offset = cur;
        let p = record.encode_to_vec();

        let (_, pos) = self.store.append(&p)?;
        self.index.write((cur - self.base_offset) as u32, pos)?;
        self.next_offset += 1;
        Ok(cur)
    }

    pub fn read(&mut self, off: u64) -> Result<Record> {
        if !self.contains(off) {
            return Err(Error::OffsetOutOfRange(off));
        }
        let (_, pos) = self.index.read((off - self.base_offset) as u32)?;
        let raw = self.store.read(pos)?;
        Ok(Record::decode(raw.as_slice())?)
    }

    /// True once either the store or the index reached its configured size.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.segment.max_store_bytes
            || self.index.size() >= self.config.segment.max_index_bytes
            || self.index.is_full()
    }

    pub fn contains(&self, off: u64) -> bool {
        self.base_offset <= off && off < self.next_offset
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub(crate) fn origin_reader(&mut self) -> Result<OriginReader> {
        self.store.origin_reader()
    }

    /// Deletes both of its files and then closes the segment.
    pub fn remove(self) -> Result<()> {
        self.remove_files()?;
        self.close()
    }

    /// Unlinks the index, then the store, while both stay open. On error
    /// the segment is still intact in memory and the call can be retried;
    /// files that are already gone are skipped.
    pub(crate) fn remove_files(&self) -> Result<()> {
        for path in [self.index.path(), self.store.path()] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        debug!(base_offset = self.base_offset, "segment-removed");
        Ok(())
    }

    /// Closes the index, then the store. Both are attempted; the first
    /// error wins.
    pub fn close(self) -> Result<()> {
        let index = self.index.close();
        let store = self.store.close();
        index.and(store)
    }
}

pub(crate) fn segment_path(dir: &Path, base_offset: u64, ext: &str) -> PathBuf {
    dir.join(format!("{}.{}", base_offset, ext))
}
