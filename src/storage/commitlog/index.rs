use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use tracing::warn;

use crate::common::{Error, Result};

const OFF_WIDTH: u64 = 4;
const POS_WIDTH: u64 = 8;
/// Width of one `[u32 relative offset][u64 store position]` entry.
pub const ENT_WIDTH: u64 = OFF_WIDTH + POS_WIDTH;

/// Memory-mapped index from segment-relative offsets to store positions.
///
/// The file is grown to its full capacity before mapping, since a mapping
/// cannot grow in place, and shrunk back to the bytes actually used on
/// close. `size` counts those used bytes and is always a whole number of
/// entries.
#[derive(Debug)]
pub struct Index {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    size: u64,
    closed: bool,
}

impl Index {
    pub fn new(file: File, path: impl Into<PathBuf>, max_index_bytes: u64) -> Result<Self> {
        let path = path.into();
        let size = file.metadata()?.len();
        if size % ENT_WIDTH != 0 {
            return Err(Error::Corrupt(format!(
                "index {} is {} bytes, not a multiple of {}",
                path.display(),
                size,
                ENT_WIDTH
            )));
        }

        // Grow to capacity, never below what is already there
        file.set_len(size.max(max_index_bytes))?;

        // SAFETY: the log directory is owned by a single Log, so no other
        // code touches this file while it is mapped; every access below is
        // bounds-checked against the mapping length.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Index {
            path,
            file,
            mmap,
            size,
            closed: false,
        })
    }

    /// Entry at relative slot `slot`.
    pub fn read(&self, slot: u32) -> Result<(u32, u64)> {
        self.entry(slot)
    }

    /// The most recently written entry.
    pub fn last(&self) -> Result<(u32, u64)> {
        if self.size == 0 {
            return Err(Error::EndOfData);
        }
        self.entry((self.size / ENT_WIDTH - 1) as u32)
    }

    fn entry(&self, slot: u32) -> Result<(u32, u64)> {
        if self.size == 0 {
            return Err(Error::EndOfData);
        }
        let pos = slot as u64 * ENT_WIDTH;
        if self.size < pos + ENT_WIDTH || (self.mmap.len() as u64) < pos + ENT_WIDTH {
            return Err(Error::EndOfData);
        }
        let pos = pos as usize;
        let mid = pos + OFF_WIDTH as usize;
        let end = pos + ENT_WIDTH as usize;

        let mut off = [0u8; OFF_WIDTH as usize];
        off.copy_from_slice(&self.mmap[pos..mid]);
        let mut store_pos = [0u8; POS_WIDTH as usize];
        store_pos.copy_from_slice(&self.mmap[mid..end]);

        Ok((u32::from_be_bytes(off), u64::from_be_bytes(store_pos)))
    }

    /// Appends an entry; fails with `IndexFull` once the mapping is used up.
    pub fn write(&mut self, off: u32, pos: u64) -> Result<()> {
        if self.is_full() {
            return Err(Error::IndexFull);
        }
        let start = self.size as usize;
        let mid = start + OFF_WIDTH as usize;
        let end = start + ENT_WIDTH as usize;
        self.mmap[start..mid].copy_from_slice(&off.to_be_bytes());
        self.mmap[mid..end].copy_from_slice(&pos.to_be_bytes());

        self.size += ENT_WIDTH;
        Ok(())
    }

    /// True when one more entry would not fit in the mapping.
    pub fn is_full(&self) -> bool {
        (self.mmap.len() as u64) < self.size + ENT_WIDTH
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Syncs the mapping, then the file, and truncates the file to the
    /// bytes in use.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.mmap.flush()?;
        self.file.sync_all()?;
        self.file.set_len(self.size)?;
        Ok(())
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(path=%self.path.display(), err=%err, "index-close-on-drop-failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Index, ENT_WIDTH};
    use crate::common::Error;
    use std::fs::{File, OpenOptions};
    use std::path::Path;

    fn open(path: &Path, max_index_bytes: u64) -> crate::common::Result<Index> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .unwrap();
        Index::new(file, path, max_index_bytes)
    }

    #[test]
    fn test_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.index");

        let mut idx = open(&path, 1024).unwrap();
        // No entries in the index
        assert!(matches!(idx.last(), Err(Error::EndOfData)));
        assert_eq!(idx.path(), path.as_path());

        let entries = [(0u32, 0u64), (1, 10)];
        for (off, pos) in entries {
            idx.write(off, pos).unwrap();
            let (_, read_pos) = idx.read(off).unwrap();
            assert_eq!(read_pos, pos);
        }

        // Reading past the number of entries
        assert!(matches!(idx.read(entries.len() as u32), Err(Error::EndOfData)));
        idx.close().unwrap();

        // Should rebuild the index from the existing file
        let idx = open(&path, 1024).unwrap();
        assert_eq!(idx.size(), 2 * ENT_WIDTH);
        assert_eq!(idx.last().unwrap(), entries[1]);
    }

    #[test]
    fn test_index_close_truncates_to_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.index");

        let mut idx = open(&path, 1024).unwrap();
        assert_eq!(File::open(&path).unwrap().metadata().unwrap().len(), 1024);
        idx.write(0, 0).unwrap();
        idx.close().unwrap();

        assert_eq!(File::open(&path).unwrap().metadata().unwrap().len(), ENT_WIDTH);
    }

    #[test]
    fn test_index_drop_truncates_to_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.index");
        {
            let mut idx = open(&path, 1024).unwrap();
            idx.write(0, 0).unwrap();
            idx.write(1, 19).unwrap();
        }
        assert_eq!(File::open(&path).unwrap().metadata().unwrap().len(), 2 * ENT_WIDTH);
    }

    #[test]
    fn test_index_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.index");

        let mut idx = open(&path, ENT_WIDTH * 3).unwrap();
        for off in 0..3u32 {
            assert!(!idx.is_full());
            idx.write(off, off as u64 * 20).unwrap();
        }
        assert!(idx.is_full());
        assert!(matches!(idx.write(3, 60), Err(Error::IndexFull)));

        // The failed write leaves earlier entries intact
        assert_eq!(idx.size(), ENT_WIDTH * 3);
        assert_eq!(idx.last().unwrap(), (2, 40));
    }

    #[test]
    fn test_index_capacity_not_multiple_of_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.index");

        // 30 bytes hold two whole entries
        let mut idx = open(&path, 30).unwrap();
        idx.write(0, 0).unwrap();
        idx.write(1, 1).unwrap();
        assert!(matches!(idx.write(2, 2), Err(Error::IndexFull)));
    }

    #[test]
    fn test_index_partial_entry_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.index");
        std::fs::write(&path, [0u8; 13]).unwrap();

        assert!(matches!(open(&path, 1024), Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_index_never_shrinks_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.index");

        let mut idx = open(&path, 1024).unwrap();
        for off in 0..4u32 {
            idx.write(off, off as u64).unwrap();
        }
        idx.close().unwrap();

        // Reopen with a limit smaller than what is on disk
        let idx = open(&path, ENT_WIDTH).unwrap();
        assert_eq!(idx.last().unwrap(), (3, 3));
        assert!(idx.is_full());
    }
}
