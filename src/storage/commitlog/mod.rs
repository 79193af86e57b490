//! Durable, segmented commit log.
//!
//! Records are appended to the last (active) segment and addressed by
//! absolute offsets. Each segment is a `<base_offset>.store` file of
//! length-prefixed records plus a `<base_offset>.index` file mapping
//! relative offsets to store positions. The segment list is rebuilt from
//! the file names in the log directory every time the log is opened.

mod config;
mod index;
mod reader;
mod segment;
mod store;

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::api::Record;
use crate::common::{Error, Result};
use crate::storage::CommitLog;

pub use self::config::{Config, SegmentConfig};
pub use index::{Index, ENT_WIDTH};
pub use reader::{LogReader, OriginReader};
pub use segment::{Segment, INDEX_EXT, STORE_EXT};
pub use store::{Store, LEN_WIDTH};

/// An append-only log made of segments sorted by base offset.
///
/// Every operation, reads included, takes the same exclusive lock over
/// the segment list.
#[derive(Debug)]
pub struct Log {
    dir: PathBuf,
    config: Config,
    segments: Mutex<Vec<Segment>>,
}

impl Log {
    /// Opens the log stored in `dir`, creating the directory and a first
    /// segment when there is nothing to recover.
    pub fn open(dir: impl Into<PathBuf>, config: Config) -> Result<Self> {
        let dir = dir.into();
        let config = config.with_defaults();
        let segments = setup(&dir, &config)?;
        Ok(Log {
            dir,
            config,
            segments: Mutex::new(segments),
        })
    }

    /// Appends `record` to the active segment and returns its offset.
    pub fn append(&self, record: Record) -> Result<u64> {
        let mut segments = self.lock()?;

        let maxed = segments.last().map_or(true, Segment::is_maxed);
        if maxed {
            let base_offset = segments
                .last()
                .map_or(self.config.segment.initial_offset, Segment::next_offset);
            self.roll(&mut segments, base_offset)?;
        }

        let active = segments.last_mut().ok_or(Error::NoSegments)?;
        let off = active.append(record)?;
        if active.is_maxed() {
            self.roll(&mut segments, off + 1)?;
        }
        Ok(off)
    }

    /// Reads the record at `off`.
    pub fn read(&self, off: u64) -> Result<Record> {
        let mut segments = self.lock()?;
        segments
            .iter_mut()
            .find(|s| s.contains(off))
            .ok_or(Error::OffsetOutOfRange(off))?
            .read(off)
    }

    pub fn lowest_offset(&self) -> Result<u64> {
        let segments = self.lock()?;
        segments
            .first()
            .map(Segment::base_offset)
            .ok_or(Error::NoSegments)
    }

    pub fn highest_offset(&self) -> Result<u64> {
        let segments = self.lock()?;
        segments
            .last()
            .map(|s| s.next_offset().saturating_sub(1))
            .ok_or(Error::NoSegments)
    }

    /// Removes every segment whose records all sit at or below `lowest`.
    ///
    /// The data is gone for good. If no segment survives, a fresh one is
    /// started at the old next offset so offsets keep increasing.
    pub fn truncate(&self, lowest: u64) -> Result<()> {
        let mut segments = self.lock()?;
        let next_offset = segments.last().map(Segment::next_offset);

        let mut rest = std::mem::take(&mut *segments).into_iter();
        let mut removed = 0;
        while let Some(segment) = rest.next() {
            if segment.next_offset() <= lowest.saturating_add(1) {
                // Keep the segment if its files could not be deleted
                if let Err(err) = segment.remove_files() {
                    segments.push(segment);
                    segments.extend(rest);
                    return Err(err);
                }
                removed += 1;
                if let Err(err) = segment.close() {
                    segments.extend(rest);
                    return Err(err);
                }
            } else {
                segments.push(segment);
            }
        }
        info!(lowest = lowest, removed = removed, "log-truncated");

        if segments.is_empty() {
            if let Some(next_offset) = next_offset {
                self.roll(&mut segments, next_offset)?;
            }
        }
        Ok(())
    }

    /// A reader over the raw bytes of every store file, in offset order.
    pub fn reader(&self) -> Result<LogReader> {
        let mut segments = self.lock()?;
        let readers = segments
            .iter_mut()
            .map(Segment::origin_reader)
            .collect::<Result<Vec<_>>>()?;
        Ok(LogReader::new(readers))
    }

    /// Closes every segment, flushing stores and shrinking index files.
    pub fn close(self) -> Result<()> {
        let segments = self
            .segments
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        close_all(segments)
    }

    /// Closes the log and deletes its directory.
    pub fn remove(self) -> Result<()> {
        let dir = self.dir.clone();
        self.close()?;
        fs::remove_dir_all(&dir)?;
        info!(dir=%dir.display(), "log-removed");
        Ok(())
    }

    /// Deletes everything and starts over with an empty log in the same
    /// directory.
    pub fn reset(&self) -> Result<()> {
        let mut segments = self.lock()?;
        close_all(std::mem::take(&mut *segments))?;
        fs::remove_dir_all(&self.dir)?;
        *segments = setup(&self.dir, &self.config)?;
        info!(dir=%self.dir.display(), "log-reset");
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn roll(&self, segments: &mut Vec<Segment>, base_offset: u64) -> Result<()> {
        let segment = Segment::new(&self.dir, base_offset, self.config.clone())?;
        segments.push(segment);
        info!(base_offset = base_offset, "segment-activated");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Segment>>> {
        self.segments
            .lock()
            .map_err(|_| Error::Internal("log lock poisoned".to_string()))
    }
}

impl CommitLog for Log {
    fn append(&self, record: Record) -> Result<u64> {
        Log::append(self, record)
    }

    fn read(&self, off: u64) -> Result<Record> {
        Log::read(self, off)
    }

    fn lowest_offset(&self) -> Result<u64> {
        Log::lowest_offset(self)
    }

    fn highest_offset(&self) -> Result<u64> {
        Log::highest_offset(self)
    }
}

/// Rebuilds the segment list from the `.store` files in `dir`.
fn setup(dir: &Path, config: &Config) -> Result<Vec<Segment>> {
    fs::create_dir_all(dir)?;

    let mut base_offsets = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension() != Some(OsStr::new(STORE_EXT)) {
            continue;
        }
        match path
            .file_stem()
            .and_then(OsStr::to_str)
            .and_then(|stem| stem.parse::<u64>().ok())
        {
            Some(off) => base_offsets.push(off),
            None => warn!(path=%path.display(), "skipping-unrecognized-store-file"),
        }
    }
    base_offsets.sort_unstable();
    base_offsets.dedup();

    let mut segments = Vec::with_capacity(base_offsets.len().max(1));
    for base_offset in base_offsets {
        segments.push(Segment::new(dir, base_offset, config.clone())?);
    }

    // Start with one segment if the directory is empty
    if segments.is_empty() {
        segments.push(Segment::new(
            dir,
            config.segment.initial_offset,
            config.clone(),
        )?);
    }
    debug!(dir=%dir.display(), segments = segments.len(), "log-recovered");
    Ok(segments)
}

fn close_all(segments: Vec<Segment>) -> Result<()> {
    let mut first_err = None;
    for segment in segments {
        if let Err(err) = segment.close() {
            first_err.get_or_insert(err);
        }
    }
    first_err.map_or(Ok(()), Err)
}
