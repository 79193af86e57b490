use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

use super::reader::OriginReader;

/// Width of the big-endian length prefix written before every record.
pub const LEN_WIDTH: u64 = 8;

/// Append-only file of length-prefixed records.
///
/// Appends go through a buffered writer; the buffer is flushed before
/// any read so a record is readable right after it was appended.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    buf: BufWriter<File>,
    size: u64,
}

impl Store {
    pub fn new(file: File, path: impl Into<PathBuf>) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(Store {
            path: path.into(),
            buf: BufWriter::new(file),
            size,
        })
    }

    /// Appends `p` and returns `(bytes_written, position)`, where position
    /// is the byte offset the entry starts at.
    pub fn append(&mut self, p: &[u8]) -> Result<(u64, u64)> {
        let pos = self.size;
        self.buf.write_all(&(p.len() as u64).to_be_bytes())?;
        self.buf.write_all(p)?;
        let written = LEN_WIDTH + p.len() as u64;
        self.size += written;
        Ok((written, pos))
    }

    /// Reads the payload of the entry starting at `pos`.
    pub fn read(&mut self, pos: u64) -> Result<Vec<u8>> {
        self.buf.flush()?;
        let start = match pos.checked_add(LEN_WIDTH) {
            Some(start) if start <= self.size => start,
            _ => return Err(Error::EndOfData),
        };
        let file = self.buf.get_ref();

        let mut len = [0u8; LEN_WIDTH as usize];
        read_exact_at(file, &mut len, pos)?;
        let len = u64::from_be_bytes(len);

        if start.checked_add(len).map_or(true, |end| end > self.size) {
            return Err(Error::Corrupt(format!(
                "record at {} in {} claims {} bytes but store holds {}",
                pos,
                self.path.display(),
                len,
                self.size
            )));
        }
        let mut p = vec![0u8; len as usize];
        read_exact_at(file, &mut p, start)?;
        Ok(p)
    }

    /// A reader over the whole store file, starting at byte 0.
    pub fn origin_reader(&mut self) -> Result<OriginReader> {
        self.buf.flush()?;
        let file = self.buf.get_ref().try_clone()?;
        Ok(OriginReader::new(file))
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes buffered writes and syncs the file before closing it.
    pub fn close(self) -> Result<()> {
        let file = self.buf.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(unix)]
pub(crate) fn read_at(file: &File, buf: &mut [u8], off: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, off)
}

#[cfg(windows)]
pub(crate) fn read_at(file: &File, buf: &mut [u8], off: u64) -> io::Result<usize> {
    // Moves the shared cursor, which appends ignore.
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, off)
}

fn read_exact_at(file: &File, mut buf: &mut [u8], mut off: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match read_at(file, buf, off) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                off += n as u64;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
